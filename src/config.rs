use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Amount, ConfigError};

/// Decimal places of the reference currency amounts the threshold is kept in.
pub const REFERENCE_DECIMALS: u8 = 18;
/// Decimal places of the native value unit (wei-style).
pub const NATIVE_DECIMALS: u8 = 18;
/// 50 reference units at [`REFERENCE_DECIMALS`].
pub const MINIMUM_REFERENCE_VALUE: Amount = 50 * 10u128.pow(REFERENCE_DECIMALS as u32);
pub const MAX_PRICE_AGE_SECS: u64 = 3_600;

/// Local-network price feed constants.
pub const MOCK_FEED_DECIMALS: u8 = 8;
pub const MOCK_FEED_INITIAL_ANSWER: i128 = 2_000 * 100_000_000;

pub const GAS_PER_CALL: Amount = 21_000 * 1_000_000_000;

/// Highest power of ten representable in `u128`.
pub(crate) const MAX_DECIMAL_EXPONENT: u32 = 38;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FundingConfig {
    pub minimum_reference_value: Amount,
    pub reference_decimals: u8,
    pub native_decimals: u8,
    pub max_price_age_secs: u64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            minimum_reference_value: MINIMUM_REFERENCE_VALUE,
            reference_decimals: REFERENCE_DECIMALS,
            native_decimals: NATIVE_DECIMALS,
            max_price_age_secs: MAX_PRICE_AGE_SECS,
        }
    }
}

impl FundingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reference_decimals as u32 > MAX_DECIMAL_EXPONENT {
            return Err(ConfigError::Invalid(format!(
                "reference_decimals {} exceeds {MAX_DECIMAL_EXPONENT}",
                self.reference_decimals
            )));
        }
        if self.native_decimals as u32 > MAX_DECIMAL_EXPONENT {
            return Err(ConfigError::Invalid(format!(
                "native_decimals {} exceeds {MAX_DECIMAL_EXPONENT}",
                self.native_decimals
            )));
        }
        if self.max_price_age_secs == 0 {
            return Err(ConfigError::Invalid(
                "max_price_age_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MockFeedConfig {
    pub decimals: u8,
    pub initial_answer: i128,
}

impl Default for MockFeedConfig {
    fn default() -> Self {
        Self {
            decimals: MOCK_FEED_DECIMALS,
            initial_answer: MOCK_FEED_INITIAL_ANSWER,
        }
    }
}

/// Settings for a [`LocalChain`](crate::chain::LocalChain).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainConfig {
    pub gas_per_call: Amount,
    /// Balance every wallet starts with on first use.
    pub initial_wallet_balance: Amount,
    pub funding: FundingConfig,
    pub feed: MockFeedConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            gas_per_call: GAS_PER_CALL,
            initial_wallet_balance: 10_000 * 10u128.pow(NATIVE_DECIMALS as u32),
            funding: FundingConfig::default(),
            feed: MockFeedConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ChainConfig =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.funding.validate()?;
        Ok(config)
    }
}
