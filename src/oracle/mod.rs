//! Price feed interface and reference-currency normalization.
//!
//! A feed reports how many reference-currency units one native unit is
//! worth, scaled by its own `decimals()`. [`PriceConverter`] reconciles that
//! scale with the native unit's decimals and the threshold's decimals using
//! integer arithmetic only.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{FundingConfig, MAX_DECIMAL_EXPONENT},
    Address, Amount, ConfigError, OracleError,
};

/// One aggregator round, in the shape price aggregators report it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u64,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u64,
}

/// Read-only price capability consumed by the funding core.
pub trait PriceFeed {
    fn address(&self) -> Address;
    fn decimals(&self) -> u8;
    fn latest_round_data(&self) -> Result<RoundData, OracleError>;
}

impl<T: PriceFeed + ?Sized> PriceFeed for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn decimals(&self) -> u8 {
        (**self).decimals()
    }

    fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        (**self).latest_round_data()
    }
}

/// Checks a round and returns its answer as an unsigned price.
pub fn validate_round(round: &RoundData, now: u64, max_age: u64) -> Result<u128, OracleError> {
    if round.answer <= 0 {
        return Err(OracleError::NonPositiveAnswer(round.answer));
    }
    if round.updated_at == 0 {
        return Err(OracleError::NeverUpdated);
    }
    if round.answered_in_round < round.round_id {
        return Err(OracleError::IncompleteRound {
            round_id: round.round_id,
            answered_in_round: round.answered_in_round,
        });
    }
    // A reading stamped ahead of the local clock counts as fresh.
    if now.saturating_sub(round.updated_at) > max_age {
        return Err(OracleError::Stale {
            updated_at: round.updated_at,
            now,
            max_age,
        });
    }
    Ok(round.answer as u128)
}

/// Converts native amounts into reference-currency value and applies the
/// minimum-contribution threshold.
///
/// `value = amount * price * 10^ref / 10^(price_dec + native_dec)`; the common
/// power of ten is cancelled up front so only one of `up`/`down` is not 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceConverter {
    up: u128,
    down: u128,
    minimum: Amount,
    /// `minimum * down`, the right-hand side of the threshold comparison.
    scaled_minimum: u128,
    max_age: u64,
}

impl PriceConverter {
    pub fn new(config: &FundingConfig, price_decimals: u8) -> Result<Self, ConfigError> {
        config.validate()?;
        if price_decimals as u32 > MAX_DECIMAL_EXPONENT {
            return Err(ConfigError::Invalid(format!(
                "price feed decimals {price_decimals} exceeds {MAX_DECIMAL_EXPONENT}"
            )));
        }
        let numerator_exp = config.reference_decimals as i32;
        let denominator_exp = price_decimals as i32 + config.native_decimals as i32;
        let (up, down) = if numerator_exp >= denominator_exp {
            (pow10(numerator_exp - denominator_exp)?, 1)
        } else {
            (1, pow10(denominator_exp - numerator_exp)?)
        };
        let scaled_minimum = config
            .minimum_reference_value
            .checked_mul(down)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "minimum reference value {} cannot be compared exactly at price decimals {price_decimals}",
                    config.minimum_reference_value
                ))
            })?;
        Ok(Self {
            up,
            down,
            minimum: config.minimum_reference_value,
            scaled_minimum,
            max_age: config.max_price_age_secs,
        })
    }

    pub fn minimum(&self) -> Amount {
        self.minimum
    }

    /// Reads and validates the latest price from `feed`.
    pub fn read_price<F: PriceFeed + ?Sized>(&self, feed: &F, now: u64) -> Result<u128, OracleError> {
        let round = feed.latest_round_data()?;
        let price = validate_round(&round, now, self.max_age)?;
        debug!(
            round_id = round.round_id,
            price,
            updated_at = round.updated_at,
            "price feed read"
        );
        Ok(price)
    }

    /// Reference value of `amount` at `price`, rounded down.
    ///
    /// Saturates when the intermediate product exceeds 128 bits; such amounts
    /// are far above any threshold this converter accepts.
    pub fn reference_value(&self, amount: Amount, price: u128) -> Amount {
        match self.scaled(amount, price) {
            Some(product) => product / self.down,
            None => u128::MAX / self.down,
        }
    }

    /// Exact threshold check, done without division.
    pub fn meets_minimum(&self, amount: Amount, price: u128) -> bool {
        match self.scaled(amount, price) {
            Some(product) => product >= self.scaled_minimum,
            // overflowed past u128::MAX, which is >= scaled_minimum
            None => true,
        }
    }

    /// Smallest non-zero native amount that passes the threshold at `price`.
    pub fn minimum_native_amount(&self, price: u128) -> Amount {
        match price.checked_mul(self.up) {
            Some(0) | None => 1,
            Some(per_unit) => self.scaled_minimum.div_ceil(per_unit).max(1),
        }
    }

    fn scaled(&self, amount: Amount, price: u128) -> Option<u128> {
        amount.checked_mul(price)?.checked_mul(self.up)
    }
}

fn pow10(exp: i32) -> Result<u128, ConfigError> {
    10u128.checked_pow(exp as u32).ok_or_else(|| {
        ConfigError::Invalid(format!("decimal scale 10^{exp} does not fit in 128 bits"))
    })
}

#[derive(Debug)]
struct MockState {
    latest: RoundData,
    rounds: BTreeMap<u64, RoundData>,
    unreachable: bool,
}

/// Deterministic in-process price feed for local networks and tests.
#[derive(Debug)]
pub struct MockV3Aggregator {
    address: Address,
    decimals: u8,
    state: Mutex<MockState>,
}

impl MockV3Aggregator {
    pub fn new(decimals: u8, initial_answer: i128, timestamp: u64) -> Self {
        let aggregator = Self {
            address: Address::random(),
            decimals,
            state: Mutex::new(MockState {
                latest: RoundData {
                    round_id: 0,
                    answer: 0,
                    started_at: 0,
                    updated_at: 0,
                    answered_in_round: 0,
                },
                rounds: BTreeMap::new(),
                unreachable: false,
            }),
        };
        aggregator.update_answer(initial_answer, timestamp);
        aggregator
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Starts a new round carrying `answer`. Round ids stop at `u64::MAX`,
    /// after which the last round is overwritten in place.
    pub fn update_answer(&self, answer: i128, timestamp: u64) {
        let mut state = self.lock();
        let round_id = state.latest.round_id.saturating_add(1);
        let round = RoundData {
            round_id,
            answer,
            started_at: timestamp,
            updated_at: timestamp,
            answered_in_round: round_id,
        };
        state.latest = round;
        state.rounds.insert(round_id, round);
    }

    /// Overwrites the latest round verbatim, including inconsistent rounds.
    pub fn update_round_data(&self, round: RoundData) {
        let mut state = self.lock();
        state.latest = round;
        state.rounds.insert(round.round_id, round);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    pub fn get_round_data(&self, round_id: u64) -> Option<RoundData> {
        self.lock().rounds.get(&round_id).copied()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PriceFeed for MockV3Aggregator {
    fn address(&self) -> Address {
        self.address
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn latest_round_data(&self) -> Result<RoundData, OracleError> {
        let state = self.lock();
        if state.unreachable {
            return Err(OracleError::Unreachable(format!(
                "aggregator {} not responding",
                self.address
            )));
        }
        Ok(state.latest)
    }
}
