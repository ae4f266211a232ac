//! Local execution environment for the funding contract.
//!
//! Plays the part a deployment/test harness plays around a real contract:
//! wallets holding native value, a block clock, per-call gas, a mock price
//! feed, and strictly sequential call processing.

mod scenario;

pub use scenario::{Party, Scenario, ScenarioReport, Step, StepOutcome};

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{
    address::ADDRESS_LEN,
    config::ChainConfig,
    contracts::{CallContext, FundMe, TransferRejected, ValueSink},
    oracle::{MockV3Aggregator, PriceFeed},
    Address, Amount, ConfigError, FundError,
};

/// Seconds between consecutive blocks.
pub const BLOCK_TIME_SECS: u64 = 12;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("account {account} cannot cover {required} (balance {available})")]
    InsufficientFunds {
        account: Address,
        required: Amount,
        available: Amount,
    },
    #[error("wallet balance overflow for {0}")]
    WalletOverflow(Address),
    #[error("transaction reverted: {source}")]
    Reverted {
        #[source]
        source: FundError,
        gas_cost: Amount,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ChainError {
    /// The contract error behind a reverted call.
    pub fn revert_reason(&self) -> Option<&FundError> {
        match self {
            ChainError::Reverted { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Externally owned balances. Accounts start with `initial` on first touch.
#[derive(Debug, Default)]
pub struct Wallets {
    balances: BTreeMap<Address, Amount>,
    rejecting: BTreeSet<Address>,
    initial: Amount,
}

impl Wallets {
    pub fn new(initial: Amount) -> Self {
        Self {
            initial,
            ..Self::default()
        }
    }

    pub fn balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(self.initial)
    }

    pub fn credit(&mut self, account: &Address, amount: Amount) -> Result<(), ChainError> {
        let balance = self.balances.entry(*account).or_insert(self.initial);
        *balance = balance
            .checked_add(amount)
            .ok_or(ChainError::WalletOverflow(*account))?;
        Ok(())
    }

    pub fn debit(&mut self, account: &Address, amount: Amount) -> Result<(), ChainError> {
        let available = self.balance(account);
        if available < amount {
            return Err(ChainError::InsufficientFunds {
                account: *account,
                required: amount,
                available,
            });
        }
        self.balances.insert(*account, available - amount);
        Ok(())
    }

    /// Makes `account` refuse incoming value, like a contract without a
    /// payable fallback.
    pub fn set_rejecting(&mut self, account: Address, reject: bool) {
        if reject {
            self.rejecting.insert(account);
        } else {
            self.rejecting.remove(&account);
        }
    }
}

impl ValueSink for Wallets {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), TransferRejected> {
        if self.rejecting.contains(to) {
            return Err(TransferRejected(format!("{to} does not accept value")));
        }
        self.credit(to, amount)
            .map_err(|err| TransferRejected(err.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Fund,
    Withdraw,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    #[serde(with = "crate::ledger::serde_root")]
    pub tx_hash: [u8; 32],
    pub kind: CallKind,
    pub from: Address,
    pub value: Amount,
    pub gas_cost: Amount,
    pub timestamp: u64,
}

pub struct LocalChain {
    config: ChainConfig,
    timestamp: u64,
    nonce: u64,
    wallets: Wallets,
    feed: Arc<MockV3Aggregator>,
    contract: FundMe<Arc<MockV3Aggregator>>,
    contract_address: Address,
}

impl LocalChain {
    /// Starts a chain with a mock feed and a funding contract owned by
    /// `deployer`.
    pub fn deploy(config: ChainConfig, deployer: Address) -> Result<Self, ChainError> {
        let timestamp = GENESIS_TIMESTAMP;
        let feed = Arc::new(
            MockV3Aggregator::new(config.feed.decimals, config.feed.initial_answer, timestamp)
                .with_address(Address::from_label("mock-v3-aggregator")),
        );
        let contract = FundMe::new(deployer, feed.clone(), &config.funding)?;
        Ok(Self {
            wallets: Wallets::new(config.initial_wallet_balance),
            config,
            timestamp,
            nonce: 0,
            feed,
            contract,
            contract_address: contract_address(&deployer, 0),
        })
    }

    pub fn fund(&mut self, caller: Address, value: Amount) -> Result<Receipt, ChainError> {
        let receipt = self.begin(CallKind::Fund, caller, value)?;
        let ctx = CallContext::new(caller, value, self.timestamp);
        match self.contract.fund(&ctx) {
            Ok(_) => Ok(receipt),
            Err(source) => {
                // value goes back, gas stays spent
                self.wallets.credit(&caller, value)?;
                Err(self.revert(receipt, source))
            }
        }
    }

    pub fn withdraw(&mut self, caller: Address) -> Result<Receipt, ChainError> {
        let receipt = self.begin(CallKind::Withdraw, caller, 0)?;
        let ctx = CallContext::new(caller, 0, self.timestamp);
        match self.contract.withdraw(&ctx, &mut self.wallets) {
            Ok(_) => Ok(receipt),
            Err(source) => Err(self.revert(receipt, source)),
        }
    }

    /// Publishes a new price round stamped with the current block time.
    pub fn set_price(&mut self, answer: i128) {
        self.feed.update_answer(answer, self.timestamp);
    }

    pub fn set_feed_outage(&mut self, down: bool) {
        self.feed.set_unreachable(down);
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    pub fn set_rejecting(&mut self, account: Address, reject: bool) {
        self.wallets.set_rejecting(account, reject);
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        if *account == self.contract_address() {
            return self.contract.balance();
        }
        self.wallets.balance(account)
    }

    pub fn contract(&self) -> &FundMe<Arc<MockV3Aggregator>> {
        &self.contract
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn feed(&self) -> &MockV3Aggregator {
        &self.feed
    }

    pub fn feed_address(&self) -> Address {
        self.feed.address()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Mines the next block for a call and charges the caller gas + value.
    fn begin(&mut self, kind: CallKind, from: Address, value: Amount) -> Result<Receipt, ChainError> {
        let gas_cost = self.config.gas_per_call;
        let required = gas_cost
            .checked_add(value)
            .ok_or(ChainError::WalletOverflow(from))?;
        self.wallets.debit(&from, required)?;

        self.nonce += 1;
        self.timestamp = self.timestamp.saturating_add(BLOCK_TIME_SECS);
        let receipt = Receipt {
            tx_hash: tx_hash(kind, &from, value, self.nonce),
            kind,
            from,
            value,
            gas_cost,
            timestamp: self.timestamp,
        };
        debug!(
            tx = %hex::encode(receipt.tx_hash),
            ?kind,
            from = %from,
            value,
            "call submitted"
        );
        Ok(receipt)
    }

    fn revert(&self, receipt: Receipt, source: FundError) -> ChainError {
        warn!(
            tx = %hex::encode(receipt.tx_hash),
            from = %receipt.from,
            reason = %source,
            "call reverted"
        );
        ChainError::Reverted {
            source,
            gas_cost: receipt.gas_cost,
        }
    }
}

/// Address of a contract created by `deployer` at `nonce`. The preimage
/// starts with 0xff, which never occurs in UTF-8, so no label maps to it.
fn contract_address(deployer: &Address, nonce: u64) -> Address {
    let mut hasher = Sha256::new();
    hasher.update([0xff]);
    hasher.update(b"create");
    hasher.update(deployer.as_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
    Address::from_bytes(bytes)
}

fn tx_hash(kind: CallKind, from: &Address, value: Amount, nonce: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"tx");
    hasher.update([kind as u8]);
    hasher.update(from.as_bytes());
    hasher.update(value.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}
