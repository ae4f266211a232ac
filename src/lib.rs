//! Value-custody funding ledger.
//!
//! The crate models a single funding contract that accepts native-value
//! contributions, prices each one through an external oracle against a
//! minimum reference-currency threshold, and lets its single owner withdraw
//! the whole balance, resetting the contribution ledger.
//!
//! * [`contracts`]: the funding core (`fund` / `withdraw`) and its owner guard.
//! * [`ledger`]: contributor records, funder order and snapshots.
//! * [`oracle`]: price feed interface, price normalization and a mock feed.
//! * [`chain`]: a local execution environment (wallets, gas, scenarios)
//!   that drives the contract the way a deployment or test harness would.

pub mod address;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod ledger;
pub mod oracle;

mod error;

pub use address::Address;
pub use error::{ConfigError, FundError, OracleError};

/// Amount of native value in its smallest unit.
pub type Amount = u128;
