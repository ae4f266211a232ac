//! Funding core: priced contributions in, owner withdrawal out.

pub mod access;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::FundingConfig,
    ledger::{ContributionLedger, LedgerSnapshot},
    oracle::{PriceConverter, PriceFeed},
    Address, Amount, ConfigError, FundError,
};

use self::access::AccessGuard;

/// Envelope the execution environment hands to every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Native value attached to the call.
    pub value: Amount,
    /// Block timestamp, seconds.
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, value: Amount, timestamp: u64) -> Self {
        Self {
            caller,
            value,
            timestamp,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TransferRejected(pub String);

/// Outbound native-value transfer, provided by the execution environment.
pub trait ValueSink {
    fn transfer(&mut self, to: &Address, amount: Amount) -> Result<(), TransferRejected>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FundEvent {
    Funded {
        funder: Address,
        amount: Amount,
        reference_value: Amount,
    },
    Withdrawn {
        to: Address,
        amount: Amount,
        funders: usize,
        epoch: u64,
    },
}

pub struct FundMe<F> {
    guard: AccessGuard,
    price_feed: F,
    converter: PriceConverter,
    ledger: ContributionLedger,
    events: Vec<FundEvent>,
}

impl<F: PriceFeed> FundMe<F> {
    /// Deploys the contract with `deployer` as its permanent owner.
    pub fn new(deployer: Address, price_feed: F, config: &FundingConfig) -> Result<Self, ConfigError> {
        let converter = PriceConverter::new(config, price_feed.decimals())?;
        info!(
            owner = %deployer,
            price_feed = %price_feed.address(),
            minimum = converter.minimum(),
            "funding contract deployed"
        );
        Ok(Self {
            guard: AccessGuard::new(deployer),
            price_feed,
            converter,
            ledger: ContributionLedger::new(),
            events: Vec::new(),
        })
    }

    /// Accepts `ctx.value` from `ctx.caller` if it is worth at least the
    /// minimum reference value. Returns that reference value.
    pub fn fund(&mut self, ctx: &CallContext) -> Result<Amount, FundError> {
        if ctx.value == 0 {
            return Err(FundError::InvalidAmount);
        }
        let price = self.converter.read_price(&self.price_feed, ctx.timestamp)?;
        let reference_value = self.converter.reference_value(ctx.value, price);
        if !self.converter.meets_minimum(ctx.value, price) {
            warn!(
                funder = %ctx.caller,
                amount = ctx.value,
                reference_value,
                "contribution below minimum"
            );
            return Err(FundError::InsufficientAmount {
                reference_value,
                minimum: self.converter.minimum(),
            });
        }

        self.ledger.record(ctx.caller, ctx.value)?;
        self.events.push(FundEvent::Funded {
            funder: ctx.caller,
            amount: ctx.value,
            reference_value,
        });
        debug!(
            funder = %ctx.caller,
            amount = ctx.value,
            total = self.ledger.amount_of(&ctx.caller),
            "contribution recorded"
        );
        Ok(reference_value)
    }

    /// Sends the whole custody balance to the owner and starts a new epoch.
    ///
    /// The transfer runs before the ledger is cleared; a rejected transfer
    /// leaves every record in place. `sink` cannot reach `self` while the
    /// transfer runs, so it cannot re-enter with the old balance.
    pub fn withdraw<S: ValueSink + ?Sized>(
        &mut self,
        ctx: &CallContext,
        sink: &mut S,
    ) -> Result<Amount, FundError> {
        let permit = self.guard.authorize(&ctx.caller).inspect_err(|_| {
            warn!(caller = %ctx.caller, "withdraw attempted by non-owner");
        })?;
        if ctx.value != 0 {
            return Err(FundError::InvalidAmount);
        }

        let amount = self.ledger.total_balance();
        let funders = self.ledger.len();
        if amount > 0 {
            sink.transfer(&ctx.caller, amount)
                .map_err(|err| FundError::TransferFailed {
                    to: ctx.caller,
                    amount,
                    reason: err.0,
                })?;
        }
        self.ledger.clear(&permit);
        // the log covers the open epoch only
        self.events.clear();
        self.events.push(FundEvent::Withdrawn {
            to: ctx.caller,
            amount,
            funders,
            epoch: self.ledger.epoch(),
        });
        info!(
            to = %ctx.caller,
            amount,
            funders,
            epoch = self.ledger.epoch(),
            "balance withdrawn, ledger reset"
        );
        Ok(amount)
    }

    pub fn owner(&self) -> Address {
        self.guard.owner()
    }

    pub fn price_feed(&self) -> Address {
        self.price_feed.address()
    }

    pub fn address_to_amount_funded(&self, funder: &Address) -> Amount {
        self.ledger.amount_of(funder)
    }

    pub fn funder(&self, index: usize) -> Result<Address, FundError> {
        self.ledger.funder_at(index)
    }

    pub fn funders(&self) -> &[Address] {
        self.ledger.funders()
    }

    pub fn funders_len(&self) -> usize {
        self.ledger.len()
    }

    /// Custody balance.
    pub fn balance(&self) -> Amount {
        self.ledger.total_balance()
    }

    pub fn epoch(&self) -> u64 {
        self.ledger.epoch()
    }

    pub fn minimum_reference_value(&self) -> Amount {
        self.converter.minimum()
    }

    pub fn converter(&self) -> &PriceConverter {
        &self.converter
    }

    /// Events since the last successful withdraw, starting with that
    /// withdraw's `Withdrawn` event.
    pub fn events(&self) -> &[FundEvent] {
        &self.events
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<FundEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }
}
