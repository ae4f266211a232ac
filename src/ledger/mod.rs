use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{contracts::access::OwnerPermit, Address, Amount, FundError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunderRecord {
    pub funder: Address,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub epoch: u64,
    pub balance: Amount,
    /// Records in first-contribution order.
    pub records: Vec<FunderRecord>,
    #[serde(with = "crate::ledger::serde_root")]
    pub state_root: [u8; 32],
}

/// Contributions of the current epoch plus the custody balance they add up to.
///
/// Every address in `funders` has a non-zero entry in `amounts` and vice versa.
#[derive(Debug, Default)]
pub struct ContributionLedger {
    amounts: BTreeMap<Address, Amount>,
    funders: Vec<Address>,
    balance: Amount,
    epoch: u64,
}

impl ContributionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the funder's running total, appending first-time
    /// funders to the funder sequence.
    pub fn record(&mut self, funder: Address, amount: Amount) -> Result<(), FundError> {
        if amount == 0 {
            return Err(FundError::InvalidAmount);
        }
        let balance = self
            .balance
            .checked_add(amount)
            .ok_or(FundError::BalanceOverflow)?;
        let current = self.amount_of(&funder);
        // bounded by balance, cannot overflow once the balance add succeeded
        let updated = current + amount;

        if current == 0 {
            self.funders.push(funder);
        }
        self.amounts.insert(funder, updated);
        self.balance = balance;
        Ok(())
    }

    pub fn amount_of(&self, funder: &Address) -> Amount {
        self.amounts.get(funder).copied().unwrap_or(0)
    }

    pub fn funder_at(&self, index: usize) -> Result<Address, FundError> {
        self.funders
            .get(index)
            .copied()
            .ok_or(FundError::IndexOutOfRange {
                index,
                len: self.funders.len(),
            })
    }

    pub fn funders(&self) -> &[Address] {
        &self.funders
    }

    pub fn len(&self) -> usize {
        self.funders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funders.is_empty()
    }

    /// Custody balance held for the current epoch.
    pub fn total_balance(&self) -> Amount {
        self.balance
    }

    /// Number of completed epochs (withdrawals).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drops every record and closes the epoch. Only reachable with a permit
    /// issued by the owner guard.
    pub(crate) fn clear(&mut self, _permit: &OwnerPermit) {
        self.amounts.clear();
        self.funders.clear();
        self.balance = 0;
        self.epoch += 1;
    }

    pub fn records(&self) -> Vec<FunderRecord> {
        self.funders
            .iter()
            .map(|funder| FunderRecord {
                funder: *funder,
                amount: self.amount_of(funder),
            })
            .collect()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let records = self.records();
        LedgerSnapshot {
            epoch: self.epoch,
            balance: self.balance,
            state_root: compute_state_root(self.epoch, self.balance, &records),
            records,
        }
    }
}

fn compute_state_root(epoch: u64, balance: Amount, records: &[FunderRecord]) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(records.len() + 1);
    let mut hasher = Sha256::new();
    hasher.update(b"header");
    hasher.update(epoch.to_le_bytes());
    hasher.update(balance.to_le_bytes());
    leaves.push(hasher.finalize().into());
    for record in records {
        let mut hasher = Sha256::new();
        hasher.update(b"funder");
        hasher.update(record.funder.as_bytes());
        hasher.update(record.amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

pub(crate) mod serde_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let raw = hex::decode(&encoded).map_err(D::Error::custom)?;
        raw.as_slice()
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected 32 bytes, got {}", raw.len())))
    }
}
