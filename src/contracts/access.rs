use crate::{Address, FundError};

/// Proof that the owner check passed for the current call.
///
/// Only [`AccessGuard::authorize`] can build one; the ledger demands it before
/// clearing.
#[derive(Debug)]
pub struct OwnerPermit {
    _private: (),
}

/// Single fixed owner, set at construction.
#[derive(Clone, Debug)]
pub struct AccessGuard {
    owner: Address,
}

impl AccessGuard {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn check(&self, identity: &Address) -> bool {
        *identity == self.owner
    }

    pub fn authorize(&self, caller: &Address) -> Result<OwnerPermit, FundError> {
        if !self.check(caller) {
            return Err(FundError::NotAuthorized { caller: *caller });
        }
        Ok(OwnerPermit { _private: () })
    }
}
