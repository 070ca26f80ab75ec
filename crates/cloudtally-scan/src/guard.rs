//! Once-per-run account claims.

use dashmap::DashSet;

use cloudtally_core::AccountId;

/// Tracks which accounts a run has claimed.
///
/// The orchestrator scans an account only after claiming it, which makes
/// the account's global pass run exactly once per run. Global services
/// (object storage) are account-wide, so a second pass for the same account
/// would inventory each bucket twice.
#[derive(Debug, Default)]
pub struct GlobalPassGuard {
    claimed: DashSet<AccountId>,
}

impl GlobalPassGuard {
    pub fn new() -> Self {
        Self {
            claimed: DashSet::new(),
        }
    }

    /// Claim an account for this run. Returns `true` only the first time.
    pub fn claim(&self, account_id: &str) -> bool {
        self.claimed.insert(account_id.to_string())
    }

    /// Check whether an account was claimed, without claiming it.
    pub fn is_claimed(&self, account_id: &str) -> bool {
        self.claimed.contains(account_id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
