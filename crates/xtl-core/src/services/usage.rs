//! Running token totals across all relay calls.

use parking_lot::Mutex;

use crate::domain::TokenUsage;

#[derive(Debug, Default)]
pub struct UsageMeter {
    totals: Mutex<TokenUsage>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one call's usage and return the new totals.
    pub fn record(&self, usage: TokenUsage) -> TokenUsage {
        let mut totals = self.totals.lock();
        *totals += usage;
        *totals
    }

    pub fn totals(&self) -> TokenUsage {
        *self.totals.lock()
    }

    /// Zero the totals, returning what they were.
    pub fn reset(&self) -> TokenUsage {
        std::mem::take(&mut *self.totals.lock())
    }
}
