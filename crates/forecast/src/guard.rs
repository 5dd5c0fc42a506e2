//! Sparse-history classification.

use serde::{Deserialize, Serialize};

/// Whether a history supports per-subject modeling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DataSufficiency {
    Sufficient,
    Insufficient { days: u32 },
}

impl DataSufficiency {
    pub fn is_sufficient(self) -> bool {
        matches!(self, DataSufficiency::Sufficient)
    }
}

/// Classifies histories by their count of distinct sale-days.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SparseDataGuard {
    min_sale_days: u32,
}

impl SparseDataGuard {
    pub const DEFAULT_MIN_SALE_DAYS: u32 = 60;

    pub fn new(min_sale_days: u32) -> Self {
        Self { min_sale_days }
    }

    pub fn min_sale_days(&self) -> u32 {
        self.min_sale_days
    }

    pub fn classify(&self, sale_days: u32) -> DataSufficiency {
        if sale_days < self.min_sale_days {
            DataSufficiency::Insufficient { days: sale_days }
        } else {
            DataSufficiency::Sufficient
        }
    }
}

impl Default for SparseDataGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_SALE_DAYS)
    }
}
