//! Knobs shared by plan construction and transfers.

use serde::{Deserialize, Serialize};

use crate::algs::communicator::{CommTag, ExchangeTags};

/// Tags and collective-check switches for plan construction and `apply`.
///
/// Every process of a group must use the same configuration for a given call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Tags for plan discovery and payload transfer.
    pub tags: ExchangeTags,
    /// Tags for directory build and lookup.
    pub directory_tags: ExchangeTags,
    /// Agree on local errors before moving payload (one small allgather per call).
    pub collective_error_checks: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            tags: ExchangeTags::from_base(CommTag::new(0xBEEF)),
            directory_tags: ExchangeTags::from_base(CommTag::new(0xD1E0)),
            collective_error_checks: true,
        }
    }
}

impl ExchangeConfig {
    /// Same configuration with every tag pair moved to a new base.
    pub fn with_tag_base(mut self, base: u16) -> Self {
        self.tags = ExchangeTags::from_base(CommTag::new(base));
        self.directory_tags = ExchangeTags::from_base(CommTag::new(base).offset(2));
        self
    }
}
