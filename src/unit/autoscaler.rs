//! Autoscaling Controller
//!
//! Decides when a storage unit needs a sibling and performs the scale-out
//! through the index. The decision runs inside the unit's write critical
//! section, after every mutation that grows the unit, so a unit scales at
//! most once no matter how many inserts race past the threshold.

use crate::api::IndexApi;
use crate::config::{RedirectPolicy, ScalingConfig};
use crate::error::Result;
use crate::types::{PartitionAddress, PartitionKey};

use std::sync::Arc;

/// Write-side flags of a unit, only touched under the unit's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleLatch {
    /// Unit accepts inserts.
    pub open: bool,
    /// A sibling was created; never reset.
    pub scaled: bool,
}

impl Default for ScaleLatch {
    fn default() -> Self {
        Self {
            open: true,
            scaled: false,
        }
    }
}

pub struct AutoscalingController {
    config: ScalingConfig,
    index: Arc<dyn IndexApi>,
}

impl AutoscalingController {
    pub fn new(config: ScalingConfig, index: Arc<dyn IndexApi>) -> Self {
        Self { config, index }
    }

    pub fn threshold(&self) -> u64 {
        self.config.threshold
    }

    /// Runs the scaling rule for a unit that now holds `size` entities.
    ///
    /// Returns the sibling address when this call created one. A failed
    /// scale-out leaves the latch untouched so the next growing mutation tries
    /// again; the mutation that triggered it has already been applied.
    pub async fn maybe_scale(
        &self,
        pk: &PartitionKey,
        address: &PartitionAddress,
        size: u64,
        latch: &mut ScaleLatch,
    ) -> Option<PartitionAddress> {
        if size < self.config.threshold || latch.scaled {
            return None;
        }

        match self.create_sibling(pk, address).await {
            Ok(sibling) => {
                latch.scaled = true;
                if self.config.redirect == RedirectPolicy::Immediate {
                    latch.open = false;
                }
                tracing::info!(
                    "Unit {} for pk {} reached {} entities, sibling {} created (policy {:?})",
                    address,
                    pk,
                    size,
                    sibling,
                    self.config.redirect
                );
                Some(sibling)
            }
            Err(e) => {
                tracing::warn!(
                    "Unit {} for pk {} failed to scale at size {}: {}",
                    address,
                    pk,
                    size,
                    e
                );
                None
            }
        }
    }

    async fn create_sibling(
        &self,
        pk: &PartitionKey,
        address: &PartitionAddress,
    ) -> Result<PartitionAddress> {
        tracing::debug!("Requesting sibling for unit {} (pk {})", address, pk);
        self.index.spawn_sibling(pk).await
    }
}
