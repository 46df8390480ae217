//! Per-target export trigger
//!
//! Opens a profile page, opens its overflow menu and activates the export
//! item. The export itself runs on the remote side; this module never waits
//! for the resulting artifact.

use crate::browser::BrowserDriver;
use crate::config::Config;
use crate::locator::LocatorChain;
use crate::retry::with_retry;
use crate::types::TargetId;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one trigger attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The export menu item was activated by the strategy at this index
    Triggered {
        /// Index into the export locator chain
        strategy: usize,
    },
    /// The page has no overflow control at the configured position
    NoActionElement,
    /// Navigation, the overflow click, or every export strategy failed
    Failed {
        /// What went wrong
        reason: String,
    },
}

/// Drives the export UI sequence on a target page
#[derive(Clone, Debug)]
pub struct ExportTrigger {
    config: Arc<Config>,
    chain: LocatorChain,
}

impl ExportTrigger {
    /// Trigger using the configured selectors and timings
    pub fn new(config: Arc<Config>) -> Self {
        let chain = config.selectors.export_chain();
        Self { config, chain }
    }

    /// Run the export sequence for `target` at `url`
    ///
    /// Returns as soon as the export item is activated; errors are folded
    /// into [`TriggerOutcome`].
    pub async fn trigger<D>(&self, driver: &D, target: &TargetId, url: &str) -> TriggerOutcome
    where
        D: BrowserDriver + ?Sized,
    {
        let selectors = &self.config.selectors;
        let timing = &self.config.timing;

        if let Err(e) = with_retry(&self.config.retry, move || driver.navigate(url)).await {
            warn!(target_id = %target, error = %e, "could not open target page");
            return TriggerOutcome::Failed {
                reason: e.to_string(),
            };
        }
        timing.page_settle.settle().await;

        let overflow = match driver.find_all(&selectors.overflow_actions).await {
            Ok(mut found) if found.len() > selectors.overflow_index => {
                found.swap_remove(selectors.overflow_index)
            }
            Ok(found) => {
                info!(
                    target_id = %target,
                    found = found.len(),
                    index = selectors.overflow_index,
                    "no overflow control at expected position"
                );
                return TriggerOutcome::NoActionElement;
            }
            Err(e) => {
                info!(target_id = %target, error = %e, "overflow lookup failed");
                return TriggerOutcome::NoActionElement;
            }
        };

        if let Err(e) = driver.click(&overflow).await {
            warn!(target_id = %target, error = %e, "overflow click failed");
            return TriggerOutcome::Failed {
                reason: e.to_string(),
            };
        }
        timing.menu_settle.settle().await;

        match self.chain.activate(driver).await {
            Ok(strategy) => {
                debug!(target_id = %target, strategy, "export item activated");
                TriggerOutcome::Triggered { strategy }
            }
            Err(e) => {
                warn!(target_id = %target, error = %e, "export item not activated");
                TriggerOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
