//! Pipeline orchestration
//!
//! A run authenticates once, then processes every target strictly in input
//! order: resolve the identifier, trigger the export, wait for the artifact
//! and claim it. Anything that goes wrong for one target is recorded as that
//! target's [`TargetOutcome`] and the run moves on; only setup failures
//! (output directory, target list, authentication) end a run early.
//!
//! The browser is closed on every exit path of [`Pipeline::run`].

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::artifact::ArtifactResolver;
use crate::auth::Authenticator;
use crate::browser::BrowserDriver;
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::target::parse_target_list;
use crate::trigger::{ExportTrigger, TriggerOutcome};
use crate::types::{Event, RunRecord, TargetId, TargetOutcome, TargetRecord};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Session-persistent export pipeline
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    credentials: Credentials,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Pipeline for a validated configuration
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(1000);
        Ok(Self {
            config: Arc::new(config),
            credentials,
            event_tx,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to run events
    ///
    /// Events emitted before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Run the whole pipeline, then close `driver` whatever the result
    ///
    /// A panic outside per-target processing (during authentication, for
    /// instance) still closes the browser before it is resumed.
    pub async fn run<D>(&self, mut driver: D) -> Result<RunRecord>
    where
        D: BrowserDriver,
    {
        let result = AssertUnwindSafe(self.execute(&driver)).catch_unwind().await;
        if let Err(e) = driver.quit().await {
            warn!(error = %e, "failed to close browser");
        }
        match result {
            Ok(result) => result,
            Err(panic) => {
                error!(reason = %panic_message(panic.as_ref()), "run panicked, browser closed");
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn execute<D>(&self, driver: &D) -> Result<RunRecord>
    where
        D: BrowserDriver,
    {
        let output_dir = &self.config.paths.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;

        let mut auth = Authenticator::new(
            self.config.clone(),
            self.credentials.clone(),
            self.event_tx.clone(),
        )?;
        auth.authenticate(driver).await?;

        let targets = self.read_targets().await?;
        info!(targets = targets.len(), output_dir = %output_dir.display(), "starting exports");

        let trigger = ExportTrigger::new(self.config.clone());
        let resolver = ArtifactResolver::from_config(&self.config);
        let mut run = RunRecord::new(output_dir.clone());
        let total = targets.len();

        for (index, url) in targets.into_iter().enumerate() {
            self.emit_event(Event::TargetStarted {
                index,
                total,
                url: url.clone(),
            });

            let processed = AssertUnwindSafe(self.process_target(driver, &trigger, &resolver, &url))
                .catch_unwind()
                .await;
            let record = processed.unwrap_or_else(|panic| {
                let reason = panic_message(panic.as_ref());
                error!(%url, %reason, "target processing panicked");
                TargetRecord {
                    target_id: TargetId::from_url(&url, &self.config.service.profile_path_prefix).ok(),
                    url: url.clone(),
                    outcome: TargetOutcome::FailedTrigger {
                        reason: format!("panicked: {reason}"),
                    },
                }
            });

            info!(
                index,
                total,
                %url,
                outcome = record.outcome.kind(),
                "target finished"
            );
            self.emit_event(Event::TargetFinished {
                index,
                record: record.clone(),
            });
            run.push(record);
        }

        run.finish();
        let summary = run.summary();
        info!(
            total = summary.total,
            exported = summary.exported,
            skipped = summary.skipped,
            failed = summary.failed,
            output_dir = %output_dir.display(),
            "run complete"
        );
        self.emit_event(Event::RunComplete {
            summary,
            output_dir: output_dir.clone(),
        });
        Ok(run)
    }

    async fn read_targets(&self) -> Result<Vec<String>> {
        let path = &self.config.paths.targets_file;
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(parse_target_list(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Precondition(format!(
                "target list {} does not exist",
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn process_target<D>(
        &self,
        driver: &D,
        trigger: &ExportTrigger,
        resolver: &ArtifactResolver,
        url: &str,
    ) -> TargetRecord
    where
        D: BrowserDriver,
    {
        let record = |target_id: Option<TargetId>, outcome| TargetRecord {
            url: url.to_string(),
            target_id,
            outcome,
        };

        let id = match TargetId::from_url(url, &self.config.service.profile_path_prefix) {
            Ok(id) => id,
            Err(e) => {
                info!(%url, reason = %e.reason, "skipping unresolvable target");
                return record(None, TargetOutcome::SkippedUnresolvable { reason: e.reason });
            }
        };

        let snapshot = match resolver.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(target_id = %id, error = %e, "cannot inspect output directory");
                return record(
                    Some(id),
                    TargetOutcome::FailedTrigger {
                        reason: e.to_string(),
                    },
                );
            }
        };

        match trigger.trigger(driver, &id, url).await {
            TriggerOutcome::Triggered { strategy } => {
                self.emit_event(Event::ExportTriggered {
                    target_id: id.clone(),
                    strategy,
                });
            }
            TriggerOutcome::NoActionElement => {
                return record(Some(id), TargetOutcome::SkippedNoActionElement);
            }
            TriggerOutcome::Failed { reason } => {
                return record(Some(id), TargetOutcome::FailedTrigger { reason });
            }
        }

        let artifact = match resolver.wait_for_artifact(&snapshot).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(target_id = %id, error = %e, "export did not arrive");
                return record(Some(id), TargetOutcome::FailedDownloadTimeout);
            }
        };
        self.emit_event(Event::ArtifactDetected {
            target_id: id.clone(),
            path: artifact.path,
        });

        self.config.timing.claim_settle.settle().await;

        match resolver.claim(&id, Some(&snapshot)).await {
            Ok(path) => record(Some(id), TargetOutcome::Exported { path }),
            Err(e) => record(
                Some(id),
                TargetOutcome::FailedClaim {
                    reason: e.to_string(),
                },
            ),
        }
    }
}

/// Write a run record as pretty JSON
pub async fn save_summary(run: &RunRecord, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(run)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), "run summary written");
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
