//! Core types for profile-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Short identifier extracted from a canonical profile URL
///
/// Used as the stem of the claimed artifact's file name. Construction goes
/// through [`TargetId::from_url`](crate::target), which guarantees the value is
/// non-empty and safe as a single path component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub(crate) String);

impl TargetId {
    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of processing one target
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum TargetOutcome {
    /// Artifact claimed under the identifier's name
    Exported {
        /// Final location of the artifact
        path: PathBuf,
    },
    /// No identifier could be extracted from the URL
    SkippedUnresolvable {
        /// Why extraction failed
        reason: String,
    },
    /// The page had no overflow control at the expected position
    SkippedNoActionElement,
    /// Navigation or the export menu interaction failed
    FailedTrigger {
        /// What went wrong
        reason: String,
    },
    /// The export was triggered but no artifact appeared in time
    FailedDownloadTimeout,
    /// An artifact appeared but could not be renamed; it is left in place
    FailedClaim {
        /// What went wrong
        reason: String,
    },
}

impl TargetOutcome {
    /// Stable outcome label
    pub fn kind(&self) -> &'static str {
        match self {
            TargetOutcome::Exported { .. } => "exported",
            TargetOutcome::SkippedUnresolvable { .. } => "skipped-unresolvable",
            TargetOutcome::SkippedNoActionElement => "skipped-no-action-element",
            TargetOutcome::FailedTrigger { .. } => "failed-trigger",
            TargetOutcome::FailedDownloadTimeout => "failed-download-timeout",
            TargetOutcome::FailedClaim { .. } => "failed-claim",
        }
    }

    /// Whether the target produced an artifact
    pub fn is_exported(&self) -> bool {
        matches!(self, TargetOutcome::Exported { .. })
    }

    /// Whether the target was skipped rather than failed
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            TargetOutcome::SkippedUnresolvable { .. } | TargetOutcome::SkippedNoActionElement
        )
    }
}

impl std::fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetOutcome::Exported { path } => write!(f, "exported to {}", path.display()),
            TargetOutcome::SkippedUnresolvable { reason }
            | TargetOutcome::FailedTrigger { reason }
            | TargetOutcome::FailedClaim { reason } => write!(f, "{}: {reason}", self.kind()),
            _ => f.write_str(self.kind()),
        }
    }
}

/// One entry of a run record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// The target URL as listed in the input
    pub url: String,
    /// Extracted identifier, absent when unresolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<TargetId>,
    /// What happened
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

/// Per-outcome totals of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entries processed
    pub total: usize,
    /// Artifacts claimed
    pub exported: usize,
    /// Entries skipped (unresolvable or no action element)
    pub skipped: usize,
    /// Entries that failed (trigger, download timeout, claim)
    pub failed: usize,
}

/// In-memory record of one pipeline run, in input order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Directory the artifacts were written to
    pub output_dir: PathBuf,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the last target finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// One entry per non-blank input entry
    pub entries: Vec<TargetRecord>,
}

impl RunRecord {
    /// Empty record for a run writing into `output_dir`
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
        }
    }

    /// Append the outcome of one target
    pub fn push(&mut self, entry: TargetRecord) {
        self.entries.push(entry);
    }

    /// Mark the run as finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Per-outcome totals
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            if entry.outcome.is_exported() {
                summary.exported += 1;
            } else if entry.outcome.is_skipped() {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

/// Event emitted during a run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Stored tokens were applied to the browser
    SessionRestored {
        /// Number of tokens applied
        applied: usize,
        /// Number of tokens skipped (expired or rejected)
        skipped: usize,
    },

    /// No usable session; falling back to an interactive login
    LoginRequired {
        /// Why the stored session could not be used
        reason: String,
    },

    /// The browser holds a valid session
    Authenticated {
        /// True when the session came from the store rather than a fresh login
        restored: bool,
    },

    /// Processing of a target began
    TargetStarted {
        /// Zero-based position in the target list
        index: usize,
        /// Total number of targets
        total: usize,
        /// The target URL
        url: String,
    },

    /// The export menu item was activated
    ExportTriggered {
        /// Target identifier
        target_id: TargetId,
        /// Which locator strategy succeeded (zero-based)
        strategy: usize,
    },

    /// A finished artifact appeared in the output directory
    ArtifactDetected {
        /// Target identifier
        target_id: TargetId,
        /// Where the artifact appeared
        path: PathBuf,
    },

    /// Processing of a target ended
    TargetFinished {
        /// Zero-based position in the target list
        index: usize,
        /// The recorded entry
        record: TargetRecord,
    },

    /// Every target has been processed
    RunComplete {
        /// Per-outcome totals
        summary: RunSummary,
        /// Directory the artifacts were written to
        output_dir: PathBuf,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(outcome: TargetOutcome) -> TargetRecord {
        TargetRecord {
            url: "https://service.example/in/jane-smith/".into(),
            target_id: Some(TargetId("jane-smith".into())),
            outcome,
        }
    }

    #[test]
    fn summary_buckets_every_outcome() {
        let mut run = RunRecord::new(PathBuf::from("downloads"));
        run.push(record(TargetOutcome::Exported {
            path: PathBuf::from("downloads/jane-smith.pdf"),
        }));
        run.push(record(TargetOutcome::SkippedNoActionElement));
        run.push(TargetRecord {
            url: "not a url".into(),
            target_id: None,
            outcome: TargetOutcome::SkippedUnresolvable {
                reason: "no profile segment".into(),
            },
        });
        run.push(record(TargetOutcome::FailedDownloadTimeout));
        run.push(record(TargetOutcome::FailedClaim {
            reason: "permission denied".into(),
        }));

        assert_eq!(
            run.summary(),
            RunSummary {
                total: 5,
                exported: 1,
                skipped: 2,
                failed: 2,
            }
        );
    }

    #[test]
    fn record_serializes_flat_with_kebab_outcome() {
        let json = serde_json::to_value(record(TargetOutcome::FailedDownloadTimeout)).unwrap();
        assert_eq!(json["outcome"], "failed-download-timeout");
        assert_eq!(json["target_id"], "jane-smith");

        let json = serde_json::to_value(record(TargetOutcome::FailedTrigger {
            reason: "all 2 locator strategies failed".into(),
        }))
        .unwrap();
        assert_eq!(json["outcome"], "failed-trigger");
        assert_eq!(json["reason"], "all 2 locator strategies failed");
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let outcomes = [
            TargetOutcome::Exported {
                path: PathBuf::from("a.pdf"),
            },
            TargetOutcome::SkippedUnresolvable { reason: "x".into() },
            TargetOutcome::SkippedNoActionElement,
            TargetOutcome::FailedTrigger { reason: "x".into() },
            TargetOutcome::FailedDownloadTimeout,
            TargetOutcome::FailedClaim { reason: "x".into() },
        ];
        for outcome in outcomes {
            let json = serde_json::to_value(&outcome).unwrap();
            assert_eq!(json["outcome"], outcome.kind());
        }
    }

    #[test]
    fn event_tagging() {
        let event = Event::Authenticated { restored: true };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"authenticated","restored":true}"#);
    }
}
