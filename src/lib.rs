//! # profile-export
//!
//! Session-persistent browser pipeline that exports rendered profile
//! documents (PDF) for a list of target URLs.
//!
//! A run authenticates once, reusing a persisted cookie store when the
//! service still accepts it and falling back to a credential login when it
//! does not. Each target page is then driven through its export menu, the
//! resulting download is detected in the output directory, and the file is
//! renamed after the target's identifier.
//!
//! ## Quick Start
//!
//! ```no_run
//! use profile_export::{ChromeDriver, Config, Credentials, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let credentials = Credentials::from_env()?;
//!     let driver = ChromeDriver::launch(&config.browser, &config.paths.output_dir).await?;
//!
//!     let pipeline = Pipeline::new(config, credentials)?;
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let run = pipeline.run(driver).await?;
//!     println!("{} of {} exported", run.summary().exported, run.summary().total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Artifact detection and claiming
pub mod artifact;
/// Session restore and credential login
pub mod auth;
/// Browser driver seam and Chrome implementation
pub mod browser;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Ordered locator fallback chains
pub mod locator;
/// Run orchestration
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Persisted session tokens
pub mod session_store;
/// Target list parsing and identifier extraction
pub mod target;
/// Scripted in-memory browser for tests
pub mod testing;
/// Per-target export trigger
pub mod trigger;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Bounded waits
pub mod wait;

// Re-export commonly used types
pub use browser::{BrowserDriver, ChromeDriver, Locator};
pub use config::{Config, Credentials};
pub use error::{ArtifactError, BrowserError, Error, Result, SessionError};
pub use pipeline::{Pipeline, save_summary};
pub use types::{Event, RunRecord, RunSummary, TargetId, TargetOutcome, TargetRecord};
pub use wait::WaitPolicy;
