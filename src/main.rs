//! profile-export command line
//!
//! Usage:
//!     profile-export --targets profiles.txt --output-dir ./downloads
//!
//! Credentials are read from PROFILE_EXPORT_USERNAME and
//! PROFILE_EXPORT_PASSWORD (a `.env` file in the working directory is honoured).

use clap::Parser;
use profile_export::config::{Config, Credentials};
use profile_export::{ChromeDriver, Event, Pipeline, TargetOutcome, save_summary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "profile-export",
    version,
    about = "Export rendered profile documents for a list of target URLs"
)]
struct Args {
    /// Target list, URLs separated by newlines and/or commas
    #[arg(long, env = "PROFILE_EXPORT_TARGETS")]
    targets: Option<PathBuf>,

    /// Directory receiving the exported documents
    #[arg(long, env = "PROFILE_EXPORT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Persisted session cookie file
    #[arg(long, env = "PROFILE_EXPORT_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// JSON configuration file (selectors, timings, service URLs)
    #[arg(long, env = "PROFILE_EXPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Disable the Chrome sandbox (needed in some containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Path to the Chrome/Chromium binary
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Write the run record as JSON to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> profile_export::Result<(Config, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(targets) = self.targets {
            config.paths.targets_file = targets;
        }
        if let Some(output_dir) = self.output_dir {
            config.paths.output_dir = output_dir;
        }
        if let Some(session_file) = self.session_file {
            config.paths.session_file = session_file;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if self.no_sandbox {
            config.browser.no_sandbox = true;
        }
        if let Some(chrome) = self.chrome_path {
            config.browser.executable = Some(chrome);
        }
        Ok((config, self.summary))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_filter = if args.verbose {
        "profile_export=debug"
    } else {
        "profile_export=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        // setup problems the user can fix: credentials, config, login
        Err(e) if e.is_run_fatal() => {
            tracing::error!(code = e.error_code(), error = %e, "run aborted before exporting");
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> profile_export::Result<()> {
    let (config, summary_path) = args.into_config()?;

    // both checked before a browser is started
    let credentials = Credentials::from_env()?;
    if !config.paths.targets_file.is_file() {
        return Err(profile_export::Error::Precondition(format!(
            "target list {} does not exist",
            config.paths.targets_file.display()
        )));
    }

    let pipeline = Pipeline::new(config, credentials)?;
    let driver = ChromeDriver::launch(&pipeline.config().browser, &pipeline.config().paths.output_dir)
        .await?;

    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let result = pipeline.run(driver).await;
    drop(pipeline);
    printer.await.ok();

    let run = result?;
    if let Some(path) = summary_path {
        save_summary(&run, &path).await?;
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::LoginRequired { reason } => println!("Stored session unusable ({reason}), logging in"),
        Event::Authenticated { restored: true } => println!("Restored saved session"),
        Event::Authenticated { restored: false } => println!("Logged in, session saved"),
        Event::TargetStarted { index, total, url } => {
            println!("[{}/{}] {}", index + 1, total, url)
        }
        Event::TargetFinished { record, .. } => match &record.outcome {
            TargetOutcome::Exported { path } => println!("    ✓ saved {}", path.display()),
            other => println!("    ✗ {other}"),
        },
        Event::RunComplete {
            summary,
            output_dir,
        } => {
            println!();
            println!(
                "Done: {} exported, {} skipped, {} failed of {} targets",
                summary.exported, summary.skipped, summary.failed, summary.total
            );
            println!("Documents are in {}", output_dir.display());
        }
        Event::SessionRestored { .. }
        | Event::ExportTriggered { .. }
        | Event::ArtifactDetected { .. } => {}
    }
}
