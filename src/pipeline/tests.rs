use super::*;
use crate::session_store::{SessionStore, SessionToken};
use crate::testing::{
    FakeAction, FakeDriver, FakeElement, FakePage, exporting_profile, login_pages,
    panicking_profile, profile_without_actions, silent_profile,
};
use std::time::Duration;
use tempfile::TempDir;

const JANE: &str = "https://service.example/in/jane-smith/";
const JOHN: &str = "https://service.example/in/john-doe-123456";
const NO_ACTIONS: &str = "https://service.example/in/locked-profile/";
const SILENT: &str = "https://service.example/in/slow-export/";

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.output_dir = dir.path().join("downloads");
    config.paths.session_file = dir.path().join("cookies.json");
    config.paths.targets_file = dir.path().join("profiles.txt");
    config
}

fn write_targets(config: &Config, contents: &str) {
    std::fs::write(&config.paths.targets_file, contents).unwrap();
}

fn driver_for(config: &Config) -> FakeDriver {
    let driver = FakeDriver::new();
    for page in login_pages(config, &[]) {
        driver.add_page(page);
    }
    driver
}

fn pipeline(config: Config) -> Pipeline {
    Pipeline::new(config, Credentials::new("jane@example.com", "hunter2")).unwrap()
}

fn outcomes(run: &RunRecord) -> Vec<&'static str> {
    run.entries.iter().map(|e| e.outcome.kind()).collect()
}

#[tokio::test(start_paused = true)]
async fn mixed_batch_records_one_outcome_per_entry_in_order() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_targets(
        &config,
        &format!("{JANE}\nnot a profile url, {NO_ACTIONS}\n\n{SILENT},{JOHN}\n"),
    );
    let driver = driver_for(&config);
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(2)));
    driver.add_page(exporting_profile(&config, JOHN, Duration::from_secs(5)));
    driver.add_page(profile_without_actions(&config, NO_ACTIONS));
    driver.add_page(silent_profile(&config, SILENT));

    let run = pipeline(config.clone()).run(driver.clone()).await.unwrap();

    assert_eq!(
        outcomes(&run),
        vec![
            "exported",
            "skipped-unresolvable",
            "skipped-no-action-element",
            "failed-download-timeout",
            "exported",
        ]
    );
    let out = &config.paths.output_dir;
    assert_eq!(
        run.entries[0].outcome,
        TargetOutcome::Exported {
            path: out.join("jane-smith.pdf")
        }
    );
    assert_eq!(
        std::fs::read_to_string(out.join("jane-smith.pdf")).unwrap(),
        format!("%PDF-1.7 {JANE}")
    );
    assert_eq!(
        std::fs::read_to_string(out.join("john-doe-123456.pdf")).unwrap(),
        format!("%PDF-1.7 {JOHN}")
    );
    assert!(run.entries[1].target_id.is_none());
    assert!(driver.is_quit());
}

#[tokio::test(start_paused = true)]
async fn same_target_twice_yields_two_distinct_files() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_targets(&config, &format!("{JANE}\n{JANE}\n"));
    let driver = driver_for(&config);
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(1)));

    let run = pipeline(config.clone()).run(driver).await.unwrap();

    assert_eq!(outcomes(&run), vec!["exported", "exported"]);
    let paths: Vec<_> = run
        .entries
        .iter()
        .map(|e| match &e.outcome {
            TargetOutcome::Exported { path } => path.clone(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_ne!(paths[0], paths[1]);
    assert!(paths.iter().all(|p| p.exists()));
    let second = paths[1].file_name().unwrap().to_str().unwrap();
    assert!(second.starts_with("jane-smith_"), "got {second}");
}

#[tokio::test(start_paused = true)]
async fn rejected_session_logs_in_before_any_target() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    SessionStore::new(config.paths.session_file.clone())
        .save(&[SessionToken::new("li_at", "revoked", "service.example")])
        .await
        .unwrap();
    write_targets(&config, JANE);
    let driver = driver_for(&config);
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(1)));

    pipeline(config.clone()).run(driver.clone()).await.unwrap();

    assert_eq!(
        driver.visited(),
        vec![
            config.service.landing_url.clone(),
            config.service.login_url.clone(),
            JANE.to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_login_processes_no_target_and_closes_browser() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_targets(&config, JANE);
    // no login page registered: the username field never appears
    let driver = FakeDriver::new();
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(1)));

    let err = pipeline(config.clone()).run(driver.clone()).await.unwrap_err();

    assert_eq!(err.error_code(), "element_not_found", "got {err:?}");
    assert!(!driver.visited().contains(&JANE.to_string()));
    assert!(driver.is_quit());
    assert!(config.paths.output_dir.is_dir(), "output directory is created up front");
}

#[tokio::test(start_paused = true)]
async fn missing_target_list_is_precondition_failure() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let driver = driver_for(&config);

    let err = pipeline(config).run(driver.clone()).await.unwrap_err();

    assert!(matches!(err, Error::Precondition(_)), "got {err:?}");
    assert!(driver.is_quit());
}

#[tokio::test(start_paused = true)]
async fn panicking_target_is_isolated() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let crashing = "https://service.example/in/crashing/";
    write_targets(&config, &format!("{crashing}\n{JANE}"));
    let driver = driver_for(&config);
    driver.add_page(panicking_profile(&config, crashing));
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(1)));

    let run = pipeline(config).run(driver).await.unwrap();

    assert_eq!(outcomes(&run), vec!["failed-trigger", "exported"]);
    match &run.entries[0].outcome {
        TargetOutcome::FailedTrigger { reason } => {
            assert!(reason.contains("renderer crashed"), "{reason}")
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(run.entries[0].target_id.as_ref().unwrap().as_str(), "crashing");
}

#[tokio::test(start_paused = true)]
async fn panic_during_login_still_closes_browser() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_targets(&config, JANE);
    let driver = driver_for(&config);
    let selectors = &config.selectors;
    driver.add_page(
        FakePage::new(config.service.login_url.clone())
            .element(FakeElement::new(selectors.username_input.clone()).id("username"))
            .element(FakeElement::new(selectors.password_input.clone()).id("password"))
            .element(
                FakeElement::new(selectors.submit_button.clone())
                    .id("submit")
                    .on_click(FakeAction::Panic("login page crashed".into())),
            ),
    );

    let pipeline = pipeline(config);
    let panic = AssertUnwindSafe(pipeline.run(driver.clone()))
        .catch_unwind()
        .await
        .unwrap_err();

    assert_eq!(panic_message(panic.as_ref()), "login page crashed");
    assert!(driver.is_quit());
    assert!(!driver.visited().contains(&JANE.to_string()));
}

#[tokio::test(start_paused = true)]
async fn events_follow_target_progress() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_targets(&config, &format!("{JANE},{NO_ACTIONS}"));
    let driver = driver_for(&config);
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(1)));
    driver.add_page(profile_without_actions(&config, NO_ACTIONS));
    let pipeline = pipeline(config.clone());
    let mut events = pipeline.subscribe();

    pipeline.run(driver).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            Event::SessionRestored { .. } => "session_restored",
            Event::LoginRequired { .. } => "login_required",
            Event::Authenticated { .. } => "authenticated",
            Event::TargetStarted { .. } => "target_started",
            Event::ExportTriggered { .. } => "export_triggered",
            Event::ArtifactDetected { .. } => "artifact_detected",
            Event::TargetFinished { .. } => "target_finished",
            Event::RunComplete { summary, output_dir } => {
                assert_eq!(summary.exported, 1);
                assert_eq!(summary.skipped, 1);
                assert_eq!(output_dir, config.paths.output_dir);
                "run_complete"
            }
        });
    }
    assert_eq!(
        kinds,
        vec![
            "login_required",
            "authenticated",
            "target_started",
            "export_triggered",
            "artifact_detected",
            "target_finished",
            "target_started",
            "target_finished",
            "run_complete",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn summary_round_trips_through_json() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    write_targets(&config, JANE);
    let driver = driver_for(&config);
    driver.add_page(exporting_profile(&config, JANE, Duration::from_secs(1)));

    let run = pipeline(config).run(driver).await.unwrap();
    let path = dir.path().join("reports").join("run.json");
    save_summary(&run, &path).await.unwrap();

    let parsed: RunRecord = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(parsed, run);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let mut config = Config::default();
    config.artifact.extension = String::new();
    let err = Pipeline::new(config, Credentials::new("a", "b")).err().unwrap();
    assert_eq!(err.error_code(), "config_error");
}
