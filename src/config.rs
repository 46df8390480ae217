//! Configuration types for profile-export

use crate::browser::Locator;
use crate::error::{Error, Result};
use crate::locator::{LocatorChain, Matcher};
use crate::wait::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the account identifier
pub const USERNAME_ENV: &str = "PROFILE_EXPORT_USERNAME";
/// Environment variable holding the account secret
pub const PASSWORD_ENV: &str = "PROFILE_EXPORT_PASSWORD";

/// File locations used by a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory receiving downloads and identifier-named artifacts (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// JSON file holding the persisted session tokens (default: "./cookies.json")
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Target list, URLs separated by newlines and/or commas (default: "./profiles.txt")
    #[serde(default = "default_targets_file")]
    pub targets_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            session_file: default_session_file(),
            targets_file: default_targets_file(),
        }
    }
}

/// Remote service surfaces
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Login form URL
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Page only reachable with a live session
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    /// Regexes matched against the URL after submitting credentials; any match means success
    #[serde(default = "default_post_login_patterns")]
    pub post_login_url_patterns: Vec<String>,

    /// Path segment preceding the identifier in target URLs (default: "in")
    #[serde(default = "default_profile_prefix")]
    pub profile_path_prefix: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            landing_url: default_landing_url(),
            post_login_url_patterns: default_post_login_patterns(),
            profile_path_prefix: default_profile_prefix(),
        }
    }
}

/// Element locators for the login form and the export menu
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Element whose presence means "not logged in"
    #[serde(default = "default_login_form")]
    pub login_form: Locator,

    /// Username input on the login surface
    #[serde(default = "default_username_input")]
    pub username_input: Locator,

    /// Password input on the login surface
    #[serde(default = "default_password_input")]
    pub password_input: Locator,

    /// Submit control on the login surface
    #[serde(default = "default_submit_button")]
    pub submit_button: Locator,

    /// Overflow ("more actions") controls on a profile page
    #[serde(default = "default_overflow_actions")]
    pub overflow_actions: Locator,

    /// Which overflow control opens the export menu, zero-based (default: 1, the second)
    #[serde(default = "default_overflow_index")]
    pub overflow_index: usize,

    /// Candidate menu items, filtered by `export_label`
    #[serde(default = "default_menu_items")]
    pub menu_items: Locator,

    /// Visible text of the export menu item (default: "Save to PDF")
    #[serde(default = "default_export_label")]
    pub export_label: String,

    /// Document-wide fallback; defaults to any element whose own text contains `export_label`
    #[serde(default)]
    pub export_fallback: Option<Locator>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            login_form: default_login_form(),
            username_input: default_username_input(),
            password_input: default_password_input(),
            submit_button: default_submit_button(),
            overflow_actions: default_overflow_actions(),
            overflow_index: default_overflow_index(),
            menu_items: default_menu_items(),
            export_label: default_export_label(),
            export_fallback: None,
        }
    }
}

impl SelectorConfig {
    /// Ordered strategies for locating the export menu item
    ///
    /// Menu-scoped match first, then the loose document-wide text match.
    pub fn export_chain(&self) -> LocatorChain {
        let fallback = self.export_fallback.clone().unwrap_or_else(|| {
            Locator::XPath(format!(
                "//*[contains(text(), {})]",
                xpath_literal(&self.export_label)
            ))
        });
        LocatorChain::new(vec![
            Matcher::new("menu item", self.menu_items.clone())
                .with_text(self.export_label.clone()),
            Matcher::new("document text", fallback),
        ])
    }
}

/// Quote a string as an XPath 1.0 literal, which has no escape syntax
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Artifact naming conventions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Extension of a finished artifact, without the dot (default: "pdf")
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Suffixes marking a download still in progress
    #[serde(default = "default_partial_suffixes")]
    pub partial_suffixes: Vec<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            partial_suffixes: default_partial_suffixes(),
        }
    }
}

/// Every bounded wait and settle delay of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Look for the login form after restoring a session (default: 10s)
    #[serde(default = "default_session_check")]
    pub session_check: WaitPolicy,

    /// Locate the username/password inputs (default: 10s)
    #[serde(default = "default_login_fields")]
    pub login_fields: WaitPolicy,

    /// Wait for a post-login URL after submitting (default: 15s)
    #[serde(default = "default_login_redirect")]
    pub login_redirect: WaitPolicy,

    /// Delay after opening a target page (default: 3s)
    #[serde(default = "default_page_settle")]
    pub page_settle: WaitPolicy,

    /// Delay after opening the overflow menu (default: 1s)
    #[serde(default = "default_menu_settle")]
    pub menu_settle: WaitPolicy,

    /// Poll the output directory for the artifact (default: 30s, every 500ms)
    #[serde(default = "default_artifact_poll")]
    pub artifact_poll: WaitPolicy,

    /// Delay between detecting and claiming an artifact (default: 2s)
    #[serde(default = "default_claim_settle")]
    pub claim_settle: WaitPolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            session_check: default_session_check(),
            login_fields: default_login_fields(),
            login_redirect: default_login_redirect(),
            page_settle: default_page_settle(),
            menu_settle: default_menu_settle(),
            artifact_poll: default_artifact_poll(),
            claim_settle: default_claim_settle(),
        }
    }
}

/// Retry configuration for transient navigation failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(rename = "initial_delay_ms", default = "default_initial_delay", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(rename = "max_delay_ms", default = "default_max_delay", with = "duration_ms")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Browser process settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Run without a visible window (default: false, so a human can solve login challenges)
    #[serde(default)]
    pub headless: bool,

    /// Chrome/Chromium binary (auto-detected if None)
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Disable the Chrome sandbox (needed in some containers)
    #[serde(default)]
    pub no_sandbox: bool,

    /// Window width in pixels (default: 1280)
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Window height in pixels (default: 1024)
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            no_sandbox: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

/// Main configuration
///
/// Every section has defaults, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Remote service surfaces
    #[serde(default)]
    pub service: ServiceConfig,

    /// Element locators
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Artifact naming
    #[serde(default)]
    pub artifact: ArtifactConfig,

    /// Bounded waits and settle delays
    #[serde(default)]
    pub timing: TimingConfig,

    /// Navigation retry
    #[serde(default)]
    pub retry: RetryConfig,

    /// Browser process
    #[serde(default)]
    pub browser: BrowserSettings,
}

impl Config {
    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("invalid config {}: {e}", path.display()),
            key: None,
        })
    }

    /// Reject settings that would make every target fail
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| Error::Config {
            message: message.to_string(),
            key: Some(key.to_string()),
        };

        if self.artifact.extension.trim().is_empty() || self.artifact.extension.contains('.') {
            return Err(invalid(
                "artifact.extension",
                "extension must be non-empty and given without a dot",
            ));
        }
        if self.selectors.export_label.trim().is_empty() {
            return Err(invalid("selectors.export_label", "export label must not be empty"));
        }
        if self.service.profile_path_prefix.trim_matches('/').is_empty() {
            return Err(invalid(
                "service.profile_path_prefix",
                "profile path prefix must not be empty",
            ));
        }
        if self.service.post_login_url_patterns.is_empty() {
            return Err(invalid(
                "service.post_login_url_patterns",
                "at least one post-login URL pattern is required",
            ));
        }
        for pattern in &self.service.post_login_url_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(invalid(
                    "service.post_login_url_patterns",
                    &format!("invalid pattern {pattern:?}: {e}"),
                ));
            }
        }

        let selectors = &self.selectors;
        let mut locators = vec![
            ("selectors.login_form", &selectors.login_form),
            ("selectors.username_input", &selectors.username_input),
            ("selectors.password_input", &selectors.password_input),
            ("selectors.submit_button", &selectors.submit_button),
            ("selectors.overflow_actions", &selectors.overflow_actions),
            ("selectors.menu_items", &selectors.menu_items),
        ];
        if let Some(fallback) = &selectors.export_fallback {
            locators.push(("selectors.export_fallback", fallback));
        }
        for (key, locator) in locators {
            if locator.is_blank() {
                return Err(invalid(key, "selector must not be empty"));
            }
        }

        let timing = &self.timing;
        let polled = [
            ("timing.session_check", &timing.session_check),
            ("timing.login_fields", &timing.login_fields),
            ("timing.login_redirect", &timing.login_redirect),
            ("timing.artifact_poll", &timing.artifact_poll),
        ];
        for (key, policy) in polled {
            if policy.poll_interval.is_zero() {
                return Err(invalid(
                    &format!("{key}.poll_interval_ms"),
                    "poll interval must be greater than zero",
                ));
            }
        }
        let settles = [
            ("timing.page_settle", &timing.page_settle),
            ("timing.menu_settle", &timing.menu_settle),
            ("timing.claim_settle", &timing.claim_settle),
        ];
        for (key, policy) in polled.into_iter().chain(settles) {
            if !is_growth_factor(policy.backoff_multiplier) {
                return Err(invalid(
                    &format!("{key}.backoff_multiplier"),
                    "backoff multiplier must be a finite number >= 1.0",
                ));
            }
        }

        if !is_growth_factor(self.retry.backoff_multiplier) {
            return Err(invalid(
                "retry.backoff_multiplier",
                "backoff multiplier must be a finite number >= 1.0",
            ));
        }
        Ok(())
    }
}

fn is_growth_factor(multiplier: f64) -> bool {
    multiplier.is_finite() && multiplier >= 1.0
}

/// Account credentials for the interactive login
#[derive(Clone)]
pub struct Credentials {
    /// Account identifier
    pub username: String,
    password: String,
}

impl Credentials {
    /// Build credentials from explicit values
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read both values from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read both values through `lookup`; a missing or blank value is a precondition failure
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fetch = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Precondition(format!("{key} is not set")))
        };
        Ok(Self {
            username: fetch(USERNAME_ENV)?,
            password: fetch(PASSWORD_ENV)?,
        })
    }

    /// The account secret
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_session_file() -> PathBuf {
    PathBuf::from("./cookies.json")
}

fn default_targets_file() -> PathBuf {
    PathBuf::from("./profiles.txt")
}

fn default_login_url() -> String {
    "https://service.example/login".to_string()
}

fn default_landing_url() -> String {
    "https://service.example/feed/".to_string()
}

fn default_post_login_patterns() -> Vec<String> {
    vec![
        r"/feed/?".to_string(),
        r"/checkpoint/".to_string(),
        r"/check/".to_string(),
    ]
}

fn default_profile_prefix() -> String {
    "in".to_string()
}

fn default_login_form() -> Locator {
    Locator::Css("form.login__form".to_string())
}

fn default_username_input() -> Locator {
    Locator::Id("username".to_string())
}

fn default_password_input() -> Locator {
    Locator::Id("password".to_string())
}

fn default_submit_button() -> Locator {
    Locator::Css("button[type='submit']".to_string())
}

fn default_overflow_actions() -> Locator {
    Locator::Css("button[aria-label='More actions']".to_string())
}

fn default_overflow_index() -> usize {
    1
}

fn default_menu_items() -> Locator {
    Locator::Css("[role='menu'] [role='button'], [role='menu'] [role='menuitem']".to_string())
}

fn default_export_label() -> String {
    "Save to PDF".to_string()
}

fn default_extension() -> String {
    "pdf".to_string()
}

fn default_partial_suffixes() -> Vec<String> {
    vec![".crdownload".to_string(), ".part".to_string(), ".tmp".to_string()]
}

fn default_session_check() -> WaitPolicy {
    WaitPolicy::bounded(Duration::from_secs(10), Duration::from_millis(250))
}

fn default_login_fields() -> WaitPolicy {
    WaitPolicy::bounded(Duration::from_secs(10), Duration::from_millis(250))
}

fn default_login_redirect() -> WaitPolicy {
    WaitPolicy::bounded(Duration::from_secs(15), Duration::from_millis(250))
        .with_backoff(1.5, Duration::from_secs(1))
}

fn default_page_settle() -> WaitPolicy {
    WaitPolicy::fixed(Duration::from_secs(3))
}

fn default_menu_settle() -> WaitPolicy {
    WaitPolicy::fixed(Duration::from_secs(1))
}

fn default_artifact_poll() -> WaitPolicy {
    WaitPolicy::bounded(Duration::from_secs(30), Duration::from_millis(500))
}

fn default_claim_settle() -> WaitPolicy {
    WaitPolicy::fixed(Duration::from_secs(2))
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    1024
}

// Duration serialization helper (milliseconds)
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
