//! Session restore and interactive login
//!
//! The authenticator moves through
//!
//! ```text
//! Unauthenticated -> SessionRestoring -> SessionValidating -> Authenticated
//!                          |                    |
//!                          +--> CredentialLogin <+
//!                                     |
//!                                     +--> Authenticated | LoginFailed
//! ```
//!
//! A missing or corrupt session store, or a restored session the service does
//! not accept, always routes through the credential login. Only a failed
//! login is fatal to the run.

use crate::browser::BrowserDriver;
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::session_store::SessionStore;
use crate::types::Event;
use crate::wait::{find_within, poll_until};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Where the authenticator is in its state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing attempted yet
    Unauthenticated,
    /// Applying stored tokens
    SessionRestoring,
    /// Checking whether the service accepts the restored session
    SessionValidating,
    /// Logging in with credentials
    CredentialLogin,
    /// The browser holds a valid session
    Authenticated,
    /// The credential login did not succeed
    LoginFailed,
}

/// Establishes an authenticated browser session, restoring it when possible
pub struct Authenticator {
    config: Arc<Config>,
    store: SessionStore,
    credentials: Credentials,
    post_login: Vec<Regex>,
    state: AuthState,
    event_tx: broadcast::Sender<Event>,
}

impl Authenticator {
    /// Authenticator using the configured session file and post-login patterns
    pub fn new(
        config: Arc<Config>,
        credentials: Credentials,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let post_login = config
            .service
            .post_login_url_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| Error::Config {
                    message: format!("invalid post-login pattern {pattern:?}: {e}"),
                    key: Some("service.post_login_url_patterns".into()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            store: SessionStore::new(config.paths.session_file.clone()),
            config,
            credentials,
            post_login,
            state: AuthState::Unauthenticated,
            event_tx,
        })
    }

    /// Current state
    pub fn state(&self) -> AuthState {
        self.state
    }

    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    fn require_login(&mut self, reason: String) {
        info!(%reason, "interactive login required");
        self.state = AuthState::CredentialLogin;
        self.emit_event(Event::LoginRequired { reason });
    }

    /// Reach [`AuthState::Authenticated`], restoring the stored session if the service accepts it
    pub async fn authenticate<D>(&mut self, driver: &D) -> Result<()>
    where
        D: BrowserDriver + ?Sized,
    {
        if self.restore_session(driver).await? && self.validate_session(driver).await {
            info!("restored session accepted");
            self.emit_event(Event::Authenticated { restored: true });
            return Ok(());
        }
        self.credential_login(driver).await
    }

    /// Apply the stored token set to the browser
    ///
    /// Returns `false` (state [`AuthState::CredentialLogin`]) when there is
    /// nothing usable to restore. Tokens are applied one by one; an expired or
    /// rejected token is logged and skipped. The landing page is refreshed so
    /// the service sees the restored cookies.
    pub async fn restore_session<D>(&mut self, driver: &D) -> Result<bool>
    where
        D: BrowserDriver + ?Sized,
    {
        self.state = AuthState::SessionRestoring;

        let tokens = match self.store.load().await {
            Ok(tokens) if tokens.is_empty() => {
                self.require_login("session store is empty".into());
                return Ok(false);
            }
            Ok(tokens) => tokens,
            Err(e) => {
                self.require_login(e.to_string());
                return Ok(false);
            }
        };

        let landing = self.config.service.landing_url.as_str();
        with_retry(&self.config.retry, move || driver.navigate(landing)).await?;

        let mut applied = 0;
        let mut skipped = 0;
        for token in &tokens {
            if token.is_expired() {
                debug!(name = %token.name, "skipping expired token");
                skipped += 1;
                continue;
            }
            match driver.set_cookie(token).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(name = %token.name, error = %e, "browser rejected stored token");
                    skipped += 1;
                }
            }
        }

        if applied == 0 {
            self.require_login(format!("none of {} stored tokens could be applied", tokens.len()));
            return Ok(false);
        }

        driver.refresh().await?;
        info!(applied, skipped, "session restored");
        self.emit_event(Event::SessionRestored { applied, skipped });
        self.state = AuthState::SessionValidating;
        Ok(true)
    }

    /// Check whether the service accepted the restored session
    ///
    /// The login form showing up within the session-check window means the
    /// session was rejected. Its absence for the whole window means the
    /// session is valid.
    pub async fn validate_session<D>(&mut self, driver: &D) -> bool
    where
        D: BrowserDriver + ?Sized,
    {
        self.state = AuthState::SessionValidating;
        let login_form = &self.config.selectors.login_form;

        match find_within(driver, login_form, &self.config.timing.session_check).await {
            Ok(_) => {
                self.require_login("stored session was rejected".into());
                false
            }
            Err(_) => {
                self.state = AuthState::Authenticated;
                true
            }
        }
    }

    /// Log in with credentials and persist the resulting session
    ///
    /// A failure to read or persist the session cookies is logged; the run
    /// continues authenticated. Any other failure leaves the state at
    /// [`AuthState::LoginFailed`].
    pub async fn credential_login<D>(&mut self, driver: &D) -> Result<()>
    where
        D: BrowserDriver + ?Sized,
    {
        self.state = AuthState::CredentialLogin;

        if let Err(e) = self.submit_credentials(driver).await {
            self.state = AuthState::LoginFailed;
            warn!(error = %e, "credential login failed");
            return Err(e);
        }

        // the browser is logged in either way; only the next run's restore is lost
        match driver.cookies().await {
            Ok(tokens) => {
                if let Err(e) = self.store.save(&tokens).await {
                    warn!(error = %e, "could not persist session, continuing without it");
                }
            }
            Err(e) => warn!(error = %e, "could not read session cookies, continuing without saving"),
        }

        info!(username = %self.credentials.username, "logged in");
        self.state = AuthState::Authenticated;
        self.emit_event(Event::Authenticated { restored: false });
        Ok(())
    }

    async fn submit_credentials<D>(&self, driver: &D) -> Result<()>
    where
        D: BrowserDriver + ?Sized,
    {
        let selectors = &self.config.selectors;
        let timing = &self.config.timing;

        let login_url = self.config.service.login_url.as_str();
        with_retry(&self.config.retry, move || driver.navigate(login_url)).await?;

        let username = find_within(driver, &selectors.username_input, &timing.login_fields).await?;
        let password = find_within(driver, &selectors.password_input, &timing.login_fields).await?;
        let submit = find_within(driver, &selectors.submit_button, &timing.login_fields).await?;

        if let Some(input) = username.first() {
            driver.send_keys(input, &self.credentials.username).await?;
        }
        if let Some(input) = password.first() {
            driver.send_keys(input, self.credentials.password()).await?;
        }
        if let Some(button) = submit.first() {
            driver.click(button).await?;
        }

        let post_login = &self.post_login;
        let landed = poll_until(&timing.login_redirect, move || async move {
            let url = driver.current_url().await.ok()?;
            post_login.iter().any(|re| re.is_match(&url)).then_some(url)
        })
        .await;

        match landed {
            Some(url) => {
                debug!(%url, "reached post-login page");
                Ok(())
            }
            None => {
                let url = driver.current_url().await.unwrap_or_default();
                Err(Error::LoginFailed(format!(
                    "no post-login page within {}ms (still at {url})",
                    timing.login_redirect.timeout.as_millis()
                )))
            }
        }
    }
}
