//! Scripted in-memory browser
//!
//! [`FakeDriver`] implements [`BrowserDriver`] over a set of [`FakePage`]s so
//! authentication, export triggering and whole pipeline runs can be exercised
//! without Chrome. Elements carry scripted [`FakeAction`]s that run when they
//! are clicked: redirecting, granting cookies, revealing a menu, or writing a
//! file into a download directory the way a browser would.
//!
//! Every driver call is appended to a log that tests can inspect.

use crate::browser::{BrowserDriver, Locator};
use crate::config::Config;
use crate::error::{BrowserError, Result};
use crate::session_store::SessionToken;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// Side effect of clicking a scripted element
#[derive(Clone, Debug)]
pub enum FakeAction {
    /// Change the current URL, as a form submit or redirect would
    Navigate(String),
    /// Add cookies to the session
    GrantCookies(Vec<SessionToken>),
    /// Make elements tagged with this group visible until the next navigation
    Reveal(String),
    /// Write a file immediately
    WriteFile {
        /// Destination
        path: PathBuf,
        /// Contents
        contents: Vec<u8>,
    },
    /// Write a file once `delay` has elapsed, without blocking the click
    WriteFileAfter {
        /// Destination
        path: PathBuf,
        /// Contents
        contents: Vec<u8>,
        /// How long the "download" takes
        delay: Duration,
    },
    /// Panic inside the driver call
    Panic(String),
}

/// One scripted element
#[derive(Clone, Debug)]
pub struct FakeElement {
    locator: Locator,
    id: String,
    text: String,
    actions: Vec<FakeAction>,
    reject_script_click: bool,
    revealed_by: Option<String>,
    hidden_with_cookie: Vec<(String, String)>,
}

impl FakeElement {
    /// Element found by `locator`
    pub fn new(locator: Locator) -> Self {
        Self {
            id: locator.to_string(),
            locator,
            text: String::new(),
            actions: Vec::new(),
            reject_script_click: false,
            revealed_by: None,
            hidden_with_cookie: Vec::new(),
        }
    }

    /// Label used for this element in the call log
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Rendered text
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Run `action` whenever the element is clicked
    pub fn on_click(mut self, action: FakeAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Fail script-level clicks, as an overlay-covered or detached node would
    pub fn reject_script_click(mut self) -> Self {
        self.reject_script_click = true;
        self
    }

    /// Only visible after a [`FakeAction::Reveal`] of `group`
    pub fn revealed_by(mut self, group: impl Into<String>) -> Self {
        self.revealed_by = Some(group.into());
        self
    }

    /// Hidden while the session holds cookie `name` with `value`
    pub fn hidden_with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.hidden_with_cookie.push((name.into(), value.into()));
        self
    }
}

/// A page reachable by URL
#[derive(Clone, Debug)]
pub struct FakePage {
    url: String,
    elements: Vec<FakeElement>,
    failing_lookups: bool,
}

impl FakePage {
    /// Empty page at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            elements: Vec::new(),
            failing_lookups: false,
        }
    }

    /// Add an element
    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Make every element lookup on this page return a driver error
    pub fn failing_lookups(mut self) -> Self {
        self.failing_lookups = true;
        self
    }
}

/// Handle to an element of a [`FakePage`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeHandle {
    page: String,
    index: usize,
}

#[derive(Debug, Default)]
struct FakeState {
    pages: HashMap<String, FakePage>,
    current: Option<String>,
    revealed: HashSet<String>,
    cookies: Vec<SessionToken>,
    rejected_cookies: HashSet<String>,
    navigation_failures: HashMap<String, u32>,
    cookie_reads_fail: bool,
    log: Vec<String>,
    typed: Vec<(String, String)>,
    quit: bool,
}

impl FakeState {
    fn element(&self, handle: &FakeHandle) -> Result<&FakeElement> {
        self.pages
            .get(&handle.page)
            .and_then(|page| page.elements.get(handle.index))
            .ok_or_else(|| BrowserError::Driver("stale element reference".into()).into())
    }

    fn is_visible(&self, element: &FakeElement) -> bool {
        if let Some(group) = &element.revealed_by
            && !self.revealed.contains(group)
        {
            return false;
        }
        !element.hidden_with_cookie.iter().any(|(name, value)| {
            self.cookies
                .iter()
                .any(|c| &c.name == name && &c.value == value)
        })
    }

    fn set_cookie(&mut self, token: SessionToken) {
        self.cookies.retain(|c| c.name != token.name || c.domain != token.domain);
        self.cookies.push(token);
    }

    fn run_actions(&mut self, actions: Vec<FakeAction>) -> Result<()> {
        for action in actions {
            match action {
                FakeAction::Navigate(url) => {
                    self.current = Some(url);
                    self.revealed.clear();
                }
                FakeAction::GrantCookies(tokens) => {
                    for token in tokens {
                        self.set_cookie(token);
                    }
                }
                FakeAction::Reveal(group) => {
                    self.revealed.insert(group);
                }
                FakeAction::WriteFile { path, contents } => {
                    std::fs::write(&path, contents)
                        .map_err(|e| BrowserError::Driver(format!("download failed: {e}")))?;
                }
                FakeAction::WriteFileAfter {
                    path,
                    contents,
                    delay,
                } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        tokio::fs::write(&path, contents).await.ok();
                    });
                }
                FakeAction::Panic(message) => panic!("{message}"),
            }
        }
        Ok(())
    }
}

/// In-memory [`BrowserDriver`]; clones share state
#[derive(Clone, Debug, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    /// Driver with no pages and no cookies
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a page, replacing any page at the same URL
    pub fn add_page(&self, page: FakePage) {
        self.state().pages.insert(page.url.clone(), page);
    }

    /// Refuse to set cookies named `name`
    pub fn reject_cookie(&self, name: impl Into<String>) {
        self.state().rejected_cookies.insert(name.into());
    }

    /// Fail the next `times` navigations to `url`
    pub fn fail_navigation(&self, url: impl Into<String>, times: u32) {
        self.state().navigation_failures.insert(url.into(), times);
    }

    /// Make every later cookie read fail
    pub fn fail_cookie_reads(&self) {
        self.state().cookie_reads_fail = true;
    }

    /// Every driver call so far, e.g. `navigate https://...` or `script_click menu`
    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// Ids of elements clicked through script, in order
    pub fn script_clicked(&self) -> Vec<String> {
        self.state()
            .log
            .iter()
            .filter_map(|entry| entry.strip_prefix("script_click "))
            .map(str::to_string)
            .collect()
    }

    /// URLs navigated to, in order
    pub fn visited(&self) -> Vec<String> {
        self.state()
            .log
            .iter()
            .filter_map(|entry| entry.strip_prefix("navigate "))
            .map(str::to_string)
            .collect()
    }

    /// (element id, text) pairs typed into inputs
    pub fn typed(&self) -> Vec<(String, String)> {
        self.state().typed.clone()
    }

    /// Cookies currently held by the session
    pub fn session_cookies(&self) -> Vec<SessionToken> {
        self.state().cookies.clone()
    }

    /// Whether [`BrowserDriver::quit`] was called
    pub fn is_quit(&self) -> bool {
        self.state().quit
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    type Element = FakeHandle;

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        state.log.push(format!("navigate {url}"));
        if let Some(remaining) = state.navigation_failures.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            }
            .into());
        }
        state.current = Some(url.to_string());
        state.revealed.clear();
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        let mut state = self.state();
        state.log.push("refresh".into());
        state.revealed.clear();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .state()
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".into()))
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<FakeHandle>> {
        let state = self.state();
        let Some(page) = state.current.as_ref().and_then(|url| state.pages.get(url)) else {
            return Ok(Vec::new());
        };
        if page.failing_lookups {
            return Err(BrowserError::Driver("target closed".into()).into());
        }
        Ok(page
            .elements
            .iter()
            .enumerate()
            .filter(|(_, element)| &element.locator == locator && state.is_visible(element))
            .map(|(index, _)| FakeHandle {
                page: page.url.clone(),
                index,
            })
            .collect())
    }

    async fn text(&self, element: &FakeHandle) -> Result<String> {
        Ok(self.state().element(element)?.text.clone())
    }

    async fn click(&self, element: &FakeHandle) -> Result<()> {
        let mut state = self.state();
        let (id, actions) = {
            let element = state.element(element)?;
            (element.id.clone(), element.actions.clone())
        };
        state.log.push(format!("click {id}"));
        state.run_actions(actions)
    }

    async fn script_click(&self, element: &FakeHandle) -> Result<()> {
        let mut state = self.state();
        let (id, actions, rejected) = {
            let element = state.element(element)?;
            (
                element.id.clone(),
                element.actions.clone(),
                element.reject_script_click,
            )
        };
        if rejected {
            state.log.push(format!("script_click_rejected {id}"));
            return Err(BrowserError::ScriptRejected("element is not clickable".into()).into());
        }
        state.log.push(format!("script_click {id}"));
        state.run_actions(actions)
    }

    async fn send_keys(&self, element: &FakeHandle, text: &str) -> Result<()> {
        let mut state = self.state();
        let id = state.element(element)?.id.clone();
        state.log.push(format!("type {id}"));
        state.typed.push((id, text.to_string()));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<SessionToken>> {
        let state = self.state();
        if state.cookie_reads_fail {
            return Err(BrowserError::Driver("cookie store unavailable".into()).into());
        }
        Ok(state.cookies.clone())
    }

    async fn set_cookie(&self, token: &SessionToken) -> Result<()> {
        let mut state = self.state();
        if state.rejected_cookies.contains(&token.name) {
            return Err(BrowserError::Driver(format!("invalid cookie {}", token.name)).into());
        }
        state.log.push(format!("set_cookie {}", token.name));
        state.set_cookie(token.clone());
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        let mut state = self.state();
        state.log.push("quit".into());
        state.quit = true;
        Ok(())
    }
}

/// Value of the session cookie granted by [`login_pages`]
pub const SESSION_COOKIE: (&str, &str) = ("li_at", "fresh-session");

/// File name the fake service gives a finished export
pub const EXPORT_FILE_NAME: &str = "Profile.pdf";

/// Login page and landing page wired to `config`'s service URLs and selectors
///
/// Submitting the login form grants [`SESSION_COOKIE`] and redirects to the
/// landing page. The landing page shows the login form unless the session
/// holds [`SESSION_COOKIE`] or one of `also_valid` (cookie name, value) pairs.
pub fn login_pages(config: &Config, also_valid: &[(&str, &str)]) -> Vec<FakePage> {
    let selectors = &config.selectors;
    let (name, value) = SESSION_COOKIE;
    let domain = Url::parse(&config.service.landing_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let login = FakePage::new(config.service.login_url.clone())
        .element(FakeElement::new(selectors.username_input.clone()).id("username"))
        .element(FakeElement::new(selectors.password_input.clone()).id("password"))
        .element(
            FakeElement::new(selectors.submit_button.clone())
                .id("submit")
                .on_click(FakeAction::GrantCookies(vec![SessionToken::new(
                    name, value, domain,
                )]))
                .on_click(FakeAction::Navigate(config.service.landing_url.clone())),
        );

    let mut form = FakeElement::new(selectors.login_form.clone())
        .id("login-form")
        .hidden_with_cookie(name, value);
    for (name, value) in also_valid {
        form = form.hidden_with_cookie(*name, *value);
    }
    let landing = FakePage::new(config.service.landing_url.clone()).element(form);

    vec![login, landing]
}

fn profile_page(config: &Config, url: &str, export: FakeElement) -> FakePage {
    let overflow = config.selectors.overflow_actions.clone();
    let mut page = FakePage::new(url);
    for index in 0..=config.selectors.overflow_index {
        let mut control = FakeElement::new(overflow.clone()).id(format!("overflow-{index}"));
        if index == config.selectors.overflow_index {
            control = control.on_click(FakeAction::Reveal("menu".into()));
        }
        page = page.element(control);
    }
    page.element(
        FakeElement::new(config.selectors.menu_items.clone())
            .id("share")
            .text("Share profile")
            .revealed_by("menu"),
    )
    .element(export.revealed_by("menu"))
}

/// Profile whose export item writes [`EXPORT_FILE_NAME`] into the output directory
///
/// The file first appears with a `.crdownload` suffix and finishes after `delay`.
pub fn exporting_profile(config: &Config, url: &str, delay: Duration) -> FakePage {
    let dir = &config.paths.output_dir;
    let item = FakeElement::new(config.selectors.menu_items.clone())
        .id("export")
        .text(config.selectors.export_label.clone())
        .on_click(FakeAction::WriteFile {
            path: dir.join(format!("{EXPORT_FILE_NAME}.crdownload")),
            contents: b"%PDF-1.7 partial".to_vec(),
        })
        .on_click(FakeAction::WriteFileAfter {
            path: dir.join(EXPORT_FILE_NAME),
            contents: format!("%PDF-1.7 {url}").into_bytes(),
            delay,
        });
    profile_page(config, url, item)
}

/// Profile whose export item accepts the click but never produces a file
pub fn silent_profile(config: &Config, url: &str) -> FakePage {
    let item = FakeElement::new(config.selectors.menu_items.clone())
        .id("export")
        .text(config.selectors.export_label.clone());
    profile_page(config, url, item)
}

/// Profile with fewer overflow controls than the configured index needs
pub fn profile_without_actions(config: &Config, url: &str) -> FakePage {
    let mut page = FakePage::new(url);
    for index in 0..config.selectors.overflow_index {
        page = page.element(
            FakeElement::new(config.selectors.overflow_actions.clone()).id(format!("overflow-{index}")),
        );
    }
    page
}

/// Profile whose export item panics inside the driver
pub fn panicking_profile(config: &Config, url: &str) -> FakePage {
    let item = FakeElement::new(config.selectors.menu_items.clone())
        .id("export")
        .text(config.selectors.export_label.clone())
        .on_click(FakeAction::Panic("renderer crashed".into()));
    profile_page(config, url, item)
}
