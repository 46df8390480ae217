//! Browser driver seam
//!
//! The pipeline only needs a small capability set from a browser: navigate,
//! locate elements, click (natively or through script), type, read and write
//! cookies, read the current URL, and quit. [`BrowserDriver`] captures that set
//! so authentication and export logic can run against Chrome
//! ([`ChromeDriver`]) or against an in-memory page model in tests.

use crate::error::Result;
use crate::session_store::SessionToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

mod chrome;

pub use chrome::ChromeDriver;

/// How to find elements on the current page
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Match the `id` attribute exactly
    Id(String),
    /// CSS selector
    Css(String),
    /// XPath expression
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Locator {
    /// CSS selector equivalent for `Id` and `Css` locators
    pub fn as_css(&self) -> Option<String> {
        match self {
            Locator::Id(id) => Some(format!("[id=\"{}\"]", id.replace('"', "\\\""))),
            Locator::Css(css) => Some(css.clone()),
            Locator::XPath(_) => None,
        }
    }

    /// Whether the selector string is empty or whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            Locator::Id(v) | Locator::Css(v) | Locator::XPath(v) => v.trim().is_empty(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "id={v}"),
            Locator::Css(v) => write!(f, "css={v}"),
            Locator::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

/// Capability set the pipeline needs from a browser session
///
/// Lookups are immediate; bounded waits are layered on top in
/// [`crate::wait::find_within`].
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Handle to an element found on the current page
    type Element: Send + Sync;

    /// Load `url` in the active page
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Reload the active page
    async fn refresh(&self) -> Result<()>;

    /// URL of the active page
    async fn current_url(&self) -> Result<String>;

    /// All elements currently matching `locator`, in document order
    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Element>>;

    /// Rendered text of an element
    async fn text(&self, element: &Self::Element) -> Result<String>;

    /// Click with simulated pointer input
    async fn click(&self, element: &Self::Element) -> Result<()>;

    /// Invoke the element's `click()` from page script, bypassing pointer simulation
    async fn script_click(&self, element: &Self::Element) -> Result<()>;

    /// Focus an input and type `text` into it
    async fn send_keys(&self, element: &Self::Element, text: &str) -> Result<()>;

    /// Every cookie visible to the browser session
    async fn cookies(&self) -> Result<Vec<SessionToken>>;

    /// Add one cookie to the browser session
    async fn set_cookie(&self, token: &SessionToken) -> Result<()>;

    /// Close the browser session
    async fn quit(&mut self) -> Result<()>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_serializes_with_tag() {
        let json = serde_json::to_string(&Locator::XPath("//a".into())).unwrap();
        assert_eq!(json, r#"{"by":"xpath","value":"//a"}"#);

        let parsed: Locator = serde_json::from_str(r#"{"by":"css","value":"form.login"}"#).unwrap();
        assert_eq!(parsed, Locator::Css("form.login".into()));
    }

    #[test]
    fn id_locator_becomes_attribute_selector() {
        assert_eq!(
            Locator::Id("username".into()).as_css().as_deref(),
            Some(r#"[id="username"]"#)
        );
        assert_eq!(Locator::XPath("//div".into()).as_css(), None);
    }
}
