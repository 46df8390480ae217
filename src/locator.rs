//! Ordered locator fallback chains
//!
//! The remote UI changes without notice, so an element is described by a list
//! of [`Matcher`]s tried in order. The first matcher that both finds an element
//! and gets it to accept a script-level click wins.

use crate::browser::{BrowserDriver, Locator};
use crate::error::{BrowserError, Result};
use tracing::debug;

/// One strategy for finding an element
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matcher {
    /// Short label used in logs
    pub name: String,
    /// Where to look
    pub locator: Locator,
    /// Keep only elements whose rendered text contains this
    pub text_contains: Option<String>,
}

impl Matcher {
    /// Match every element found by `locator`
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
            text_contains: None,
        }
    }

    /// Only match elements whose text contains `text`
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_contains = Some(text.into());
        self
    }

    /// First element currently satisfying this matcher, if any
    pub async fn locate<D>(&self, driver: &D) -> Result<Option<D::Element>>
    where
        D: BrowserDriver + ?Sized,
    {
        let elements = driver.find_all(&self.locator).await?;
        let Some(needle) = &self.text_contains else {
            return Ok(elements.into_iter().next());
        };

        for element in elements {
            match driver.text(&element).await {
                Ok(text) if text.contains(needle.as_str()) => return Ok(Some(element)),
                Ok(_) => {}
                Err(e) => debug!(matcher = %self.name, error = %e, "could not read element text"),
            }
        }
        Ok(None)
    }
}

/// Matchers tried in sequence until one succeeds
#[derive(Clone, Debug, Default)]
pub struct LocatorChain {
    matchers: Vec<Matcher>,
}

impl LocatorChain {
    /// Chain over `matchers`, highest priority first
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    /// The strategies, in the order they are tried
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Locate and script-click the first element any matcher yields
    ///
    /// Returns the index of the matcher that succeeded. A matcher fails when
    /// its lookup errors, finds nothing, or the click is rejected; the next one
    /// is then tried. [`BrowserError::AllLocatorsFailed`] when none succeed.
    pub async fn activate<D>(&self, driver: &D) -> Result<usize>
    where
        D: BrowserDriver + ?Sized,
    {
        for (index, matcher) in self.matchers.iter().enumerate() {
            let element = match matcher.locate(driver).await {
                Ok(Some(element)) => element,
                Ok(None) => {
                    debug!(matcher = %matcher.name, locator = %matcher.locator, "no match");
                    continue;
                }
                Err(e) => {
                    debug!(matcher = %matcher.name, error = %e, "lookup failed");
                    continue;
                }
            };

            match driver.script_click(&element).await {
                Ok(()) => {
                    debug!(matcher = %matcher.name, index, "element activated");
                    return Ok(index);
                }
                Err(e) => debug!(matcher = %matcher.name, error = %e, "click rejected"),
            }
        }

        Err(BrowserError::AllLocatorsFailed {
            tried: self.matchers.len(),
        }
        .into())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{FakeDriver, FakeElement, FakePage};

    const MENU: &str = "[role='menu'] [role='menuitem']";

    fn chain() -> LocatorChain {
        LocatorChain::new(vec![
            Matcher::new("menu item", Locator::Css(MENU.into())).with_text("Save to PDF"),
            Matcher::new("document text", Locator::XPath("//*[contains(text(), 'Save to PDF')]".into())),
        ])
    }

    #[tokio::test]
    async fn primary_match_wins() {
        let driver = FakeDriver::new();
        driver.add_page(
            FakePage::new("https://service.example/in/jane")
                .element(FakeElement::new(Locator::Css(MENU.into())).text("Share profile"))
                .element(FakeElement::new(Locator::Css(MENU.into())).text("Save to PDF").id("pdf")),
        );
        driver.navigate("https://service.example/in/jane").await.unwrap();

        assert_eq!(chain().activate(&driver).await.unwrap(), 0);
        assert_eq!(driver.script_clicked(), vec!["pdf"]);
    }

    #[tokio::test]
    async fn rejected_click_falls_through_to_next_matcher() {
        let driver = FakeDriver::new();
        driver.add_page(
            FakePage::new("https://service.example/in/jane")
                .element(
                    FakeElement::new(Locator::Css(MENU.into()))
                        .text("Save to PDF")
                        .id("menu")
                        .reject_script_click(),
                )
                .element(
                    FakeElement::new(Locator::XPath("//*[contains(text(), 'Save to PDF')]".into()))
                        .text("Save to PDF")
                        .id("loose"),
                ),
        );
        driver.navigate("https://service.example/in/jane").await.unwrap();

        assert_eq!(chain().activate(&driver).await.unwrap(), 1);
        assert_eq!(driver.script_clicked(), vec!["loose"]);
    }

    #[tokio::test]
    async fn text_filter_excludes_other_items() {
        let driver = FakeDriver::new();
        driver.add_page(
            FakePage::new("https://service.example/in/jane")
                .element(FakeElement::new(Locator::Css(MENU.into())).text("Report")),
        );
        driver.navigate("https://service.example/in/jane").await.unwrap();

        let err = chain().activate(&driver).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Browser(BrowserError::AllLocatorsFailed { tried: 2 })
        ));
        assert!(driver.script_clicked().is_empty());
    }
}
