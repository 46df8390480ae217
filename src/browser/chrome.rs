//! Chrome implementation of [`BrowserDriver`] over the DevTools protocol (chromiumoxide)

use super::{BrowserDriver, Locator};
use crate::config::BrowserSettings;
use crate::error::{BrowserError, Result};
use crate::session_store::SessionToken;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::{Browser, Element, Page};
use futures::StreamExt;
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A single Chrome process with one page, owned by the pipeline for a whole run
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    /// Launch Chrome and route its downloads into `download_dir`
    ///
    /// The download directory is created if missing; Chrome requires an
    /// absolute path so it is canonicalized first.
    pub async fn launch(settings: &BrowserSettings, download_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(download_dir).await?;
        let download_dir = tokio::fs::canonicalize(download_dir).await?;

        let mut builder = chromiumoxide::BrowserConfig::builder()
            .window_size(settings.window_width, settings.window_height)
            .viewport(None);
        if !settings.headless {
            builder = builder.with_head();
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while its handler is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(format!("failed to open page: {e}")))?;

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy().into_owned())
            .build()
            .map_err(BrowserError::Launch)?;
        page.execute(behavior)
            .await
            .map_err(|e| BrowserError::Launch(format!("failed to set download directory: {e}")))?;

        info!(
            headless = settings.headless,
            download_dir = %download_dir.display(),
            "browser launched"
        );

        Ok(Self {
            browser,
            page,
            handler,
        })
    }
}

fn driver_err(e: impl std::fmt::Display) -> crate::Error {
    BrowserError::Driver(e.to_string()).into()
}

fn to_cookie_param(token: &SessionToken) -> Result<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(token.name.clone())
        .value(token.value.clone())
        .domain(token.domain.clone())
        .path(token.path.clone())
        .secure(token.secure)
        .http_only(token.http_only);
    if let Some(expires) = token.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    if let Some(same_site) = token.same_site.as_deref() {
        let same_site = match same_site.to_ascii_lowercase().as_str() {
            "strict" => Some(CookieSameSite::Strict),
            "lax" => Some(CookieSameSite::Lax),
            "none" => Some(CookieSameSite::None),
            _ => None,
        };
        if let Some(same_site) = same_site {
            builder = builder.same_site(same_site);
        }
    }
    builder.build().map_err(|e| BrowserError::Driver(e).into())
}

fn from_cookie(cookie: Cookie) -> SessionToken {
    let same_site = cookie.same_site.map(|s| {
        match s {
            CookieSameSite::Strict => "Strict",
            CookieSameSite::Lax => "Lax",
            CookieSameSite::None => "None",
        }
        .to_string()
    });
    SessionToken {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        // CDP reports session cookies with a non-positive expiry
        expires: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
        secure: cookie.secure,
        http_only: cookie.http_only,
        same_site,
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.page.reload().await.map_err(driver_err)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(driver_err)?;
        Ok(url.unwrap_or_default())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Element>> {
        let found = match locator {
            Locator::XPath(xpath) => self.page.find_xpaths(xpath.as_str()).await,
            other => {
                let css = other.as_css().unwrap_or_default();
                self.page.find_elements(css).await
            }
        };
        found.map_err(driver_err)
    }

    async fn text(&self, element: &Element) -> Result<String> {
        let text = element.inner_text().await.map_err(driver_err)?;
        Ok(text.unwrap_or_default())
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await.map_err(driver_err)?;
        Ok(())
    }

    async fn script_click(&self, element: &Element) -> Result<()> {
        let returns = element
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| BrowserError::ScriptRejected(e.to_string()))?;
        if let Some(details) = returns.exception_details {
            return Err(BrowserError::ScriptRejected(details.text).into());
        }
        Ok(())
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<()> {
        element.click().await.map_err(driver_err)?;
        element.type_str(text).await.map_err(driver_err)?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<SessionToken>> {
        let cookies = self.page.get_cookies().await.map_err(driver_err)?;
        Ok(cookies.into_iter().map(from_cookie).collect())
    }

    async fn set_cookie(&self, token: &SessionToken) -> Result<()> {
        let param = to_cookie_param(token)?;
        self.page.set_cookie(param).await.map_err(driver_err)?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "browser process did not exit cleanly");
        }
        self.handler.abort();
        closed.map_err(driver_err)?;
        info!("browser closed");
        Ok(())
    }
}
