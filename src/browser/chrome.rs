//! Chrome DevTools Protocol driver via chromiumoxide

use crate::config::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Launch and page-readiness settings for Chrome
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    /// Run browser in headless mode
    pub headless: bool,
    /// Enable sandbox (disable for Docker/CI environments)
    pub sandbox: bool,
    /// Explicit executable; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
    /// Pause after the body is ready
    pub settle: Duration,
    /// Upper bound for a single CDP request
    pub request_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chrome_path: None,
            settle: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ChromeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.browser.headless,
            sandbox: config.browser.sandbox,
            chrome_path: config.browser.chrome_path.clone(),
            settle: Duration::from_millis(config.harvest.page_settle_ms),
            request_timeout: config.harvest.page_timeout(),
        }
    }
}

#[cfg(feature = "browser")]
mod chrome_impl {
    use super::*;
    use crate::browser::{click_script, BrowserDriver, PageSession};
    use crate::error::{BrowserError, BrowserResult};
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams,
    };
    use chromiumoxide::Page;
    use futures::StreamExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    fn navigation_error(url: &str, reason: impl std::fmt::Display) -> BrowserError {
        BrowserError::NavigationFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Lazily launched Chrome with one browser context per page
    pub struct ChromeDriver {
        options: ChromeOptions,
        browser: Arc<Mutex<Option<Browser>>>,
        handler_handle: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    }

    impl ChromeDriver {
        pub fn new(options: ChromeOptions) -> Self {
            Self {
                options,
                browser: Arc::new(Mutex::new(None)),
                handler_handle: Arc::new(Mutex::new(None)),
            }
        }

        async fn ensure_browser(&self) -> BrowserResult<()> {
            let mut browser_guard = self.browser.lock().await;
            if browser_guard.is_some() {
                return Ok(());
            }

            info!("Launching Chrome (headless: {})", self.options.headless);

            let mut builder = BrowserConfig::builder().request_timeout(self.options.request_timeout);
            if !self.options.headless {
                builder = builder.with_head();
            }
            if !self.options.sandbox {
                builder = builder.no_sandbox();
            }
            if let Some(path) = &self.options.chrome_path {
                builder = builder.chrome_executable(path);
            }
            builder = builder
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--disable-extensions");

            let browser_config = builder
                .build()
                .map_err(|e| BrowserError::NavigationFailed {
                    url: String::new(),
                    reason: format!("invalid browser config: {}", e),
                })?;

            let (browser, mut handler) =
                Browser::launch(browser_config)
                    .await
                    .map_err(|e| BrowserError::NavigationFailed {
                        url: String::new(),
                        reason: format!("failed to launch browser: {}", e),
                    })?;

            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            *browser_guard = Some(browser);
            *self.handler_handle.lock().await = Some(handle);
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserDriver for ChromeDriver {
        async fn open(&self, url: &str) -> BrowserResult<Box<dyn PageSession>> {
            self.ensure_browser().await?;

            let (context, page) = {
                let mut guard = self.browser.lock().await;
                let browser = guard
                    .as_mut()
                    .ok_or_else(|| navigation_error(url, "browser not running"))?;

                let context = browser
                    .create_browser_context(CreateBrowserContextParams::default())
                    .await
                    .map_err(|e| navigation_error(url, e))?;

                let target = CreateTargetParams::builder()
                    .url(url)
                    .browser_context_id(context.clone())
                    .build()
                    .map_err(|e| navigation_error(url, e))?;

                match browser.new_page(target).await {
                    Ok(page) => (context, page),
                    Err(e) => {
                        let _ = browser.dispose_browser_context(context).await;
                        return Err(navigation_error(url, e));
                    }
                }
            };

            let mut session = ChromePage {
                url: url.to_string(),
                page: Some(page.clone()),
                context: Some(context),
                browser: self.browser.clone(),
            };

            if let Err(e) = page.wait_for_navigation().await {
                session.close().await;
                return Err(navigation_error(url, e));
            }
            if let Err(e) = page.find_element("body").await {
                session.close().await;
                return Err(navigation_error(url, format!("body not ready: {}", e)));
            }

            if !self.options.settle.is_zero() {
                tokio::time::sleep(self.options.settle).await;
            }

            debug!(url = %url, "Page ready");
            Ok(Box::new(session))
        }

        async fn shutdown(&self) {
            let mut browser_guard = self.browser.lock().await;
            if let Some(mut browser) = browser_guard.take() {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser: {}", e);
                }
            }

            if let Some(handle) = self.handler_handle.lock().await.take() {
                handle.abort();
            }
        }
    }

    struct ChromePage {
        url: String,
        page: Option<Page>,
        context: Option<BrowserContextId>,
        browser: Arc<Mutex<Option<Browser>>>,
    }

    async fn release(
        page: Option<Page>,
        context: Option<BrowserContextId>,
        browser: Arc<Mutex<Option<Browser>>>,
    ) {
        if let Some(page) = page {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }
        if let Some(context) = context {
            let guard = browser.lock().await;
            if let Some(browser) = guard.as_ref() {
                if let Err(e) = browser.dispose_browser_context(context).await {
                    debug!("Failed to dispose browser context: {}", e);
                }
            }
        }
    }

    #[async_trait]
    impl PageSession for ChromePage {
        async fn evaluate(&mut self, expression: &str) -> BrowserResult<Value> {
            let page = self
                .page
                .as_ref()
                .ok_or_else(|| BrowserError::ScriptError("page already closed".to_string()))?;

            let result = page
                .evaluate(expression)
                .await
                .map_err(|e| BrowserError::ScriptError(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        }

        async fn click(&mut self, selector: &str) -> BrowserResult<bool> {
            match self.evaluate(&click_script(selector)).await? {
                Value::Bool(clicked) => Ok(clicked),
                _ => Ok(false),
            }
        }

        async fn close(&mut self) {
            debug!(url = %self.url, "Closing page");
            release(self.page.take(), self.context.take(), self.browser.clone()).await;
        }
    }

    impl Drop for ChromePage {
        fn drop(&mut self) {
            let page = self.page.take();
            let context = self.context.take();
            if page.is_none() && context.is_none() {
                return;
            }

            // abandoned mid-visit (timeout or deadline)
            let browser = self.browser.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(release(page, context, browser));
            }
        }
    }
}

#[cfg(feature = "browser")]
pub use chrome_impl::ChromeDriver;

/// Stub driver when the browser feature is disabled
#[cfg(not(feature = "browser"))]
pub struct ChromeDriver {
    _options: ChromeOptions,
}

#[cfg(not(feature = "browser"))]
impl ChromeDriver {
    pub fn new(options: ChromeOptions) -> Self {
        Self { _options: options }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl super::BrowserDriver for ChromeDriver {
    async fn open(
        &self,
        url: &str,
    ) -> crate::error::BrowserResult<Box<dyn super::PageSession>> {
        Err(crate::error::BrowserError::NavigationFailed {
            url: url.to_string(),
            reason: "built without the 'browser' feature".to_string(),
        })
    }
}

/// Check if a real browser backend was compiled in
pub fn is_browser_available() -> bool {
    cfg!(feature = "browser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.browser.sandbox = false;
        config.harvest.page_settle_ms = 250;

        let options = ChromeOptions::from_config(&config);
        assert!(!options.sandbox);
        assert!(options.headless);
        assert_eq!(options.settle, Duration::from_millis(250));
        assert_eq!(options.request_timeout, Duration::from_secs(120));
    }
}
