//! Headless browser access for detail pages
//!
//! A [`BrowserDriver`] hands out one [`PageSession`] per target page, each
//! in its own isolated browser context. Callers normally go through
//! [`with_page`], which bounds the whole page visit by a wall-clock limit
//! and always releases the session.

mod chrome;
#[cfg(test)]
pub(crate) mod testing;

pub use chrome::*;

use crate::error::{BrowserError, BrowserResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Opens isolated pages
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate a fresh context to `url` and wait until the body is ready
    async fn open(&self, url: &str) -> BrowserResult<Box<dyn PageSession>>;

    /// Release the underlying browser process, if any
    async fn shutdown(&self) {}
}

/// One loaded page
#[async_trait]
pub trait PageSession: Send {
    /// Evaluate a script expression and return its JSON value
    async fn evaluate(&mut self, expression: &str) -> BrowserResult<Value>;

    /// Click the first element matching `selector`; `false` if nothing matched
    async fn click(&mut self, selector: &str) -> BrowserResult<bool>;

    /// Tear down the page and its context
    async fn close(&mut self);
}

/// Run `f` against a freshly opened page, bounded by `limit`.
///
/// The limit covers navigation too. On expiry the visit is abandoned and
/// [`BrowserError::Timeout`] is returned.
pub async fn with_page<T, F>(
    driver: &dyn BrowserDriver,
    url: &str,
    limit: Duration,
    f: F,
) -> BrowserResult<T>
where
    T: Send,
    F: for<'p> FnOnce(&'p mut dyn PageSession) -> BoxFuture<'p, BrowserResult<T>> + Send,
{
    let visit = async {
        let mut page = driver.open(url).await?;
        let result = f(page.as_mut()).await;
        page.close().await;
        result
    };

    match tokio::time::timeout(limit, visit).await {
        Ok(result) => result,
        Err(_) => {
            debug!(url = %url, "Page visit exceeded {:?}", limit);
            Err(BrowserError::Timeout {
                url: url.to_string(),
                after: limit,
            })
        }
    }
}

/// Evaluate and expect a string; `null`/`undefined` read as empty
pub async fn eval_string(page: &mut dyn PageSession, expression: &str) -> BrowserResult<String> {
    match page.evaluate(expression).await? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(BrowserError::ScriptError(format!(
            "expected string, got {}",
            other
        ))),
    }
}

/// Evaluate and expect a boolean; `null`/`undefined` read as false
pub async fn eval_bool(page: &mut dyn PageSession, expression: &str) -> BrowserResult<bool> {
    match page.evaluate(expression).await? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        other => Err(BrowserError::ScriptError(format!(
            "expected bool, got {}",
            other
        ))),
    }
}

/// Evaluate and deserialize the result
pub async fn eval_json<T: DeserializeOwned>(
    page: &mut dyn PageSession,
    expression: &str,
) -> BrowserResult<T> {
    let value = page.evaluate(expression).await?;
    serde_json::from_value(value)
        .map_err(|e| BrowserError::ScriptError(format!("unexpected result shape: {}", e)))
}

/// JS string literal for `s`
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Trimmed `textContent` of the element with `id`, or `''`
pub fn element_text_script(id: &str) -> String {
    format!(
        "(() => {{ const el = document.getElementById({}); return el ? el.textContent.trim() : ''; }})()",
        js_string(id)
    )
}

/// Click the first match of `selector`, reporting whether one existed
pub fn click_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
        js_string(selector)
    )
}

/// Absolute hrefs of all anchors matching `selector`
pub fn links_script(selector: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll({})).map(a => a.href)",
        js_string(selector)
    )
}

/// Attribute selector for a tab carrying `title`
pub fn title_selector(title: &str) -> String {
    format!("[title={}]", js_string(title))
}
