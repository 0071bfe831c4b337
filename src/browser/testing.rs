//! Scripted browser for tests

use super::{click_script, element_text_script, links_script, BrowserDriver, PageSession};
use crate::error::{BrowserError, BrowserResult};
use crate::extract::{TableCandidate, TABLE_PROBE_SCRIPT};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Behavior {
    Load,
    Hang,
    Timeout,
    ScriptFailure,
}

/// Canned content of one page
#[derive(Debug, Clone)]
pub struct FakePage {
    behavior: Behavior,
    scripts: HashMap<String, Value>,
    clickable: Vec<String>,
    stalled: Vec<String>,
    panels: HashMap<String, Vec<TableCandidate>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            behavior: Behavior::Load,
            scripts: HashMap::new(),
            clickable: Vec::new(),
            stalled: Vec::new(),
            panels: HashMap::new(),
        }
    }

    /// Page whose navigation never completes
    pub fn hang() -> Self {
        Self {
            behavior: Behavior::Hang,
            ..Self::new()
        }
    }

    /// Page whose navigation reports a timeout
    pub fn timeout() -> Self {
        Self {
            behavior: Behavior::Timeout,
            ..Self::new()
        }
    }

    /// Page that loads but fails every script
    pub fn broken_scripts() -> Self {
        Self {
            behavior: Behavior::ScriptFailure,
            ..Self::new()
        }
    }

    /// Element `id` with the given text content
    pub fn text(mut self, id: &str, text: &str) -> Self {
        self.scripts
            .insert(element_text_script(id), Value::String(text.to_string()));
        self
    }

    /// Anchors matching `selector`
    pub fn links(mut self, selector: &str, hrefs: &[&str]) -> Self {
        self.scripts.insert(
            links_script(selector),
            Value::Array(hrefs.iter().map(|h| Value::String(h.to_string())).collect()),
        );
        self
    }

    /// Element that can be clicked but reveals nothing by itself
    pub fn clickable(mut self, selector: &str) -> Self {
        self.clickable.push(selector.to_string());
        self
    }

    /// Clicking `selector` never returns, like a postback that stalls
    pub fn stalled_click(mut self, selector: &str) -> Self {
        self.clickable.push(selector.to_string());
        self.stalled.push(selector.to_string());
        self
    }

    /// Clicking `selector` shows `tables`
    pub fn panel(mut self, selector: &str, tables: Vec<TableCandidate>) -> Self {
        self.clickable.push(selector.to_string());
        self.panels.insert(selector.to_string(), tables);
        self
    }
}

/// Driver serving [`FakePage`]s by URL and recording visits
#[derive(Clone, Default)]
pub struct FakeDriver {
    pages: HashMap<String, FakePage>,
    opened: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// URLs navigated to, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// URLs whose sessions were closed
    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open(&self, url: &str) -> BrowserResult<Box<dyn PageSession>> {
        self.opened.lock().unwrap().push(url.to_string());

        let Some(page) = self.pages.get(url).cloned() else {
            return Err(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: "no such page".to_string(),
            });
        };

        match page.behavior {
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("hung page resolved")
            }
            Behavior::Timeout => Err(BrowserError::Timeout {
                url: url.to_string(),
                after: Duration::from_secs(120),
            }),
            Behavior::Load | Behavior::ScriptFailure => Ok(Box::new(FakeSession {
                url: url.to_string(),
                page,
                active_panel: None,
                closed: self.closed.clone(),
            })),
        }
    }
}

struct FakeSession {
    url: String,
    page: FakePage,
    active_panel: Option<String>,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PageSession for FakeSession {
    async fn evaluate(&mut self, expression: &str) -> BrowserResult<Value> {
        if matches!(self.page.behavior, Behavior::ScriptFailure) {
            return Err(BrowserError::ScriptError("evaluation failed".to_string()));
        }

        if expression == TABLE_PROBE_SCRIPT {
            let tables = self
                .active_panel
                .as_ref()
                .and_then(|p| self.page.panels.get(p))
                .cloned()
                .unwrap_or_default();
            return serde_json::to_value(tables)
                .map_err(|e| BrowserError::ScriptError(e.to_string()));
        }

        if let Some(selector) = self
            .page
            .clickable
            .iter()
            .find(|s| click_script(s) == expression)
            .cloned()
        {
            return self.click(&selector).await.map(Value::Bool);
        }

        Ok(self
            .page
            .scripts
            .get(expression)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<bool> {
        if matches!(self.page.behavior, Behavior::ScriptFailure) {
            return Err(BrowserError::ScriptError("click failed".to_string()));
        }
        if !self.page.clickable.iter().any(|s| s == selector) {
            return Ok(false);
        }
        if self.page.stalled.iter().any(|s| s == selector) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.page.panels.contains_key(selector) {
            self.active_panel = Some(selector.to_string());
        }
        Ok(true)
    }

    async fn close(&mut self) {
        self.closed.lock().unwrap().push(self.url.clone());
    }
}
