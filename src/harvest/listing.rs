//! Discovering detail pages from the school listing

use crate::browser::{eval_json, links_script, with_page, BrowserDriver};
use crate::config::{Config, ListingMode};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Anchors pointing at detail pages
pub const LISTING_LINK_SELECTOR: &str = "#DataListSchulen > tbody > tr a";

/// Source of detail-page URLs, in document order
#[async_trait]
pub trait LinkSource: Send + Sync {
    async fn discover(&self) -> Result<Vec<String>>;
}

/// Absolute, de-duplicated detail links from listing markup
pub fn extract_detail_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(LISTING_LINK_SELECTOR) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with("javascript:"))
        .filter_map(|href| base.join(href).ok())
        .map(|url| url.to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Fetches the listing with a plain GET
pub struct HttpListing {
    client: Client,
    url: String,
}

impl HttpListing {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.listing_url,
            &config.harvest.user_agent,
            config.harvest.request_timeout(),
        )
    }
}

#[async_trait]
impl LinkSource for HttpListing {
    async fn discover(&self) -> Result<Vec<String>> {
        let base = Url::parse(&self.url)?;
        debug!("Fetching listing: {}", self.url);

        let response = self
            .client
            .get(base.clone())
            .send()
            .await
            .map_err(|e| Error::Listing(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Listing(format!("HTTP {}: {}", status, self.url)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Listing(format!("{}: {}", self.url, e)))?;
        let links = extract_detail_links(&html, &base);
        info!("Discovered {} detail pages", links.len());
        Ok(links)
    }
}

/// Reads the listing through the browser, for markup built client-side
pub struct BrowserListing {
    driver: Arc<dyn BrowserDriver>,
    url: String,
    timeout: Duration,
}

impl BrowserListing {
    pub fn new(driver: Arc<dyn BrowserDriver>, url: &str, timeout: Duration) -> Self {
        Self {
            driver,
            url: url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl LinkSource for BrowserListing {
    async fn discover(&self) -> Result<Vec<String>> {
        let hrefs: Vec<String> = with_page(self.driver.as_ref(), &self.url, self.timeout, |page| {
            Box::pin(async move { eval_json(page, &links_script(LISTING_LINK_SELECTOR)).await })
        })
        .await
        .map_err(|e| Error::Listing(e.to_string()))?;

        let mut seen = HashSet::new();
        let links: Vec<String> = hrefs
            .into_iter()
            .filter(|href| !href.is_empty() && seen.insert(href.clone()))
            .collect();
        info!("Discovered {} detail pages", links.len());
        Ok(links)
    }
}

/// Link source selected by `harvest.listing_mode`
pub fn listing_from_config(
    config: &Config,
    driver: Arc<dyn BrowserDriver>,
) -> Result<Box<dyn LinkSource>> {
    Ok(match config.harvest.listing_mode {
        ListingMode::Http => Box::new(HttpListing::from_config(config)?),
        ListingMode::Browser => Box::new(BrowserListing::new(
            driver,
            &config.listing_url,
            config.harvest.page_timeout(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeDriver, FakePage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING_HTML: &str = r#"<html><body>
        <a href="/elsewhere">Impressum</a>
        <table id="DataListSchulen"><tbody>
            <tr><td><a href="Schulportrait.aspx?IDSchulzweig=101">Alpha</a></td></tr>
            <tr><td><a href="Schulportrait.aspx?IDSchulzweig=102">Beta</a></td></tr>
            <tr><td><a href="Schulportrait.aspx?IDSchulzweig=101">Alpha again</a></td></tr>
            <tr><td><a href="javascript:__doPostBack('x','')">Page 2</a></td></tr>
        </tbody></table>
    </body></html>"#;

    #[test]
    fn test_extract_detail_links_in_document_order() {
        let base = Url::parse("https://example.com/Schulverzeichnis/SchulListe.aspx").unwrap();
        let links = extract_detail_links(LISTING_HTML, &base);
        assert_eq!(
            links,
            vec![
                "https://example.com/Schulverzeichnis/Schulportrait.aspx?IDSchulzweig=101",
                "https://example.com/Schulverzeichnis/Schulportrait.aspx?IDSchulzweig=102",
            ]
        );
    }

    #[test]
    fn test_listing_without_table_is_empty() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(extract_detail_links("<p>maintenance</p>", &base).is_empty());
    }

    #[tokio::test]
    async fn test_http_listing_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Schulverzeichnis/SchulListe.aspx"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(LISTING_HTML.as_bytes().to_vec(), "text/html"),
            )
            .mount(&mock_server)
            .await;

        let url = format!("{}/Schulverzeichnis/SchulListe.aspx", mock_server.uri());
        let listing = HttpListing::new(&url, "test-agent", Duration::from_secs(5)).unwrap();
        let links = listing.discover().await.unwrap();

        assert_eq!(links.len(), 2);
        assert!(links[0].starts_with(&mock_server.uri()));
    }

    #[tokio::test]
    async fn test_http_listing_error_status_is_fatal() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let listing =
            HttpListing::new(&mock_server.uri(), "test-agent", Duration::from_secs(5)).unwrap();
        let result = listing.discover().await;
        assert!(matches!(result, Err(Error::Listing(_))));
    }

    #[tokio::test]
    async fn test_browser_listing_reads_hrefs() {
        let url = "https://example.com/list";
        let driver = FakeDriver::new().page(
            url,
            FakePage::new().links(
                LISTING_LINK_SELECTOR,
                &["https://example.com/a", "https://example.com/b", "https://example.com/a"],
            ),
        );

        let listing = BrowserListing::new(Arc::new(driver), url, Duration::from_secs(5));
        let links = listing.discover().await.unwrap();
        assert_eq!(links, vec!["https://example.com/a", "https://example.com/b"]);
    }
}
