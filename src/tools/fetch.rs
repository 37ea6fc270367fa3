//! Page fetching for the web tools.
//!
//! Headless mode is a plain HTTP GET with a desktop user agent. A real
//! browser is driven over the W3C WebDriver protocol so pages that build
//! their content with JavaScript come back rendered.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const WEBDRIVER_TIMEOUT: Duration = Duration::from_secs(60);

pub const SUPPORTED_BROWSERS: &[&str] = &["Chrome", "Firefox", "Safari", "Edge", "Headless"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("WebDriver error ({status}): {message}")]
    WebDriver { status: u16, message: String },

    #[error("Unsupported browser '{0}'. The only supported browsers are: Chrome, Firefox, Safari, Edge, Headless")]
    UnsupportedBrowser(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Headless,
}

impl Browser {
    /// `browserName` capability, or `None` for headless HTTP.
    pub fn webdriver_name(self) -> Option<&'static str> {
        match self {
            Browser::Chrome => Some("chrome"),
            Browser::Firefox => Some("firefox"),
            Browser::Safari => Some("safari"),
            Browser::Edge => Some("MicrosoftEdge"),
            Browser::Headless => None,
        }
    }
}

impl FromStr for Browser {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" => Ok(Browser::Chrome),
            "firefox" => Ok(Browser::Firefox),
            "safari" => Ok(Browser::Safari),
            "edge" => Ok(Browser::Edge),
            "headless" => Ok(Browser::Headless),
            _ => Err(FetchError::UnsupportedBrowser(s.to_string())),
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Browser::Chrome => "Chrome",
            Browser::Firefox => "Firefox",
            Browser::Safari => "Safari",
            Browser::Edge => "Edge",
            Browser::Headless => "Headless",
        };
        f.write_str(name)
    }
}

/// Source of raw page HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// Release any browser resources.
    async fn shutdown(&self) {}
}

/// Build the fetcher for the configured browser.
pub fn page_fetcher(
    browser: Option<Browser>,
    webdriver_url: &str,
) -> Result<std::sync::Arc<dyn PageFetcher>, FetchError> {
    match browser.and_then(Browser::webdriver_name) {
        Some(browser_name) => {
            tracing::info!(browser = browser_name, webdriver_url, "Fetching pages through WebDriver");
            Ok(std::sync::Arc::new(WebDriverFetcher::new(browser_name, webdriver_url)?))
        }
        None => Ok(std::sync::Arc::new(HttpFetcher::new()?)),
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

/// Drives a browser through a WebDriver server, reusing one session.
///
/// The session is checked before each use and replaced when the browser has
/// gone away. Concurrent fetches queue on the session lock.
pub struct WebDriverFetcher {
    client: Client,
    endpoint: String,
    browser_name: &'static str,
    session: Mutex<Option<String>>,
}

impl WebDriverFetcher {
    pub fn new(browser_name: &'static str, endpoint: &str) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(WEBDRIVER_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            browser_name,
            session: Mutex::new(None),
        })
    }

    /// Send a WebDriver command and return its `value`.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, FetchError> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.endpoint, path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let error = &payload["value"];
            let message = error["message"]
                .as_str()
                .or_else(|| error["error"].as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(FetchError::WebDriver {
                status: status.as_u16(),
                message,
            });
        }

        Ok(payload["value"].clone())
    }

    async fn create_session(&self) -> Result<String, FetchError> {
        let body = json!({
            "capabilities": { "alwaysMatch": { "browserName": self.browser_name } }
        });
        let value = self.command(Method::POST, "/session", Some(body)).await?;
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| FetchError::WebDriver {
                status: 200,
                message: "new session response carried no sessionId".to_string(),
            })?
            .to_string();
        tracing::info!(browser = self.browser_name, session_id = %session_id, "Started browser session");
        Ok(session_id)
    }

    /// A session is alive while it can still report its page title.
    async fn is_alive(&self, session_id: &str) -> bool {
        self.command(Method::GET, &format!("/session/{}/title", session_id), None)
            .await
            .is_ok()
    }

    async fn quit(&self, session_id: &str) {
        if let Err(e) = self
            .command(Method::DELETE, &format!("/session/{}", session_id), None)
            .await
        {
            tracing::debug!(session_id, error = %e, "Failed to close browser session");
        }
    }

    async fn recreate(&self, dead_session: &str) -> Result<String, FetchError> {
        tracing::warn!(session_id = dead_session, "Browser session is gone, starting a new one");
        self.quit(dead_session).await;
        self.create_session().await
    }

    async fn load(&self, session_id: &str, url: &str) -> Result<String, FetchError> {
        self.command(
            Method::POST,
            &format!("/session/{}/url", session_id),
            Some(json!({ "url": url })),
        )
        .await?;
        let source = self
            .command(Method::GET, &format!("/session/{}/source", session_id), None)
            .await?;
        Ok(source.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut slot = self.session.lock().await;

        let session_id = match slot.take() {
            Some(id) if self.is_alive(&id).await => id,
            Some(dead) => self.recreate(&dead).await?,
            None => self.create_session().await?,
        };

        match self.load(&session_id, url).await {
            Ok(html) => {
                *slot = Some(session_id);
                Ok(html)
            }
            Err(e) => {
                // Start from a fresh session next time.
                self.quit(&session_id).await;
                Err(e)
            }
        }
    }

    async fn shutdown(&self) {
        if let Some(session_id) = self.session.lock().await.take() {
            self.quit(&session_id).await;
        }
    }
}
