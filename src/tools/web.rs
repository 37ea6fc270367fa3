//! Web access tools: search and fetch pages.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PageFetcher, Tool};
use crate::html::{self, DistillOptions, Document};

const SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Links into Google's own pages, which only distract the model.
const INTERNAL_LINK_PREFIXES: &[&str] = &[
    "/",
    "#",
    "https://www.google.com",
    "https://maps.google.com",
    "https://support.google.com",
    "https://policies.google.com",
    "https://accounts.google.com",
];

const RESULTS_START: &str = "<h1>Search Results</h1>";
const RESULTS_END: &str = "<h1>Page Navigation</h1>";

/// Search the web with Google. Returns distilled result HTML with links.
pub struct GoogleSearch {
    fetcher: Arc<dyn PageFetcher>,
}

impl GoogleSearch {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

fn is_internal_link(href: &str) -> bool {
    INTERNAL_LINK_PREFIXES
        .iter()
        .any(|prefix| href.starts_with(prefix))
}

/// Keep the organic results: from the results heading up to the page
/// navigation heading, when present.
fn results_section(html: &str) -> &str {
    let html = match html.find(RESULTS_START) {
        Some(start) => &html[start..],
        None => html,
    };
    match html.find(RESULTS_END) {
        Some(end) => &html[..end],
        None => html,
    }
}

#[async_trait]
impl Tool for GoogleSearch {
    fn name(&self) -> &str {
        "GoogleSearch"
    }

    fn parameters(&self) -> &[&'static str] {
        &["topic"]
    }

    fn description(&self) -> &str {
        "Use Google to search the web for the topic."
    }

    async fn execute(&self, topic: &str) -> String {
        let url = format!("{}{}", SEARCH_URL, urlencoding::encode(topic));
        let raw_html = match self.fetcher.fetch(&url).await {
            Ok(raw_html) => raw_html,
            Err(e) => {
                tracing::warn!(topic, error = %e, "Search request failed");
                return "Error performing search".to_string();
            }
        };

        let mut document = Document::parse(&raw_html);
        document.distill(DistillOptions::default());
        document.remove_links_where(is_internal_link);
        results_section(&document.to_html()).to_string()
    }
}

/// Fetch a page and return its distilled HTML without links.
pub struct GetWebPage {
    fetcher: Arc<dyn PageFetcher>,
}

impl GetWebPage {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for GetWebPage {
    fn name(&self) -> &str {
        "GetWebPage"
    }

    fn parameters(&self) -> &[&'static str] {
        &["url"]
    }

    fn description(&self) -> &str {
        "Get the contents of a web page. Only call this with a valid URL."
    }

    async fn execute(&self, url: &str) -> String {
        match self.fetcher.fetch(url).await {
            Ok(raw_html) => html::distill(&raw_html, true),
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to retrieve web page");
                "Error retrieving web page".to_string()
            }
        }
    }
}
