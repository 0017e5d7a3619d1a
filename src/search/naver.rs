//! Naver blog search client.
//!
//! Calls the Open API blog endpoint with the application's client
//! credentials and maps each item onto a [`SearchResultItem`]. The provider
//! highlights matched terms with `<b>` tags and escapes entities in titles
//! and descriptions; both are stripped here.
//!
//! # Endpoint
//!
//! `GET https://openapi.naver.com/v1/search/blog.json?query=..&display=..&start=1&sort=sim`

use super::{SearchError, SearchProvider};
use crate::models::SearchResultItem;
use crate::utils::{strip_markup, truncate_for_log};
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, instrument, warn};

const BLOG_SEARCH_URL: &str = "https://openapi.naver.com/v1/search/blog.json";
/// The API rejects `display` above this.
const MAX_DISPLAY: u32 = 100;

#[derive(Debug, Deserialize)]
struct BlogSearchResponse {
    #[serde(default)]
    items: Vec<BlogItem>,
}

#[derive(Debug, Deserialize)]
struct BlogItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    bloggername: Option<String>,
    #[serde(default)]
    bloggerlink: Option<String>,
    #[serde(default)]
    postdate: Option<String>,
}

impl From<BlogItem> for SearchResultItem {
    fn from(item: BlogItem) -> Self {
        let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        SearchResultItem {
            title: strip_markup(&item.title),
            description: strip_markup(&item.description),
            link: item.link,
            post_date: non_blank(item.postdate),
            author_link: non_blank(item.bloggerlink),
            author_name: non_blank(item.bloggername).map(|n| strip_markup(&n)),
        }
    }
}

/// Blog search over the Naver Open API.
#[derive(Debug, Clone)]
pub struct NaverBlogClient {
    http: Client,
    client_id: String,
    client_secret: String,
}

impl NaverBlogClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl SearchProvider for NaverBlogClient {
    #[instrument(level = "info", skip_all, fields(query = %truncate_for_log(query, 80), limit = limit))]
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResultItem>, SearchError> {
        let t0 = Instant::now();
        let display = limit.clamp(1, MAX_DISPLAY).to_string();

        let resp = self
            .http
            .get(BLOG_SEARCH_URL)
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .query(&[
                ("query", query),
                ("display", display.as_str()),
                ("start", "1"),
                ("sort", "sim"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %truncate_for_log(&body, 200), "blog search rejected");
            return Err(SearchError::Status {
                status: status.as_u16(),
                message: truncate_for_log(&body, 200),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        let items = parse_response(&body)?;

        debug!(
            count = items.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "blog search answered"
        );
        Ok(items.into_iter().take(limit as usize).collect())
    }
}

fn parse_response(body: &str) -> Result<Vec<SearchResultItem>, SearchError> {
    let parsed: BlogSearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;
    Ok(parsed.items.into_iter().map(SearchResultItem::from).collect())
}
