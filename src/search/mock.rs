//! Scripted provider for tests.

use super::{SearchError, SearchProvider};
use crate::models::SearchResultItem;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns canned results per query, counts every call, and fails the
/// queries it was told to fail.
#[derive(Debug, Default)]
pub struct MockProvider {
    results: HashMap<String, Vec<SearchResultItem>>,
    failing: HashSet<String>,
    /// Remaining transient failures before a query starts succeeding.
    flaky: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(mut self, query: &str, items: Vec<SearchResultItem>) -> Self {
        self.results.insert(query.to_string(), items);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    /// Fail `query` with a transport error `times` times, then answer normally.
    pub fn flaky(self, query: &str, times: usize) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(query.to_string(), times);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, query: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|q| *q == query).count()
    }
}

impl SearchProvider for MockProvider {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchResultItem>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(query.to_string());

        if self.failing.contains(query) {
            return Err(SearchError::Status {
                status: 500,
                message: format!("scripted failure for {query}"),
            });
        }
        if let Some(left) = self.flaky.lock().unwrap().get_mut(query) {
            if *left > 0 {
                *left -= 1;
                return Err(SearchError::Transport("scripted reset".into()));
            }
        }
        Ok(self
            .results
            .get(query)
            .map(|items| items.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}

/// A blog post hit by `blogger` with the given link suffix and text.
pub fn hit(blogger: &str, post: &str, title: &str) -> SearchResultItem {
    SearchResultItem {
        title: title.to_string(),
        description: String::new(),
        link: format!("https://blog.naver.com/{blogger}/{post}"),
        post_date: None,
        author_link: Some(format!("https://blog.naver.com/{blogger}")),
        author_name: Some(blogger.to_string()),
    }
}
