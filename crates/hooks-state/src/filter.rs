//! # Text Filter
//!
//! Local matching over item lists and a debounced remote query.
//!
//! Matching is deliberately simple: no ranking, no fuzzy scoring. Items
//! keep their input order.

use crate::error::BinderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How a query is compared with an item's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Text contains the query.
    #[default]
    Contains,
    /// Text starts with the query.
    StartsWith,
    /// Text contains every whitespace-separated word of the query.
    Words,
    /// Text equals the query.
    Exact,
}

/// Options for a `TextFilter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterOptions {
    pub mode: MatchMode,
    pub case_sensitive: bool,
    /// Queries shorter than this (in chars, after trimming) match everything.
    pub min_query_len: usize,
}

/// Matches item text against a query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFilter {
    options: FilterOptions,
}

impl TextFilter {
    pub fn new(options: FilterOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> FilterOptions {
        self.options
    }

    /// Whether `query` is too short to filter anything out.
    #[must_use]
    pub fn is_inactive(&self, query: &str) -> bool {
        let len = query.trim().chars().count();
        len == 0 || len < self.options.min_query_len
    }

    /// Whether `text` matches `query`. Inactive queries match everything.
    #[must_use]
    pub fn matches(&self, text: &str, query: &str) -> bool {
        if self.is_inactive(query) {
            return true;
        }

        let (text, query) = if self.options.case_sensitive {
            (text.to_string(), query.trim().to_string())
        } else {
            (text.to_lowercase(), query.trim().to_lowercase())
        };

        match self.options.mode {
            MatchMode::Contains => text.contains(&query),
            MatchMode::StartsWith => text.starts_with(&query),
            MatchMode::Words => query.split_whitespace().all(|word| text.contains(word)),
            MatchMode::Exact => text == query,
        }
    }

    /// Items whose key matches `query`, in input order.
    pub fn apply<'a, T, K>(&self, items: &'a [T], query: &str, key: K) -> Vec<&'a T>
    where
        K: Fn(&T) -> &str,
    {
        items
            .iter()
            .filter(|item| self.matches(key(item), query))
            .collect()
    }
}

/// Remote search backend for `DebouncedQuery`.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    type Item: Send;

    async fn fetch(&self, query: &str) -> Result<Vec<Self::Item>, BinderError>;
}

/// Debounce window for remote queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(300),
        }
    }
}

/// Coalesces bursts of queries to the most recent one.
///
/// Each call waits out the window; if a newer call arrived meanwhile it
/// resolves to `None` without fetching. A fetch that already started is
/// never cancelled, so its result may arrive after a newer query began.
pub struct DebouncedQuery<S> {
    source: Arc<S>,
    config: DebounceConfig,
    latest: Arc<AtomicU64>,
}

impl<S> Clone for DebouncedQuery<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: self.config,
            latest: Arc::clone(&self.latest),
        }
    }
}

impl<S: RemoteSource> DebouncedQuery<S> {
    pub fn new(source: Arc<S>, config: DebounceConfig) -> Self {
        Self {
            source,
            config,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `query` unless a newer call supersedes it within the window.
    pub async fn query(&self, query: &str) -> Option<Result<Vec<S::Item>, BinderError>> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.config.window).await;

        if self.latest.load(Ordering::SeqCst) != ticket {
            debug!(query = %query, "Query superseded within debounce window");
            return None;
        }
        Some(self.source.fetch(query).await)
    }

    #[must_use]
    pub fn config(&self) -> DebounceConfig {
        self.config
    }
}
