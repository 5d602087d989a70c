//! Incremental post pager for one identity.
//!
//! Wraps a [`FeedSearch`] provider and yields batches of posts newer than the
//! identity's checkpoint, newest first. The pager stops when the provider has
//! no further cursor or when a page contains nothing newer than the
//! checkpoint (the identity is caught up).

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::provider::FeedSearch;
use crate::types::{Fid, Post};

/// Page size requested from the search provider.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Lazily fetches post batches for one identity.
pub struct PostPager<'a, F: FeedSearch + ?Sized> {
    feed: &'a F,
    fid: Fid,
    query: String,
    after: Option<DateTime<Utc>>,
    page_size: u32,
    cursor: Option<String>,
    done: bool,
    pages: u32,
}

impl<'a, F: FeedSearch + ?Sized> PostPager<'a, F> {
    /// Start paging `fid`'s posts matching `query`, keeping only posts strictly
    /// newer than `after`.
    pub fn new(feed: &'a F, fid: Fid, query: impl Into<String>, after: Option<DateTime<Utc>>) -> Self {
        Self {
            feed,
            fid,
            query: query.into(),
            after,
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
            done: false,
            pages: 0,
        }
    }

    /// Override the page size.
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Number of provider pages fetched so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// Fetch the next non-empty batch, or `None` when the identity is caught up.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Post>>, EngineError> {
        if self.done {
            return Ok(None);
        }

        let page = self
            .feed
            .search_posts(self.fid, &self.query, self.cursor.as_deref(), self.page_size)
            .await?;
        self.pages += 1;

        let raw = page.posts.len();
        let fresh: Vec<Post> = match self.after {
            Some(after) => page.posts.into_iter().filter(|p| p.timestamp > after).collect(),
            None => page.posts,
        };

        tracing::debug!(
            fid = self.fid,
            page = self.pages,
            raw,
            fresh = fresh.len(),
            "Post page fetched"
        );

        self.cursor = page.next_cursor;
        self.done = self.cursor.is_none() || fresh.is_empty();

        if fresh.is_empty() {
            Ok(None)
        } else {
            Ok(Some(fresh))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PostPage, Profile};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn post(hash: &str, hour: u32) -> Post {
        Post {
            hash: hash.into(),
            text: String::new(),
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, hour, 0, 0).unwrap(),
            author: Profile { fid: 1, ..Default::default() },
            parent_fid: None,
        }
    }

    struct Pages {
        pages: Vec<PostPage>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl FeedSearch for Pages {
        async fn search_posts(
            &self,
            _fid: Fid,
            _query: &str,
            cursor: Option<&str>,
            _limit: u32,
        ) -> Result<PostPage, EngineError> {
            let mut cursors = self.cursors.lock().unwrap();
            let idx = cursors.len();
            cursors.push(cursor.map(str::to_string));
            Ok(self.pages.get(idx).cloned().unwrap_or_default())
        }
    }

    fn pages(pages: Vec<PostPage>) -> Pages {
        Pages { pages, cursors: Mutex::new(vec![]) }
    }

    #[tokio::test]
    async fn follows_cursor_until_exhausted() {
        let feed = pages(vec![
            PostPage { posts: vec![post("c", 12), post("b", 11)], next_cursor: Some("p2".into()) },
            PostPage { posts: vec![post("a", 10)], next_cursor: None },
        ]);
        let mut pager = PostPager::new(&feed, 1, "SPACE", None);

        assert_eq!(pager.next_batch().await.unwrap().unwrap().len(), 2);
        assert_eq!(pager.next_batch().await.unwrap().unwrap().len(), 1);
        assert!(pager.next_batch().await.unwrap().is_none());
        assert_eq!(pager.pages_fetched(), 2);
        assert_eq!(*feed.cursors.lock().unwrap(), vec![None, Some("p2".to_string())]);
    }

    #[tokio::test]
    async fn stops_once_caught_up_with_checkpoint() {
        let feed = pages(vec![
            PostPage { posts: vec![post("c", 12), post("b", 11)], next_cursor: Some("p2".into()) },
            PostPage { posts: vec![post("a", 10)], next_cursor: Some("p3".into()) },
            PostPage { posts: vec![post("z", 1)], next_cursor: None },
        ]);
        let after = Utc.with_ymd_and_hms(2024, 7, 1, 11, 0, 0).unwrap();
        let mut pager = PostPager::new(&feed, 1, "SPACE", Some(after));

        let batch = pager.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.iter().map(|p| p.hash.as_str()).collect::<Vec<_>>(), vec!["c"]);
        // Page 2 is entirely at or before the checkpoint: stop, skip page 3.
        assert!(pager.next_batch().await.unwrap().is_none());
        assert!(pager.next_batch().await.unwrap().is_none());
        assert_eq!(pager.pages_fetched(), 2);
    }

    #[tokio::test]
    async fn empty_history() {
        let feed = pages(vec![PostPage::default()]);
        let mut pager = PostPager::new(&feed, 1, "SPACE", None);
        assert!(pager.next_batch().await.unwrap().is_none());
        assert_eq!(pager.pages_fetched(), 1);
    }
}
