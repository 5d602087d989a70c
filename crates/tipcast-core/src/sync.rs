//! Cast-tip sync: harvests tips from each identity's posts.
//!
//! # Per identity
//! ```text
//! FETCH_PAGE → EXTRACT → DEDUP → ENRICH → PERSIST → ADVANCE_CHECKPOINT
//!      ↑                                                   │
//!      └──────────── while more pages and page was fresh ──┘
//! ```
//! Pages are processed strictly in provider order. The checkpoint for a page
//! is written only after its tips are persisted, so an abort leaves at worst
//! an already-persisted page to be re-read and deduplicated.
//!
//! # Across identities
//! Identities are synced concurrently by a bounded worker pool. A failing
//! identity does not stop the others, but any failure skips validation for
//! the run and surfaces as [`EngineError::SyncFailed`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointManager;
use crate::error::EngineError;
use crate::extract::{DropReason, TipExtractor, DEFAULT_TOKEN_SYMBOL};
use crate::feed::{PostPager, DEFAULT_PAGE_SIZE};
use crate::provider::{FeedSearch, IdentityResolver};
use crate::store::Store;
use crate::types::{Fid, Tip};
use crate::validator::{validate_tips, ValidationReport};

/// Settings for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Token ticker searched for and parsed out of posts.
    pub token_symbol: String,
    /// Posts requested per search page.
    pub page_size: u32,
    /// Identities synced at the same time.
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            token_symbol: DEFAULT_TOKEN_SYMBOL.into(),
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: 4,
        }
    }
}

/// Counters for one identity's sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySyncReport {
    pub pages: u32,
    /// Posts newer than the checkpoint.
    pub posts: usize,
    /// Posts that did not yield a tip candidate.
    pub dropped: usize,
    /// Candidates already persisted (or repeated within a page).
    pub duplicates: usize,
    pub inserted: usize,
}

impl IdentitySyncReport {
    fn absorb(&mut self, other: &IdentitySyncReport) {
        self.pages += other.pages;
        self.posts += other.posts;
        self.dropped += other.dropped;
        self.duplicates += other.duplicates;
        self.inserted += other.inserted;
    }
}

/// Outcome of a full sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub identities: usize,
    pub totals: IdentitySyncReport,
    pub validation: ValidationReport,
}

/// Drives tip harvesting for every known identity.
pub struct SyncEngine<S: Store + ?Sized> {
    store: Arc<S>,
    feed: Arc<dyn FeedSearch>,
    resolver: Arc<dyn IdentityResolver>,
    extractor: TipExtractor,
    config: SyncConfig,
}

impl<S: Store + ?Sized> SyncEngine<S> {
    pub fn new(
        store: Arc<S>,
        feed: Arc<dyn FeedSearch>,
        resolver: Arc<dyn IdentityResolver>,
        config: SyncConfig,
    ) -> Self {
        Self {
            extractor: TipExtractor::new(&config.token_symbol),
            store,
            feed,
            resolver,
            config,
        }
    }

    /// Sync every identity, then validate once if all of them succeeded.
    pub async fn sync_all_tips(&self) -> Result<SyncReport, EngineError> {
        let fids: BTreeSet<Fid> = self
            .store
            .list_distinct_identities()
            .await?
            .into_iter()
            .collect();
        tracing::info!(identities = fids.len(), concurrency = self.config.concurrency, "Starting tip sync");

        let results: Vec<(Fid, Result<IdentitySyncReport, EngineError>)> = stream::iter(fids)
            .map(|fid| async move { (fid, self.sync_identity(fid).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = SyncReport {
            identities: results.len(),
            ..Default::default()
        };
        let mut failed = Vec::new();
        for (fid, result) in results {
            match result {
                Ok(r) => report.totals.absorb(&r),
                Err(e) => {
                    tracing::warn!(fid, error = %e, "Identity sync failed");
                    failed.push((fid, e.to_string()));
                }
            }
        }

        tracing::info!(
            identities = report.identities,
            failed = failed.len(),
            pages = report.totals.pages,
            inserted = report.totals.inserted,
            "Tip sync pass complete"
        );

        if !failed.is_empty() {
            failed.sort_by_key(|(fid, _)| *fid);
            return Err(EngineError::SyncFailed { failed });
        }

        report.validation = validate_tips(self.store.as_ref()).await?;
        Ok(report)
    }

    /// Incrementally sync one identity from its checkpoint.
    pub async fn sync_identity(&self, fid: Fid) -> Result<IdentitySyncReport, EngineError> {
        let mut checkpoint = CheckpointManager::load(self.store.as_ref(), fid).await?;
        let mut pager = PostPager::new(
            self.feed.as_ref(),
            fid,
            self.extractor.symbol(),
            checkpoint.last_synced(),
        )
        .page_size(self.config.page_size);

        let mut report = IdentitySyncReport::default();

        while let Some(posts) = pager.next_batch().await? {
            report.posts += posts.len();
            let Some(newest) = posts.iter().map(|p| p.timestamp).max() else {
                continue;
            };

            // Extract
            let mut candidates: Vec<Tip> = Vec::with_capacity(posts.len());
            for post in &posts {
                match self.extractor.extract(post) {
                    Ok(tip) => candidates.push(tip),
                    Err(reason) => {
                        report.dropped += 1;
                        log_drop(fid, &post.hash, reason);
                    }
                }
            }

            // Dedup
            let found = candidates.len();
            if !candidates.is_empty() {
                let hashes: Vec<String> = candidates.iter().map(|t| t.cast_hash.clone()).collect();
                let persisted = self.store.find_tips_by_hash(&hashes).await?;
                let mut seen = HashSet::new();
                candidates.retain(|t| {
                    !persisted.contains(&t.cast_hash) && seen.insert(t.cast_hash.clone())
                });
            }
            report.duplicates += found - candidates.len();

            // Enrich
            let recipients: Vec<Fid> = candidates
                .iter()
                .map(|t| t.to_fid)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let profiles = if recipients.is_empty() {
                Default::default()
            } else {
                self.resolver.resolve_identities(&recipients).await?
            };
            let tips: Vec<Tip> = candidates
                .into_iter()
                .map(|t| {
                    let profile = profiles.get(&t.to_fid);
                    t.with_recipient(profile)
                })
                .collect();

            // Persist
            if !tips.is_empty() {
                self.store.insert_tips(&tips).await?;
                report.inserted += tips.len();
            }

            // Advance
            checkpoint.advance(newest).await?;

            tracing::debug!(
                fid,
                posts = posts.len(),
                inserted = tips.len(),
                checkpoint = %newest,
                "Post batch committed"
            );
        }

        report.pages = pager.pages_fetched();
        if report.inserted > 0 {
            tracing::info!(fid, inserted = report.inserted, pages = report.pages, "Identity synced");
        }
        Ok(report)
    }

    /// Run only the validator.
    pub async fn validate_tips(&self) -> Result<ValidationReport, EngineError> {
        validate_tips(self.store.as_ref()).await
    }
}

fn log_drop(fid: Fid, hash: &str, reason: DropReason) {
    match reason {
        DropReason::NoMention => {}
        DropReason::ZeroAmount => tracing::debug!(fid, hash, "Skipping zero-amount tip"),
        DropReason::NoRecipient => tracing::debug!(fid, hash, "Skipping tip without reply target"),
    }
}
