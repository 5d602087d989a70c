//! tipcast-core: daily token allocation and cast-tip accounting.
//!
//! # Architecture
//!
//! ```text
//! Allocator ──► Season::strategy() ──► SeasonOne
//!                                        ├── HolderSnapshot  (token A / token B balances)
//!                                        └── RankingSource   (paged social ranking)
//!
//! SyncEngine ──► per identity: PostPager → TipExtractor → dedup → IdentityResolver
//!                              → TipStore::insert_tips → CheckpointManager::advance
//!            └─► validate_tips (once, after every identity succeeded)
//! ```
//!
//! Backends live in `tipcast-storage`, HTTP providers in `tipcast-providers`.

pub mod allocation;
pub mod allocator;
pub mod cache;
pub mod checkpoint;
pub mod error;
pub mod extract;
pub mod feed;
pub mod provider;
pub mod report;
pub mod season;
pub mod store;
pub mod sync;
pub mod types;
pub mod validator;

pub use allocator::{compute_allocations, Allocator};
pub use cache::AllocationCache;
pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
pub use error::EngineError;
pub use extract::{DropReason, TipExtractor};
pub use feed::PostPager;
pub use provider::{FeedSearch, HolderSnapshot, IdentityResolver, RankingSource};
pub use report::{leaderboard, summarize, AllocationSummary, LeaderboardEntry};
pub use season::{AllocationStrategy, Season};
pub use store::{AllocationStore, Store, TipStore};
pub use sync::{SyncConfig, SyncEngine, SyncReport};
pub use types::{
    Allocation, AllocationParams, AllocationResult, Fid, HolderMap, Post, PostPage, Profile,
    RankingEntry, RankingPage, Tip,
};
pub use validator::{validate_tips, ValidationReport};
