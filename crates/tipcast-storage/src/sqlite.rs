//! SQLite storage backend for Tipcast.
//!
//! Persists daily allocations, tips and cast-search checkpoints to a single
//! SQLite file. Uses `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use tipcast_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./tipcast.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use tipcast_core::checkpoint::{Checkpoint, CheckpointStore};
use tipcast_core::error::EngineError;
use tipcast_core::store::{AllocationStore, TipStore};
use tipcast_core::types::{Allocation, Fid, Tip};
use tipcast_core::validator::{reconcile, Budgets, ValidationReport};

/// Bound parameters per `IN (...)` lookup, under SQLite's variable limit.
const LOOKUP_CHUNK: usize = 500;

fn storage_err(e: sqlx::Error) -> EngineError {
    EngineError::Storage(e.to_string())
}

fn insert_err(e: sqlx::Error, what: &str) -> EngineError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => EngineError::Integrity(format!("{what} already exists")),
        _ => storage_err(e),
    }
}

/// SQLite-backed storage for allocations, tips and checkpoints.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./tipcast.db"`) or a full
    /// SQLite URL (`"sqlite:./tipcast.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, EngineError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection so every query sees the same database.
    /// All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, EngineError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), EngineError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS daily_tip_allocation (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                date            TEXT    NOT NULL,
                fid             INTEGER NOT NULL,
                username        TEXT,
                display_name    TEXT,
                pfp_url         TEXT,
                rank            INTEGER NOT NULL,
                primary_address TEXT    NOT NULL,
                total_balance_a REAL    NOT NULL,
                total_balance_b REAL    NOT NULL,
                amount          INTEGER NOT NULL,
                UNIQUE (date, fid)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tip (
                cast_hash         TEXT    PRIMARY KEY,
                from_fid          INTEGER NOT NULL,
                from_username     TEXT,
                from_display_name TEXT,
                from_pfp_url      TEXT,
                to_fid            INTEGER NOT NULL,
                to_username       TEXT,
                to_display_name   TEXT,
                to_pfp_url        TEXT,
                amount            INTEGER NOT NULL,
                cast_text         TEXT    NOT NULL,
                casted_at         TEXT    NOT NULL,
                allocation_date   TEXT    NOT NULL,
                is_valid          INTEGER
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // Timestamps in unix milliseconds so the upsert can compare with MAX.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cast_search_checkpoint (
                fid        INTEGER PRIMARY KEY,
                timestamp  INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tip_sender_date ON tip (from_fid, allocation_date);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tip_pending ON tip (is_valid);")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

fn allocation_from_row(r: &SqliteRow) -> Allocation {
    Allocation {
        fid: r.get::<i64, _>("fid") as Fid,
        username: r.get("username"),
        display_name: r.get("display_name"),
        pfp_url: r.get("pfp_url"),
        rank: r.get::<i64, _>("rank") as u64,
        primary_address: r.get("primary_address"),
        total_balance_a: r.get("total_balance_a"),
        total_balance_b: r.get("total_balance_b"),
        amount: r.get::<i64, _>("amount") as u64,
    }
}

fn tip_from_row(r: &SqliteRow) -> Tip {
    Tip {
        from_fid: r.get::<i64, _>("from_fid") as Fid,
        from_username: r.get("from_username"),
        from_display_name: r.get("from_display_name"),
        from_pfp_url: r.get("from_pfp_url"),
        to_fid: r.get::<i64, _>("to_fid") as Fid,
        to_username: r.get("to_username"),
        to_display_name: r.get("to_display_name"),
        to_pfp_url: r.get("to_pfp_url"),
        amount: r.get::<i64, _>("amount") as u64,
        cast_hash: r.get("cast_hash"),
        cast_text: r.get("cast_text"),
        casted_at: r.get::<DateTime<Utc>, _>("casted_at"),
        allocation_date: r.get::<NaiveDate, _>("allocation_date"),
        is_valid: r.get("is_valid"),
    }
}

const TIP_COLUMNS: &str = "cast_hash, from_fid, from_username, from_display_name, from_pfp_url,
     to_fid, to_username, to_display_name, to_pfp_url, amount, cast_text, casted_at,
     allocation_date, is_valid";

// ─── AllocationStore impl ────────────────────────────────────────────────────

#[async_trait]
impl AllocationStore for SqliteStorage {
    async fn has_allocations(&self, date: NaiveDate) -> Result<bool, EngineError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM daily_tip_allocation WHERE date = ?")
            .bind(date)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.get::<i64, _>("cnt") > 0)
    }

    async fn insert_allocations(&self, date: NaiveDate, rows: &[Allocation]) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let existing: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM daily_tip_allocation WHERE date = ?")
            .bind(date)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_err)?
            .get("cnt");
        if existing > 0 {
            return Err(EngineError::Integrity(format!("allocations for {date} already exist")));
        }

        for a in rows {
            sqlx::query(
                "INSERT INTO daily_tip_allocation
                 (date, fid, username, display_name, pfp_url, rank, primary_address,
                  total_balance_a, total_balance_b, amount)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(date)
            .bind(a.fid as i64)
            .bind(&a.username)
            .bind(&a.display_name)
            .bind(&a.pfp_url)
            .bind(a.rank as i64)
            .bind(&a.primary_address)
            .bind(a.total_balance_a)
            .bind(a.total_balance_b)
            .bind(a.amount as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_err(e, &format!("allocation for fid {} on {date}", a.fid)))?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(%date, rows = rows.len(), "allocations stored");
        Ok(())
    }

    async fn allocations_for_date(&self, date: NaiveDate) -> Result<Vec<Allocation>, EngineError> {
        let rows = sqlx::query(
            "SELECT fid, username, display_name, pfp_url, rank, primary_address,
                    total_balance_a, total_balance_b, amount
             FROM daily_tip_allocation WHERE date = ? ORDER BY rank",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(allocation_from_row).collect())
    }
}

// ─── TipStore impl ───────────────────────────────────────────────────────────

#[async_trait]
impl TipStore for SqliteStorage {
    async fn find_tips_by_hash(&self, hashes: &[String]) -> Result<HashSet<String>, EngineError> {
        let mut found = HashSet::new();
        for chunk in hashes.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("SELECT cast_hash FROM tip WHERE cast_hash IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(hash);
            }
            let rows = query.fetch_all(&self.pool).await.map_err(storage_err)?;
            found.extend(rows.iter().map(|r| r.get::<String, _>("cast_hash")));
        }
        Ok(found)
    }

    async fn insert_tips(&self, tips: &[Tip]) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        for t in tips {
            sqlx::query(&format!(
                "INSERT INTO tip ({TIP_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&t.cast_hash)
            .bind(t.from_fid as i64)
            .bind(&t.from_username)
            .bind(&t.from_display_name)
            .bind(&t.from_pfp_url)
            .bind(t.to_fid as i64)
            .bind(&t.to_username)
            .bind(&t.to_display_name)
            .bind(&t.to_pfp_url)
            .bind(t.amount as i64)
            .bind(&t.cast_text)
            .bind(t.casted_at)
            .bind(t.allocation_date)
            .bind(t.is_valid)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_err(e, &format!("tip {}", t.cast_hash)))?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(rows = tips.len(), "tips stored");
        Ok(())
    }

    async fn tips_for_date(&self, date: NaiveDate) -> Result<Vec<Tip>, EngineError> {
        let rows = sqlx::query(&format!(
            "SELECT {TIP_COLUMNS} FROM tip WHERE allocation_date = ? ORDER BY casted_at, cast_hash"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(tip_from_row).collect())
    }

    async fn valid_tips(&self) -> Result<Vec<Tip>, EngineError> {
        let rows = sqlx::query(&format!(
            "SELECT {TIP_COLUMNS} FROM tip WHERE is_valid = 1 ORDER BY casted_at, cast_hash"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(tip_from_row).collect())
    }

    async fn list_distinct_identities(&self) -> Result<Vec<Fid>, EngineError> {
        let rows = sqlx::query(
            "SELECT fid FROM daily_tip_allocation
             UNION SELECT from_fid FROM tip
             UNION SELECT to_fid FROM tip
             ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(|r| r.get::<i64, _>(0) as Fid).collect())
    }

    async fn mark_tips_valid(&self) -> Result<ValidationReport, EngineError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let rows = sqlx::query(&format!(
            "SELECT {TIP_COLUMNS} FROM tip t
             WHERE EXISTS (
                 SELECT 1 FROM tip p
                 WHERE p.is_valid IS NULL
                   AND p.from_fid = t.from_fid
                   AND p.allocation_date = t.allocation_date
             )"
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_err)?;
        let tips: Vec<Tip> = rows.iter().map(tip_from_row).collect();
        if tips.is_empty() {
            return Ok(ValidationReport::default());
        }

        let budget_rows = sqlx::query(
            "SELECT a.fid, a.date, a.amount FROM daily_tip_allocation a
             WHERE EXISTS (
                 SELECT 1 FROM tip p
                 WHERE p.is_valid IS NULL
                   AND p.from_fid = a.fid
                   AND p.allocation_date = a.date
             )",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_err)?;
        let budgets: Budgets = budget_rows
            .iter()
            .map(|r| {
                (
                    (r.get::<i64, _>("fid") as Fid, r.get::<NaiveDate, _>("date")),
                    r.get::<i64, _>("amount") as u64,
                )
            })
            .collect();

        let (decisions, report) = reconcile(&tips, &budgets);
        for d in &decisions {
            sqlx::query("UPDATE tip SET is_valid = ? WHERE cast_hash = ?")
                .bind(d.is_valid)
                .bind(&d.cast_hash)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        debug!(decided = decisions.len(), "tip validity written");
        Ok(report)
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self, fid: Fid) -> Result<Option<Checkpoint>, EngineError> {
        let row = sqlx::query(
            "SELECT fid, timestamp, updated_at FROM cast_search_checkpoint WHERE fid = ?",
        )
        .bind(fid as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        let Some(r) = row else {
            return Ok(None);
        };
        let millis: i64 = r.get("timestamp");
        let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            EngineError::Storage(format!("checkpoint for fid {fid} has invalid timestamp {millis}"))
        })?;
        Ok(Some(Checkpoint {
            fid,
            timestamp,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO cast_search_checkpoint (fid, timestamp, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(fid) DO UPDATE SET
                 updated_at = CASE WHEN excluded.timestamp > timestamp
                                   THEN excluded.updated_at ELSE updated_at END,
                 timestamp  = MAX(timestamp, excluded.timestamp)",
        )
        .bind(checkpoint.fid as i64)
        .bind(checkpoint.timestamp.timestamp_millis())
        .bind(checkpoint.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(fid = checkpoint.fid, timestamp = %checkpoint.timestamp, "checkpoint saved");
        Ok(())
    }

    async fn delete(&self, fid: Fid) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM cast_search_checkpoint WHERE fid = ?")
            .bind(fid as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
