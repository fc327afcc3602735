//! Per-key yield feedback, persisted in embedded SQLite so effectiveness
//! scores survive process restarts.
//!
//! Samples are append-only history; the score is a running equal-weight
//! blend: the first observation sets it, every later one averages in at 50%.
//! No recency weighting — deliberately kept as-is rather than guessing at a
//! decay formula.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use vansweep_common::parse::area_code;
use vansweep_common::Source;

use crate::error::Result;

pub struct FeedbackTracker {
    pool: SqlitePool,
}

/// Advisory temporal aggregates for one area. These never feed the ranking
/// loop; they exist for operators deciding when to schedule runs.
#[derive(Debug, Clone, Default)]
pub struct TemporalPatterns {
    pub best_day: Option<String>,
    pub best_month: Option<String>,
    /// (day-of-week, average score, sample count), best first.
    pub daily: Vec<(String, f64, i64)>,
    pub monthly: Vec<(String, f64, i64)>,
}

impl FeedbackTracker {
    /// Open (or create) the feedback database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// In-memory tracker for tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One connection serializes every read-modify-write on the score
        // table; concurrent recorders queue instead of double-counting.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS key_effectiveness (
                area            TEXT PRIMARY KEY,
                score           REAL NOT NULL,
                total_listings  INTEGER NOT NULL DEFAULT 0,
                total_scrapes   INTEGER NOT NULL DEFAULT 0,
                last_updated    TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS yield_samples (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                search_key    TEXT NOT NULL,
                area          TEXT NOT NULL,
                source        TEXT NOT NULL,
                record_count  INTEGER NOT NULL,
                score         REAL NOT NULL,
                day_of_week   TEXT NOT NULL,
                month         TEXT NOT NULL,
                recorded_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Record one invocation's yield and blend it into the area's score.
    /// Returns the updated score.
    pub async fn record(&self, key: &str, source: Source, record_count: u32) -> Result<f64> {
        self.record_at(key, source, record_count, Utc::now()).await
    }

    /// As [`record`](Self::record), with an explicit timestamp.
    pub async fn record_at(
        &self,
        key: &str,
        source: Source,
        record_count: u32,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        let area = area_code(key);
        // 10+ listings counts as full success, scaled linearly below that.
        let observed = (f64::from(record_count) / 10.0).clamp(0.0, 1.0);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO yield_samples
                (search_key, area, source, record_count, score, day_of_week, month, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(key)
        .bind(&area)
        .bind(source.as_str())
        .bind(i64::from(record_count))
        .bind(observed)
        .bind(now.format("%A").to_string())
        .bind(now.format("%B").to_string())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO key_effectiveness (area, score, total_listings, total_scrapes, last_updated)
            VALUES (?1, ?2, ?3, 1, ?4)
            ON CONFLICT(area) DO UPDATE SET
                score = (key_effectiveness.score + excluded.score) / 2.0,
                total_listings = key_effectiveness.total_listings + excluded.total_listings,
                total_scrapes = key_effectiveness.total_scrapes + 1,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&area)
        .bind(observed)
        .bind(i64::from(record_count))
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let score: f64 = sqlx::query_scalar("SELECT score FROM key_effectiveness WHERE area = ?1")
            .bind(&area)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(area = %area, source = %source, record_count, score, "Recorded yield");
        Ok(score)
    }

    /// Effectiveness score for one area, if any history exists.
    pub async fn score(&self, area: &str) -> Result<Option<f64>> {
        let score = sqlx::query_scalar("SELECT score FROM key_effectiveness WHERE area = ?1")
            .bind(area)
            .fetch_optional(&self.pool)
            .await?;
        Ok(score)
    }

    /// All persisted scores, keyed by area code. Loaded once per selection.
    pub async fn scores(&self) -> Result<HashMap<String, f64>> {
        let rows = sqlx::query("SELECT area, score FROM key_effectiveness")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("area"), row.get::<f64, _>("score")))
            .collect())
    }

    /// Best day-of-week and month for an area, by average sample score.
    pub async fn patterns(&self, area: &str) -> Result<TemporalPatterns> {
        let daily = sqlx::query(
            r#"
            SELECT day_of_week, AVG(score) AS avg_score, COUNT(*) AS samples
            FROM yield_samples
            WHERE area = ?1
            GROUP BY day_of_week
            ORDER BY avg_score DESC
            "#,
        )
        .bind(area)
        .fetch_all(&self.pool)
        .await?;

        let monthly = sqlx::query(
            r#"
            SELECT month, AVG(score) AS avg_score, COUNT(*) AS samples
            FROM yield_samples
            WHERE area = ?1
            GROUP BY month
            ORDER BY avg_score DESC
            "#,
        )
        .bind(area)
        .fetch_all(&self.pool)
        .await?;

        let daily: Vec<(String, f64, i64)> = daily
            .into_iter()
            .map(|r| (r.get("day_of_week"), r.get("avg_score"), r.get("samples")))
            .collect();
        let monthly: Vec<(String, f64, i64)> = monthly
            .into_iter()
            .map(|r| (r.get("month"), r.get("avg_score"), r.get("samples")))
            .collect();

        Ok(TemporalPatterns {
            best_day: daily.first().map(|d| d.0.clone()),
            best_month: monthly.first().map(|m| m.0.clone()),
            daily,
            monthly,
        })
    }
}
