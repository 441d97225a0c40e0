//! `PostgreSQL` sample history.
//!
//! One append-only table; the identity column doubles as the sequence that
//! orders samples sharing a timestamp.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::application::ports::{QuoteStorePort, StoreError, StoredQuote};
use crate::domain::quote::{QuoteSample, TrackedSet, TrackedSymbol};

/// Quote history backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PostgresQuoteStore {
    pool: PgPool,
    tracked: TrackedSet,
}

impl PostgresQuoteStore {
    /// Connect and make sure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database cannot be reached
    /// or the schema cannot be created.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        tracked: TrackedSet,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(max_connections, "PostgreSQL connection pool initialized");

        let store = Self::with_pool(pool, tracked);
        store.run_migrations().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Does not touch the schema.
    #[must_use]
    pub const fn with_pool(pool: PgPool, tracked: TrackedSet) -> Self {
        Self { pool, tracked }
    }

    /// Create the samples table and its lookup index if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if a DDL statement fails.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS quote_samples (
                id          BIGSERIAL PRIMARY KEY,
                symbol      TEXT NOT NULL,
                price       DOUBLE PRECISION NOT NULL,
                market_cap  DOUBLE PRECISION NOT NULL,
                change_24h  DOUBLE PRECISION NOT NULL,
                observed_at TIMESTAMPTZ NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Connection(format!("create table: {e}")))?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS quote_samples_symbol_observed_idx
                ON quote_samples (symbol, observed_at DESC, id DESC)
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Connection(format!("create index: {e}")))?;

        debug!("Quote store schema ready");
        Ok(())
    }

    fn row_to_stored(&self, row: &PgRow) -> Result<StoredQuote, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Corrupt(format!("id: {e}")))?;
        let symbol: String = row
            .try_get("symbol")
            .map_err(|e| StoreError::Corrupt(format!("symbol: {e}")))?;
        let price: f64 = row
            .try_get("price")
            .map_err(|e| StoreError::Corrupt(format!("price: {e}")))?;
        let market_cap: f64 = row
            .try_get("market_cap")
            .map_err(|e| StoreError::Corrupt(format!("market_cap: {e}")))?;
        let change_24h: f64 = row
            .try_get("change_24h")
            .map_err(|e| StoreError::Corrupt(format!("change_24h: {e}")))?;
        let observed_at: DateTime<Utc> = row
            .try_get("observed_at")
            .map_err(|e| StoreError::Corrupt(format!("observed_at: {e}")))?;

        let symbol = self
            .tracked
            .resolve(&symbol)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let sample = QuoteSample::new(symbol, price, market_cap, change_24h, observed_at)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let sequence =
            u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative id {id}")))?;

        Ok(StoredQuote { sample, sequence })
    }
}

#[async_trait]
impl QuoteStorePort for PostgresQuoteStore {
    async fn append(&self, sample: &QuoteSample) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO quote_samples (symbol, price, market_cap, change_24h, observed_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(sample.symbol().as_str())
        .bind(sample.price())
        .bind(sample.market_cap())
        .bind(sample.change_24h())
        .bind(sample.observed_at())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Corrupt(format!("id: {e}")))?;
        u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative id {id}")))
    }

    async fn recent(
        &self,
        symbol: &TrackedSymbol,
        limit: usize,
    ) -> Result<Vec<StoredQuote>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r"
            SELECT id, symbol, price, market_cap, change_24h, observed_at
            FROM quote_samples
            WHERE symbol = $1
            ORDER BY observed_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(symbol.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter().map(|row| self.row_to_stored(row)).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
    }
}
