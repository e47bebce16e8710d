use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use crate::models::{CutoffDirection, CutoffRecord, Metric, MetricRecord};

const LAST_RUN_KEY: &str = "last_run";
const CUTOFF_DIRECTION_KEY: &str = "cutoff_direction";

/// SQLite mirror of the Metrics and Cutoffs tables.
///
/// Each write replaces the whole table inside one transaction so readers never see a mix of
/// two runs.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (or create) the database file at `database_path`
    pub async fn new(database_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {}", database_path.display()))?;

        let db = DatabaseManager { pool };
        db.run_migrations().await?;
        info!("Database initialized at {}", database_path.display());
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drop and rewrite the `metrics` table
    pub async fn replace_metrics(&self, records: &[MetricRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS metrics")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE TABLE metrics (
                ticker TEXT NOT NULL,
                industry TEXT,
                market_cap REAL,
                revenue_cagr REAL,
                net_profit_margin_avg REAL,
                net_income_cagr REAL,
                eps_cagr REAL,
                operating_cashflow_cagr REAL,
                roce REAL
            )",
        )
        .execute(&mut *tx)
        .await?;

        for record in records {
            sqlx::query(
                "INSERT INTO metrics (
                    ticker, industry, market_cap, revenue_cagr, net_profit_margin_avg,
                    net_income_cagr, eps_cagr, operating_cashflow_cagr, roce
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&record.ticker)
            .bind(&record.industry)
            .bind(record.market_cap)
            .bind(record.revenue_cagr)
            .bind(record.net_profit_margin_avg)
            .bind(record.net_income_cagr)
            .bind(record.eps_cagr)
            .bind(record.operating_cashflow_cagr)
            .bind(record.roce)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored {} metric rows", records.len());
        Ok(())
    }

    /// Drop and rewrite the `cutoffs` table with one REAL column per metric
    pub async fn replace_cutoffs(&self, cutoffs: &[CutoffRecord], metrics: &[Metric]) -> Result<()> {
        let columns: Vec<&str> = metrics.iter().map(|m| m.column()).collect();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS cutoffs")
            .execute(&mut *tx)
            .await?;

        let mut create = String::from("CREATE TABLE cutoffs (industry TEXT NOT NULL, percentile INTEGER NOT NULL");
        for column in &columns {
            create.push_str(&format!(", {} REAL", column));
        }
        create.push(')');
        sqlx::query(&create).execute(&mut *tx).await?;

        let placeholders = (1..=columns.len() + 2)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let mut names = vec!["industry", "percentile"];
        names.extend(&columns);
        let insert = format!(
            "INSERT INTO cutoffs ({}) VALUES ({})",
            names.join(", "),
            placeholders
        );

        for row in cutoffs {
            let mut query = sqlx::query(&insert)
                .bind(&row.industry)
                .bind(i64::from(row.percentile));
            for &metric in metrics {
                query = query.bind(row.value(metric));
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Stored {} cutoff rows", cutoffs.len());
        Ok(())
    }

    pub async fn load_metrics(&self) -> Result<Vec<MetricRecord>> {
        if !self.table_exists("metrics").await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT ticker, industry, market_cap, revenue_cagr, net_profit_margin_avg,
                    net_income_cagr, eps_cagr, operating_cashflow_cagr, roce
             FROM metrics ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(MetricRecord {
                    ticker: row.try_get("ticker")?,
                    industry: row.try_get("industry")?,
                    market_cap: row.try_get("market_cap")?,
                    revenue_cagr: row.try_get("revenue_cagr")?,
                    net_profit_margin_avg: row.try_get("net_profit_margin_avg")?,
                    net_income_cagr: row.try_get("net_income_cagr")?,
                    eps_cagr: row.try_get("eps_cagr")?,
                    operating_cashflow_cagr: row.try_get("operating_cashflow_cagr")?,
                    roce: row.try_get("roce")?,
                })
            })
            .collect()
    }

    /// Load the stored cutoffs along with the metric columns the table was written with
    pub async fn load_cutoffs(&self) -> Result<(Vec<Metric>, Vec<CutoffRecord>)> {
        if !self.table_exists("cutoffs").await? {
            return Ok((Vec::new(), Vec::new()));
        }

        let metrics = sqlx::query("SELECT name FROM pragma_table_info('cutoffs') ORDER BY cid")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|name| name != "industry" && name != "percentile")
            .map(|name| name.parse::<Metric>())
            .collect::<Result<Vec<_>, _>>()?;

        let rows = sqlx::query("SELECT * FROM cutoffs ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        let mut cutoffs = Vec::with_capacity(rows.len());
        for row in &rows {
            let percentile: i64 = row.try_get("percentile")?;
            let values = metrics
                .iter()
                .map(|&m| Ok((m, row.try_get::<Option<f64>, _>(m.column())?)))
                .collect::<Result<Vec<_>>>()?;
            cutoffs.push(CutoffRecord {
                industry: row.try_get("industry")?,
                percentile: u8::try_from(percentile)
                    .map_err(|_| anyhow!("stored percentile {} out of range", percentile))?,
                values,
            });
        }
        Ok((metrics, cutoffs))
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Which tail the stored cutoffs were aggregated for
    pub async fn get_cutoff_direction(&self) -> Result<Option<CutoffDirection>> {
        self.get_metadata(CUTOFF_DIRECTION_KEY)
            .await?
            .map(|raw| raw.parse().map_err(anyhow::Error::from))
            .transpose()
    }

    pub async fn set_cutoff_direction(&self, direction: CutoffDirection) -> Result<()> {
        self.set_metadata(CUTOFF_DIRECTION_KEY, direction.as_str()).await
    }

    pub async fn get_last_run(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get_metadata(LAST_RUN_KEY).await? {
            Some(raw) => Ok(Some(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))),
            None => Ok(None),
        }
    }

    pub async fn set_last_run(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_metadata(LAST_RUN_KEY, &at.to_rfc3339()).await
    }

    /// Row counts for (metrics, cutoffs) and the last recorded run
    pub async fn get_stats(&self) -> Result<(usize, usize, Option<DateTime<Utc>>)> {
        let mut counts = [0usize; 2];
        for (slot, table) in counts.iter_mut().zip(["metrics", "cutoffs"]) {
            if self.table_exists(table).await? {
                let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                    .fetch_one(&self.pool)
                    .await?;
                *slot = usize::try_from(count).unwrap_or_default();
            }
        }
        Ok((counts[0], counts[1], self.get_last_run().await?))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
