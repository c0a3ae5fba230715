//! Bill repository on SQLite.
//!
//! One `bills` table keyed by the client-supplied id. Line items are stored as
//! JSON text. Reads migrate legacy rows whose `imagePath` holds an inline
//! image (see [`BillRecord::reclassify_legacy_image`]).

use crate::models::{
    BillFilter, BillRecord, BillSort, BillStats, LineItem, PageRequest, Pagination, SortField,
};
use service_core::error::AppError;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{FromRow, QueryBuilder};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

const BILL_COLUMNS: &str =
    "id, storeName, date, subtotal, tax, total, currency, imagePath, createdAt, lineItems";

/// Raw row. Columns are nullable because older schema variants left gaps.
#[derive(Debug, FromRow)]
#[sqlx(rename_all = "camelCase")]
struct BillRow {
    id: String,
    store_name: Option<String>,
    date: Option<String>,
    subtotal: Option<f64>,
    tax: Option<f64>,
    total: Option<f64>,
    currency: Option<String>,
    image_path: Option<String>,
    created_at: Option<String>,
    line_items: Option<String>,
}

impl TryFrom<BillRow> for BillRecord {
    type Error = AppError;

    fn try_from(row: BillRow) -> Result<Self, Self::Error> {
        let line_items: Vec<LineItem> = match row.line_items.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "Corrupt lineItems for bill {}: {}",
                    row.id,
                    e
                ))
            })?,
        };

        let record = BillRecord {
            id: row.id,
            store_name: row.store_name.unwrap_or_default(),
            date: row.date.unwrap_or_default(),
            subtotal: row.subtotal.unwrap_or(0.0),
            tax: row.tax.unwrap_or(0.0),
            total: row.total.unwrap_or(0.0),
            currency: row.currency.unwrap_or_default(),
            line_items,
            image_path: row.image_path,
            image_data: None,
            created_at: row.created_at.unwrap_or_default(),
        };
        Ok(record.reclassify_legacy_image())
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedBill {
    pub id: String,
    pub created: bool,
}

/// One page of a bill query.
#[derive(Debug, Clone)]
pub struct BillPage {
    pub bills: Vec<BillRecord>,
    pub pagination: Pagination,
}

/// Bill persistence and the filter/sort/paginate read path.
#[derive(Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

impl BillRepository {
    /// Open (creating if needed) the SQLite database at `database_url`.
    #[instrument(skip(database_url), fields(service = "receipt-service"))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!(max_connections = max_connections, "Opening SQLite database");

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        self.backfill_search_keys().await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Fill `storeNameKey` for rows written before the column existed.
    async fn backfill_search_keys(&self) -> Result<(), AppError> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT id, storeName FROM bills WHERE storeNameKey IS NULL")
                .fetch_all(&self.pool)
                .await?;
        if rows.is_empty() {
            return Ok(());
        }

        for (id, store_name) in &rows {
            sqlx::query("UPDATE bills SET storeNameKey = ? WHERE id = ?")
                .bind(search_key(store_name.as_deref().unwrap_or_default()))
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        info!(rows = rows.len(), "Backfilled store name search keys");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Insert a new bill or replace the mutable fields of an existing one.
    ///
    /// The update path never writes `createdAt`.
    #[instrument(skip(self, bill), fields(bill_id = %bill.id))]
    pub async fn upsert(&self, bill: &BillRecord) -> Result<SavedBill, AppError> {
        let start = Instant::now();
        let line_items = serde_json::to_string(&bill.line_items)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;

        let created = if self.exists(&bill.id).await? {
            self.update(bill, &line_items).await?;
            false
        } else {
            match self.insert(bill, &line_items).await {
                Ok(()) => true,
                // Lost a race with a concurrent create of the same id.
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    self.update(bill, &line_items).await?;
                    false
                }
                Err(e) => {
                    return Err(AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to insert bill: {}",
                        e
                    )))
                }
            }
        };

        observe("upsert", start);
        info!(created = created, "Bill saved");

        Ok(SavedBill {
            id: bill.id.clone(),
            created,
        })
    }

    async fn insert(&self, bill: &BillRecord, line_items: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO bills (id, storeName, storeNameKey, date, subtotal, tax, total, currency, imagePath, createdAt, lineItems)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.store_name)
        .bind(search_key(&bill.store_name))
        .bind(&bill.date)
        .bind(bill.subtotal)
        .bind(bill.tax)
        .bind(bill.total)
        .bind(&bill.currency)
        .bind(&bill.image_path)
        .bind(&bill.created_at)
        .bind(line_items)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, bill: &BillRecord, line_items: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE bills SET
                storeName = ?, storeNameKey = ?, date = ?, subtotal = ?, tax = ?, total = ?,
                currency = ?, imagePath = ?, lineItems = ?
            WHERE id = ?
            "#,
        )
        .bind(&bill.store_name)
        .bind(search_key(&bill.store_name))
        .bind(&bill.date)
        .bind(bill.subtotal)
        .bind(bill.tax)
        .bind(bill.total)
        .bind(&bill.currency)
        .bind(&bill.image_path)
        .bind(line_items)
        .bind(&bill.id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update bill: {}", e)))?;
        Ok(())
    }

    /// Remove a bill row. Returns whether a row existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let start = Instant::now();
        let result = sqlx::query("DELETE FROM bills WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete bill: {}", e)))?;
        observe("delete", start);
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn exists(&self, id: &str) -> Result<bool, AppError> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM bills WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to look up bill: {}", e))
            })?;
        Ok(found.is_some())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<BillRecord>, AppError> {
        let start = Instant::now();
        let row = sqlx::query_as::<_, BillRow>(&format!(
            "SELECT {} FROM bills WHERE id = ?",
            BILL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bill: {}", e)))?;
        observe("get", start);

        row.map(BillRecord::try_from).transpose()
    }

    /// Every bill matching `filter`, ordered by `sort`.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &BillFilter,
        sort: BillSort,
    ) -> Result<Vec<BillRecord>, AppError> {
        let start = Instant::now();
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM bills", BILL_COLUMNS));
        push_filters(&mut qb, filter);
        push_order(&mut qb, sort);

        let rows = qb
            .build_query_as::<BillRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bills: {}", e)))?;
        observe("list", start);

        rows.into_iter().map(BillRecord::try_from).collect()
    }

    /// One page of the bills matching `filter`, ordered by `sort`.
    #[instrument(skip(self))]
    pub async fn query(
        &self,
        filter: &BillFilter,
        sort: BillSort,
        page: PageRequest,
    ) -> Result<BillPage, AppError> {
        let start = Instant::now();

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM bills");
        push_filters(&mut count_qb, filter);
        let (total_count,): (i64,) = count_qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count bills: {}", e)))?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM bills", BILL_COLUMNS));
        push_filters(&mut qb, filter);
        push_order(&mut qb, sort);
        qb.push(" LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = qb
            .build_query_as::<BillRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to query bills: {}", e)))?;
        observe("query", start);

        let bills = rows
            .into_iter()
            .map(BillRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BillPage {
            bills,
            pagination: Pagination::new(page, total_count.max(0) as u64),
        })
    }

    /// Sum of `total` and row count over the bills matching `filter`.
    #[instrument(skip(self))]
    pub async fn stats(&self, filter: &BillFilter) -> Result<BillStats, AppError> {
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT COALESCE(SUM(total), 0.0), COUNT(*) FROM bills");
        push_filters(&mut qb, filter);

        let (total, count): (f64, i64) = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum bills: {}", e)))?;

        Ok(BillStats {
            total,
            count: count.max(0) as u64,
        })
    }
}

/// Case-folded store name. Rows inserted outside the repository may lack the
/// key, so those fall back to SQLite's ASCII `lower()`.
const STORE_NAME_KEY: &str = "COALESCE(storeNameKey, lower(storeName))";

/// Both sides of a case-insensitive match go through this fold.
fn search_key(text: &str) -> String {
    text.to_lowercase()
}

/// Append the WHERE clause for `filter`. Every bound is bound, never inlined.
fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a BillFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(date_from) = &filter.date_from {
        qb.push(" AND date >= ").push_bind(date_from.as_str());
    }
    if let Some(date_to) = &filter.date_to {
        qb.push(" AND date <= ").push_bind(date_to.as_str());
    }
    if let Some(store_name) = &filter.store_name {
        qb.push(format!(" AND instr({}, ", STORE_NAME_KEY))
            .push_bind(search_key(store_name))
            .push(") > 0");
    }
    if let Some(min_amount) = filter.min_amount {
        qb.push(" AND total >= ").push_bind(min_amount);
    }
    if let Some(max_amount) = filter.max_amount {
        qb.push(" AND total <= ").push_bind(max_amount);
    }
    if let Some(term) = &filter.search_term {
        let term = search_key(term);
        qb.push(format!(" AND (instr({}, ", STORE_NAME_KEY))
            .push_bind(term.clone())
            .push(") > 0 OR instr(lower(date), ")
            .push_bind(term)
            .push(") > 0)");
    }
}

/// Single-key ORDER BY with `id` as a deterministic tie-break.
fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, sort: BillSort) {
    let collate = if sort.field == SortField::StoreName {
        " COLLATE NOCASE"
    } else {
        ""
    };
    qb.push(format!(
        " ORDER BY {}{} {}, id ASC",
        sort.field.column(),
        collate,
        sort.direction.keyword()
    ));
}

fn observe(operation: &'static str, start: Instant) {
    metrics::histogram!("receipt_db_query_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
