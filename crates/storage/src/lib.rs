use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::any::{Any, AnyPoolOptions, AnyRow};
use sqlx::{AnyConnection, AnyPool};
use sqlx::{Decode, Executor, Row, Transaction, Type, TypeInfo, ValueRef};
use tracing::{info, warn};
use uuid::Uuid;

pub mod records;

pub use records::{
    AnalysisSnapshot, Company, CompanyFilter, Market, MarketFilter, NewCompany, NewMarket,
    NewProduct, NewSnapshot, Product, ProductFilter, SnapshotFilter, SnapshotKind,
};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const SQLITE_MEMORY_PREFIX: &str = "sqlite::memory:";

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

const READ_COMMITTED: &str =
    "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL READ COMMITTED";

const SNAPSHOT_COLUMNS: &str = "id, kind, payload_json, note, created_at_ms";
const COMPANY_COLUMNS: &str = "id, name, industry, region";
const MARKET_COLUMNS: &str = "id, company_id, name, growth_rate, size";
const PRODUCT_COLUMNS: &str =
    "id, company_id, market_id, name, market_share, largest_rival_share, price, revenue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(Backend::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Backend::Postgres)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::Postgres => "postgres",
        }
    }
}

/// Clamps a caller-supplied list limit into `1..=MAX_LIST_LIMIT`.
pub fn effective_limit(limit: Option<u32>) -> i64 {
    i64::from(limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT))
}

#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    backend: Backend,
    last_created_ms: Arc<AtomicI64>,
}

impl Store {
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let Some(backend) = Backend::from_url(url) else {
            bail!("database url must start with `sqlite:`, `postgres://` or `postgresql://`");
        };
        sqlx::any::install_default_drivers();

        // Every sqlite memory connection is its own database, so keep exactly one alive.
        let options = if url.starts_with(SQLITE_MEMORY_PREFIX) {
            AnyPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new().max_connections(5)
        };
        let pool = options
            .acquire_timeout(connect_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if backend == Backend::Postgres {
                        conn.execute(READ_COMMITTED).await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to {} database", backend.as_str()))?;
        run_init_sql(&pool).await?;

        let last_created_ms: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(created_at_ms), 0) FROM analysis_snapshots")
                .fetch_one(&pool)
                .await
                .context("failed to read latest snapshot time")?;

        Ok(Self {
            pool,
            backend,
            last_created_ms: Arc::new(AtomicI64::new(last_created_ms)),
        })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // Wall-clock milliseconds, bumped forward so each insert sorts after the last.
    fn next_created_ms(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_created_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        now.max(prev + 1)
    }

    pub async fn create_snapshot(&self, new: &NewSnapshot) -> Result<AnalysisSnapshot> {
        let snapshot = AnalysisSnapshot {
            id: Uuid::new_v4(),
            kind: new.kind,
            payload: new.payload.clone(),
            note: new.note.clone(),
            created_at: timestamp(self.next_created_ms())?,
        };
        let payload_json = serde_json::to_string(&snapshot.payload)?;

        let mut tx = self.pool.begin().await?;
        let outcome = sqlx::query(
            "INSERT INTO analysis_snapshots (id, kind, payload_json, note, created_at_ms) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.kind.as_str())
        .bind(payload_json)
        .bind(snapshot.note.clone())
        .bind(snapshot.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map(|_| snapshot)
        .map_err(anyhow::Error::from);
        finish(tx, outcome).await
    }

    pub async fn get_snapshot(&self, id: Uuid) -> Result<Option<AnalysisSnapshot>> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM analysis_snapshots WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    pub async fn list_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<AnalysisSnapshot>> {
        let conditions = filter
            .kind
            .map(|kind| ("kind", kind.as_str().to_string()));
        let rows = self
            .select(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM analysis_snapshots"),
                conditions.into_iter().collect(),
                "created_at_ms DESC, id ASC",
                filter.limit,
            )
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    pub async fn create_company(&self, new: &NewCompany) -> Result<Company> {
        let company = Company {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            industry: new.industry.clone(),
            region: new.region.clone(),
        };

        let mut tx = self.pool.begin().await?;
        let outcome = sqlx::query(
            "INSERT INTO companies (id, name, industry, region) VALUES ($1, $2, $3, $4)",
        )
        .bind(company.id.to_string())
        .bind(company.name.clone())
        .bind(company.industry.clone())
        .bind(company.region.clone())
        .execute(&mut *tx)
        .await
        .map(|_| company)
        .map_err(anyhow::Error::from);
        finish(tx, outcome).await
    }

    pub async fn get_company(&self, id: Uuid) -> Result<Option<Company>> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(company_from_row).transpose()
    }

    pub async fn list_companies(&self, filter: &CompanyFilter) -> Result<Vec<Company>> {
        let rows = self
            .select(
                &format!("SELECT {COMPANY_COLUMNS} FROM companies"),
                Vec::new(),
                "name ASC, id ASC",
                filter.limit,
            )
            .await?;
        rows.iter().map(company_from_row).collect()
    }

    pub async fn create_market(&self, new: &NewMarket) -> Result<Market> {
        let mut created = self.create_markets(std::slice::from_ref(new)).await?;
        created.pop().context("market insert returned no row")
    }

    /// Inserts the whole batch in one transaction; nothing is kept if any row fails.
    pub async fn create_markets(&self, batch: &[NewMarket]) -> Result<Vec<Market>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let outcome = insert_markets(&mut tx, batch).await;
        finish(tx, outcome).await
    }

    pub async fn get_market(&self, id: Uuid) -> Result<Option<Market>> {
        let sql = format!("SELECT {MARKET_COLUMNS} FROM markets WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(market_from_row).transpose()
    }

    pub async fn list_markets(&self, filter: &MarketFilter) -> Result<Vec<Market>> {
        let conditions = filter
            .company_id
            .map(|id| ("company_id", id.to_string()));
        let rows = self
            .select(
                &format!("SELECT {MARKET_COLUMNS} FROM markets"),
                conditions.into_iter().collect(),
                "name ASC, id ASC",
                filter.limit,
            )
            .await?;
        rows.iter().map(market_from_row).collect()
    }

    pub async fn create_product(&self, new: &NewProduct) -> Result<Product> {
        let mut created = self.create_products(std::slice::from_ref(new)).await?;
        created.pop().context("product insert returned no row")
    }

    /// Inserts the whole batch in one transaction; nothing is kept if any row fails.
    pub async fn create_products(&self, batch: &[NewProduct]) -> Result<Vec<Product>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let outcome = insert_products(&mut tx, batch).await;
        finish(tx, outcome).await
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let conditions = [
            filter.company_id.map(|id| ("company_id", id.to_string())),
            filter.market_id.map(|id| ("market_id", id.to_string())),
        ];
        let rows = self
            .select(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products"),
                conditions.into_iter().flatten().collect(),
                "name ASC, id ASC",
                filter.limit,
            )
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    /// Runs `base` with equality conditions, ordering and a clamped limit.
    async fn select(
        &self,
        base: &str,
        conditions: Vec<(&str, String)>,
        order_by: &str,
        limit: Option<u32>,
    ) -> Result<Vec<AnyRow>> {
        let mut sql = String::from(base);
        let mut values = Vec::with_capacity(conditions.len());
        for (idx, (column, value)) in conditions.into_iter().enumerate() {
            let joiner = if idx == 0 { " WHERE " } else { " AND " };
            sql.push_str(&format!("{joiner}{column} = ${}", idx + 1));
            values.push(value);
        }
        sql.push_str(&format!(" ORDER BY {order_by} LIMIT ${}", values.len() + 1));

        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        let rows = query
            .bind(effective_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

pub async fn open_store(url: &str, connect_timeout: Duration) -> Result<Store> {
    let store = Store::connect(url, connect_timeout).await?;
    info!(backend = store.backend().as_str(), "database initialized");
    Ok(store)
}

async fn run_init_sql(pool: &AnyPool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}

async fn finish<T>(tx: Transaction<'_, Any>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = ?rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn insert_markets(conn: &mut AnyConnection, batch: &[NewMarket]) -> Result<Vec<Market>> {
    let mut created = Vec::with_capacity(batch.len());
    for new in batch {
        let market = Market {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            name: new.name.clone(),
            growth_rate: new.growth_rate,
            size: new.size,
        };
        sqlx::query(
            "INSERT INTO markets (id, company_id, name, growth_rate, size) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(market.id.to_string())
        .bind(market.company_id.map(|id| id.to_string()))
        .bind(market.name.clone())
        .bind(market.growth_rate)
        .bind(market.size)
        .execute(&mut *conn)
        .await?;
        created.push(market);
    }
    Ok(created)
}

async fn insert_products(conn: &mut AnyConnection, batch: &[NewProduct]) -> Result<Vec<Product>> {
    let mut created = Vec::with_capacity(batch.len());
    for new in batch {
        let product = Product {
            id: Uuid::new_v4(),
            company_id: new.company_id,
            market_id: new.market_id,
            name: new.name.clone(),
            market_share: new.market_share,
            largest_rival_share: new.largest_rival_share,
            price: new.price,
            revenue: new.revenue,
        };
        sqlx::query(
            "INSERT INTO products (id, company_id, market_id, name, market_share, largest_rival_share, price, revenue) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(product.id.to_string())
        .bind(product.company_id.map(|id| id.to_string()))
        .bind(product.market_id.map(|id| id.to_string()))
        .bind(product.name.clone())
        .bind(product.market_share)
        .bind(product.largest_rival_share)
        .bind(product.price)
        .bind(product.revenue)
        .execute(&mut *conn)
        .await?;
        created.push(product);
    }
    Ok(created)
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("timestamp {ms} out of range"))
}

/// Reads a nullable column. The `Any` driver rejects NULL cells for `Option<T>`
/// and only reveals them through the cell's type name.
fn nullable<'r, T>(row: &'r AnyRow, column: &str) -> Result<Option<T>>
where
    T: Decode<'r, Any> + Type<Any>,
{
    let raw = row.try_get_raw(column)?;
    if raw.is_null() || raw.type_info().name() == "NULL" {
        return Ok(None);
    }
    Ok(Some(row.try_get(column)?))
}

fn uuid_column(row: &AnyRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).with_context(|| format!("column `{column}` holds invalid id `{raw}`"))
}

fn optional_uuid_column(row: &AnyRow, column: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = nullable(row, column)?;
    raw.map(|raw| {
        Uuid::parse_str(&raw).with_context(|| format!("column `{column}` holds invalid id `{raw}`"))
    })
    .transpose()
}

fn snapshot_from_row(row: &AnyRow) -> Result<AnalysisSnapshot> {
    let kind: String = row.try_get("kind")?;
    let payload_json: String = row.try_get("payload_json")?;
    let payload: Map<String, Value> =
        serde_json::from_str(&payload_json).context("snapshot payload is not a json object")?;
    Ok(AnalysisSnapshot {
        id: uuid_column(row, "id")?,
        kind: kind.parse()?,
        payload,
        note: nullable(row, "note")?,
        created_at: timestamp(row.try_get("created_at_ms")?)?,
    })
}

fn company_from_row(row: &AnyRow) -> Result<Company> {
    Ok(Company {
        id: uuid_column(row, "id")?,
        name: row.try_get("name")?,
        industry: nullable(row, "industry")?,
        region: nullable(row, "region")?,
    })
}

fn market_from_row(row: &AnyRow) -> Result<Market> {
    Ok(Market {
        id: uuid_column(row, "id")?,
        company_id: optional_uuid_column(row, "company_id")?,
        name: row.try_get("name")?,
        growth_rate: row.try_get("growth_rate")?,
        size: nullable(row, "size")?,
    })
}

fn product_from_row(row: &AnyRow) -> Result<Product> {
    Ok(Product {
        id: uuid_column(row, "id")?,
        company_id: optional_uuid_column(row, "company_id")?,
        market_id: optional_uuid_column(row, "market_id")?,
        name: row.try_get("name")?,
        market_share: nullable(row, "market_share")?,
        largest_rival_share: nullable(row, "largest_rival_share")?,
        price: nullable(row, "price")?,
        revenue: nullable(row, "revenue")?,
    })
}
