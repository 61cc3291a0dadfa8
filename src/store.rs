//! Storage for vacancy snapshots, detail rows, and run history.
//!
//! The [`SnapshotStore`] trait carries exactly what reconciliation and the
//! orchestrator need, enabling pluggable backends: SQLite in production,
//! in-memory for tests. Read queries for the front door (listing, detail
//! lookup, run history) operate directly on the pool.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::models::{PricingRow, RequirementRow, ScrapeRun, ShiftRow, Vacancy, VacancyDetail};

/// The volatile slice of a persisted snapshot row, as needed for change
/// classification.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatileSnapshot {
    pub fill_rate: f64,
    pub dynamic_status: String,
    pub procured_amount: f64,
}

/// Durable keyed storage for snapshot rows and run history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Volatile fields of the stored row for `id`, or `None` if the id has
    /// never been seen.
    async fn volatile_snapshot(&self, id: &str) -> Result<Option<VolatileSnapshot>>;

    /// First sight of an id: write the full row with
    /// `first_seen_at = last_updated_at = scraped_at = now`.
    async fn insert_vacancy(&self, vacancy: &Vacancy, now: i64) -> Result<()>;

    /// Update volatile fields, `scraped_at`, `last_updated_at`, and the
    /// raw payload. Must never touch `first_seen_at`.
    async fn update_volatile(&self, vacancy: &Vacancy, now: i64) -> Result<()>;

    /// Replace all child rows for `id` with the given detail set. The
    /// delete and inserts commit together so an interrupted write cannot
    /// leave a half-replaced set.
    async fn replace_detail(&self, id: &str, detail: &VacancyDetail) -> Result<()>;

    /// Append one run to the history.
    async fn append_run(&self, run: &ScrapeRun) -> Result<()>;
}

// ============ SQLite ============

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn volatile_snapshot(&self, id: &str) -> Result<Option<VolatileSnapshot>> {
        let row = sqlx::query(
            "SELECT fill_rate, dynamic_status, procured_amount FROM vacancies WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| VolatileSnapshot {
            fill_rate: r.get("fill_rate"),
            dynamic_status: r.get("dynamic_status"),
            procured_amount: r.get("procured_amount"),
        }))
    }

    async fn insert_vacancy(&self, v: &Vacancy, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vacancies (
                id, title, profession, specializations, municipality, region,
                job_starts_at, job_ends_at, procured_amount, procured_amount_currency,
                scope_hours, fill_rate, dynamic_status, tender_id, tender_title,
                unit_id, unit_name, orderer_id, orderer_name, last_application_date,
                created_at, announced_at, scraped_at, first_seen_at, last_updated_at,
                raw_json
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&v.id)
        .bind(&v.title)
        .bind(&v.profession)
        .bind(&v.specializations)
        .bind(&v.municipality)
        .bind(&v.region)
        .bind(v.job_starts_at)
        .bind(v.job_ends_at)
        .bind(v.procured_amount)
        .bind(&v.procured_amount_currency)
        .bind(v.scope_hours)
        .bind(v.fill_rate)
        .bind(&v.dynamic_status)
        .bind(&v.tender_id)
        .bind(&v.tender_title)
        .bind(&v.unit_id)
        .bind(&v.unit_name)
        .bind(&v.orderer_id)
        .bind(&v.orderer_name)
        .bind(v.last_application_date)
        .bind(v.created_at)
        .bind(v.announced_at)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(&v.raw_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_volatile(&self, v: &Vacancy, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE vacancies SET
                fill_rate = ?, dynamic_status = ?, procured_amount = ?,
                scraped_at = ?, last_updated_at = ?, raw_json = ?
            WHERE id = ?
            "#,
        )
        .bind(v.fill_rate)
        .bind(&v.dynamic_status)
        .bind(v.procured_amount)
        .bind(now)
        .bind(now)
        .bind(&v.raw_json)
        .bind(&v.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_detail(&self, id: &str, detail: &VacancyDetail) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM vacancy_shifts WHERE vacancy_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM vacancy_requirements WHERE vacancy_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM vacancy_pricing WHERE vacancy_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (i, shift) in detail.shifts.iter().enumerate() {
            sqlx::query(
                "INSERT INTO vacancy_shifts (vacancy_id, shift_index, starts_at, ends_at, shift_type) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(i as i64)
            .bind(shift.starts_at)
            .bind(shift.ends_at)
            .bind(&shift.shift_type)
            .execute(&mut *tx)
            .await?;
        }
        for (i, req) in detail.requirements.iter().enumerate() {
            sqlx::query(
                "INSERT INTO vacancy_requirements (vacancy_id, req_index, kind, value) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(i as i64)
            .bind(&req.kind)
            .bind(&req.value)
            .execute(&mut *tx)
            .await?;
        }
        for (i, price) in detail.pricing.iter().enumerate() {
            sqlx::query(
                "INSERT INTO vacancy_pricing (vacancy_id, price_index, label, amount, currency) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(i as i64)
            .bind(&price.label)
            .bind(price.amount)
            .bind(&price.currency)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_run(&self, run: &ScrapeRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scrape_history (
                id, started_at, duration_seconds, total_fetched,
                new_count, updated_count, unchanged_count, errors
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(run.started_at)
        .bind(run.duration_seconds)
        .bind(run.total_fetched)
        .bind(run.new_count)
        .bind(run.updated_count)
        .bind(run.unchanged_count)
        .bind(&run.errors)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============ Front-door reads ============

/// A stored snapshot row as served by the listing and detail endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct StoredVacancy {
    pub id: String,
    pub title: String,
    pub profession: String,
    pub specializations: String,
    pub municipality: String,
    pub region: String,
    pub job_starts_at: i64,
    pub job_ends_at: i64,
    pub procured_amount: f64,
    pub procured_amount_currency: String,
    pub scope_hours: f64,
    pub fill_rate: f64,
    pub dynamic_status: String,
    pub tender_id: String,
    pub tender_title: String,
    pub unit_name: String,
    pub orderer_name: String,
    pub last_application_date: i64,
    pub created_at: i64,
    pub scraped_at: i64,
    pub first_seen_at: i64,
    pub last_updated_at: i64,
}

fn stored_from_row(row: &sqlx::sqlite::SqliteRow) -> StoredVacancy {
    StoredVacancy {
        id: row.get("id"),
        title: row.get("title"),
        profession: row.get("profession"),
        specializations: row.get("specializations"),
        municipality: row.get("municipality"),
        region: row.get("region"),
        job_starts_at: row.get("job_starts_at"),
        job_ends_at: row.get("job_ends_at"),
        procured_amount: row.get("procured_amount"),
        procured_amount_currency: row.get("procured_amount_currency"),
        scope_hours: row.get("scope_hours"),
        fill_rate: row.get("fill_rate"),
        dynamic_status: row.get("dynamic_status"),
        tender_id: row.get("tender_id"),
        tender_title: row.get("tender_title"),
        unit_name: row.get("unit_name"),
        orderer_name: row.get("orderer_name"),
        last_application_date: row.get("last_application_date"),
        created_at: row.get("created_at"),
        scraped_at: row.get("scraped_at"),
        first_seen_at: row.get("first_seen_at"),
        last_updated_at: row.get("last_updated_at"),
    }
}

pub async fn list_vacancies(
    pool: &SqlitePool,
    limit: i64,
    profession: Option<&str>,
) -> Result<Vec<StoredVacancy>> {
    let rows = match profession {
        Some(p) => {
            sqlx::query(
                "SELECT * FROM vacancies WHERE profession = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(p)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM vacancies ORDER BY created_at DESC LIMIT ?")
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows.iter().map(stored_from_row).collect())
}

/// Full stored record for one id: the snapshot row plus its child rows.
#[derive(Debug, Serialize)]
pub struct StoredDetail {
    #[serde(flatten)]
    pub vacancy: StoredVacancy,
    pub shifts: Vec<ShiftRow>,
    pub requirements: Vec<RequirementRow>,
    pub pricing: Vec<PricingRow>,
}

pub async fn load_detail(pool: &SqlitePool, id: &str) -> Result<Option<StoredDetail>> {
    let Some(row) = sqlx::query("SELECT * FROM vacancies WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };
    let vacancy = stored_from_row(&row);

    let shifts = sqlx::query(
        "SELECT starts_at, ends_at, shift_type FROM vacancy_shifts \
         WHERE vacancy_id = ? ORDER BY shift_index",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| ShiftRow {
        starts_at: r.get("starts_at"),
        ends_at: r.get("ends_at"),
        shift_type: r.get("shift_type"),
    })
    .collect();

    let requirements = sqlx::query(
        "SELECT kind, value FROM vacancy_requirements WHERE vacancy_id = ? ORDER BY req_index",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| RequirementRow {
        kind: r.get("kind"),
        value: r.get("value"),
    })
    .collect();

    let pricing = sqlx::query(
        "SELECT label, amount, currency FROM vacancy_pricing \
         WHERE vacancy_id = ? ORDER BY price_index",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(|r| PricingRow {
        label: r.get("label"),
        amount: r.get("amount"),
        currency: r.get("currency"),
    })
    .collect();

    Ok(Some(StoredDetail {
        vacancy,
        shifts,
        requirements,
        pricing,
    }))
}

pub async fn recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<ScrapeRun>> {
    let rows = sqlx::query(
        "SELECT id, started_at, duration_seconds, total_fetched, new_count, \
         updated_count, unchanged_count, errors \
         FROM scrape_history ORDER BY started_at DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| ScrapeRun {
            id: r.get("id"),
            started_at: r.get("started_at"),
            duration_seconds: r.get("duration_seconds"),
            total_fetched: r.get("total_fetched"),
            new_count: r.get("new_count"),
            updated_count: r.get("updated_count"),
            unchanged_count: r.get("unchanged_count"),
            errors: r.get("errors"),
        })
        .collect())
}

// ============ In-memory ============

/// Row held by the in-memory store, bookkeeping included.
#[derive(Debug, Clone)]
pub struct MemoryRow {
    pub vacancy: Vacancy,
    pub scraped_at: i64,
    pub first_seen_at: i64,
    pub last_updated_at: i64,
}

/// In-memory [`SnapshotStore`] for tests. `HashMap` + `Vec` behind
/// `std::sync::RwLock`, mirroring what the SQLite implementation does.
#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<HashMap<String, MemoryRow>>,
    details: RwLock<HashMap<String, VacancyDetail>>,
    runs: RwLock<Vec<ScrapeRun>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, id: &str) -> Option<MemoryRow> {
        self.rows.read().unwrap().get(id).cloned()
    }

    pub fn detail(&self, id: &str) -> Option<VacancyDetail> {
        self.details.read().unwrap().get(id).cloned()
    }

    pub fn runs(&self) -> Vec<ScrapeRun> {
        self.runs.read().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn volatile_snapshot(&self, id: &str) -> Result<Option<VolatileSnapshot>> {
        Ok(self.rows.read().unwrap().get(id).map(|row| VolatileSnapshot {
            fill_rate: row.vacancy.fill_rate,
            dynamic_status: row.vacancy.dynamic_status.clone(),
            procured_amount: row.vacancy.procured_amount,
        }))
    }

    async fn insert_vacancy(&self, vacancy: &Vacancy, now: i64) -> Result<()> {
        self.rows.write().unwrap().insert(
            vacancy.id.clone(),
            MemoryRow {
                vacancy: vacancy.clone(),
                scraped_at: now,
                first_seen_at: now,
                last_updated_at: now,
            },
        );
        Ok(())
    }

    async fn update_volatile(&self, vacancy: &Vacancy, now: i64) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        if let Some(row) = rows.get_mut(&vacancy.id) {
            row.vacancy.fill_rate = vacancy.fill_rate;
            row.vacancy.dynamic_status = vacancy.dynamic_status.clone();
            row.vacancy.procured_amount = vacancy.procured_amount;
            row.vacancy.raw_json = vacancy.raw_json.clone();
            row.scraped_at = now;
            row.last_updated_at = now;
        }
        Ok(())
    }

    async fn replace_detail(&self, id: &str, detail: &VacancyDetail) -> Result<()> {
        self.details
            .write()
            .unwrap()
            .insert(id.to_string(), detail.clone());
        Ok(())
    }

    async fn append_run(&self, run: &ScrapeRun) -> Result<()> {
        self.runs.write().unwrap().push(run.clone());
        Ok(())
    }
}
