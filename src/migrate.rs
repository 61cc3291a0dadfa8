use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; `vh init` runs this and re-running is safe.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Snapshot rows: one per vacancy id, volatile fields plus the stable
    // projection and bookkeeping timestamps. first_seen_at is write-once.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vacancies (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            profession TEXT NOT NULL,
            specializations TEXT NOT NULL DEFAULT '[]',
            municipality TEXT NOT NULL DEFAULT '',
            region TEXT NOT NULL DEFAULT '',
            job_starts_at INTEGER NOT NULL DEFAULT 0,
            job_ends_at INTEGER NOT NULL DEFAULT 0,
            procured_amount REAL NOT NULL DEFAULT 0,
            procured_amount_currency TEXT NOT NULL DEFAULT 'SEK',
            scope_hours REAL NOT NULL DEFAULT 0,
            fill_rate REAL NOT NULL DEFAULT 0,
            dynamic_status TEXT NOT NULL DEFAULT '',
            tender_id TEXT NOT NULL DEFAULT '',
            tender_title TEXT NOT NULL DEFAULT '',
            unit_id TEXT NOT NULL DEFAULT '',
            unit_name TEXT NOT NULL DEFAULT '',
            orderer_id TEXT NOT NULL DEFAULT '',
            orderer_name TEXT NOT NULL DEFAULT '',
            last_application_date INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL DEFAULT 0,
            announced_at INTEGER NOT NULL DEFAULT 0,
            scraped_at INTEGER NOT NULL,
            first_seen_at INTEGER NOT NULL,
            last_updated_at INTEGER NOT NULL,
            raw_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Child rows from the detail query. Replaced wholesale per parent id.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vacancy_shifts (
            vacancy_id TEXT NOT NULL,
            shift_index INTEGER NOT NULL,
            starts_at INTEGER NOT NULL DEFAULT 0,
            ends_at INTEGER NOT NULL DEFAULT 0,
            shift_type TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (vacancy_id, shift_index),
            FOREIGN KEY (vacancy_id) REFERENCES vacancies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vacancy_requirements (
            vacancy_id TEXT NOT NULL,
            req_index INTEGER NOT NULL,
            kind TEXT NOT NULL DEFAULT '',
            value TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (vacancy_id, req_index),
            FOREIGN KEY (vacancy_id) REFERENCES vacancies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vacancy_pricing (
            vacancy_id TEXT NOT NULL,
            price_index INTEGER NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            amount REAL NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT 'SEK',
            PRIMARY KEY (vacancy_id, price_index),
            FOREIGN KEY (vacancy_id) REFERENCES vacancies(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row appended per orchestrated run; immutable once written.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scrape_history (
            id TEXT PRIMARY KEY,
            started_at INTEGER NOT NULL,
            duration_seconds REAL NOT NULL DEFAULT 0,
            total_fetched INTEGER NOT NULL DEFAULT 0,
            new_count INTEGER NOT NULL DEFAULT 0,
            updated_count INTEGER NOT NULL DEFAULT 0,
            unchanged_count INTEGER NOT NULL DEFAULT 0,
            errors TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vacancies_profession ON vacancies(profession)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vacancies_region ON vacancies(region)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vacancies_created_at ON vacancies(created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scrape_history_started ON scrape_history(started_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
