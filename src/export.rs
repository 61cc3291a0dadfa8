//! CSV export of the stored vacancies, newest first.

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

use crate::store;

const COLUMNS: [&str; 18] = [
    "id",
    "title",
    "profession",
    "specializations",
    "municipality",
    "region",
    "job_starts_at",
    "job_ends_at",
    "procured_amount",
    "procured_amount_currency",
    "scope_hours",
    "fill_rate",
    "dynamic_status",
    "unit_name",
    "orderer_name",
    "last_application_date",
    "created_at",
    "first_seen_at",
];

/// Render every stored vacancy as CSV bytes (header row included).
pub async fn csv_bytes(pool: &SqlitePool) -> Result<Vec<u8>> {
    let vacancies = store::list_vacancies(pool, i64::MAX, None).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;

    for v in &vacancies {
        writer.write_record([
            v.id.as_str(),
            v.title.as_str(),
            v.profession.as_str(),
            v.specializations.as_str(),
            v.municipality.as_str(),
            v.region.as_str(),
            &v.job_starts_at.to_string(),
            &v.job_ends_at.to_string(),
            &v.procured_amount.to_string(),
            v.procured_amount_currency.as_str(),
            &v.scope_hours.to_string(),
            &v.fill_rate.to_string(),
            v.dynamic_status.as_str(),
            v.unit_name.as_str(),
            v.orderer_name.as_str(),
            &v.last_application_date.to_string(),
            &v.created_at.to_string(),
            &v.first_seen_at.to_string(),
        ])?;
    }

    let bytes = writer.into_inner()?;
    Ok(bytes)
}

/// Export as CSV to a file, or to stdout when `output` is `None`.
pub async fn run_export(pool: &SqlitePool, output: Option<&Path>) -> Result<()> {
    let bytes = csv_bytes(pool).await?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &bytes)?;
            eprintln!("Exported {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            print!("{}", String::from_utf8_lossy(&bytes));
        }
    }

    Ok(())
}
