//! Snapshot database statistics.
//!
//! One gather pass feeds both `vh stats` (table printer) and the server's
//! `GET /stats` (JSON body): totals, per-profession and per-region
//! breakdowns, average procured rates for the two big professions, and
//! the most recent runs.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::models::ScrapeRun;
use crate::store;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub total_vacancies: i64,
    pub by_profession: Vec<CountRow>,
    pub by_region: Vec<CountRow>,
    pub avg_doctor_rate: f64,
    pub avg_nurse_rate: f64,
    pub recent_runs: Vec<ScrapeRun>,
}

#[derive(Debug, Serialize)]
pub struct CountRow {
    pub key: String,
    pub count: i64,
}

pub async fn gather_stats(pool: &SqlitePool) -> Result<StatsReport> {
    let total_vacancies: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vacancies")
        .fetch_one(pool)
        .await?;

    let by_profession = count_rows(
        pool,
        "SELECT profession AS key, COUNT(*) AS count FROM vacancies \
         GROUP BY profession ORDER BY count DESC",
    )
    .await?;

    let by_region = count_rows(
        pool,
        "SELECT region AS key, COUNT(*) AS count FROM vacancies \
         GROUP BY region ORDER BY count DESC LIMIT 10",
    )
    .await?;

    let avg_doctor_rate = avg_rate(pool, "DOCTOR").await?;
    let avg_nurse_rate = avg_rate(pool, "NURSE").await?;

    let recent_runs = store::recent_runs(pool, 5).await?;

    Ok(StatsReport {
        total_vacancies,
        by_profession,
        by_region,
        avg_doctor_rate,
        avg_nurse_rate,
        recent_runs,
    })
}

async fn count_rows(pool: &SqlitePool, sql: &str) -> Result<Vec<CountRow>> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|r| CountRow {
            key: r.get("key"),
            count: r.get("count"),
        })
        .collect())
}

async fn avg_rate(pool: &SqlitePool, profession: &str) -> Result<f64> {
    let avg: Option<f64> =
        sqlx::query_scalar("SELECT AVG(procured_amount) FROM vacancies WHERE profession = ?")
            .bind(profession)
            .fetch_one(pool)
            .await?;
    Ok(avg.unwrap_or(0.0))
}

/// Print the report for terminal use.
pub fn print_stats(report: &StatsReport) {
    println!("Vacancy Harvester — Database Stats");
    println!("==================================");
    println!();
    println!("  Vacancies:       {}", report.total_vacancies);
    println!("  Avg doctor rate: {:.0}", report.avg_doctor_rate);
    println!("  Avg nurse rate:  {:.0}", report.avg_nurse_rate);

    if !report.by_profession.is_empty() {
        println!();
        println!("  By profession:");
        for row in &report.by_profession {
            println!("  {:<24} {:>6}", row.key, row.count);
        }
    }

    if !report.by_region.is_empty() {
        println!();
        println!("  By region:");
        for row in &report.by_region {
            println!("  {:<24} {:>6}", row.key, row.count);
        }
    }

    if !report.recent_runs.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:<20} {:>7} {:>5} {:>8} {:>10}   {}",
            "STARTED", "FETCHED", "NEW", "UPDATED", "UNCHANGED", "ERRORS"
        );
        for run in &report.recent_runs {
            println!(
                "  {:<20} {:>7} {:>5} {:>8} {:>10}   {}",
                format_ts(run.started_at),
                run.total_fetched,
                run.new_count,
                run.updated_count,
                run.unchanged_count,
                run.errors.as_deref().unwrap_or("-"),
            );
        }
    }

    println!();
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
