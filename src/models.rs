//! Core data types flowing through the scrape pipeline.
//!
//! A [`Vacancy`] is the flat projection of one GraphQL list node. Its
//! volatile fields (fill rate, status, procured amount) drive change
//! detection; everything else is descriptive and written as-is.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Flattened vacancy record as fetched from the list query.
#[derive(Debug, Clone, Serialize)]
pub struct Vacancy {
    pub id: String,
    pub title: String,
    pub profession: String,
    /// JSON array text, stored verbatim.
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
    pub unit_id: String,
    pub unit_name: String,
    pub orderer_id: String,
    pub orderer_name: String,
    pub last_application_date: i64,
    pub created_at: i64,
    pub announced_at: i64,
    /// Raw list node, kept for later reprocessing.
    pub raw_json: String,
}

impl Vacancy {
    /// Flatten a raw GraphQL list node. Only `id` is required; every other
    /// field falls back to an empty/zero default, matching what the source
    /// actually omits for draft tenders.
    pub fn from_node(node: &Value) -> Result<Self, Error> {
        let id = node
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode("vacancy node missing id".into()))?
            .to_string();

        let tender = node.get("tender").cloned().unwrap_or(Value::Null);
        let unit = tender.get("unit").cloned().unwrap_or(Value::Null);
        let orderer = tender.get("orderer").cloned().unwrap_or(Value::Null);

        Ok(Vacancy {
            id,
            title: str_field(node, "title"),
            profession: str_field(node, "profession"),
            specializations: node
                .get("specializations")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "[]".to_string()),
            municipality: str_field(node, "municipality"),
            region: str_field(node, "region"),
            job_starts_at: ts_field(node, "jobStartsAt"),
            job_ends_at: ts_field(node, "jobEndsAt"),
            procured_amount: num_field(node, "procuredAmount"),
            procured_amount_currency: node
                .get("procuredAmountCurrency")
                .and_then(Value::as_str)
                .unwrap_or("SEK")
                .to_string(),
            scope_hours: num_field(&tender, "scope"),
            fill_rate: num_field(&tender, "fillRate"),
            dynamic_status: str_field(&tender, "dynamicStatus"),
            tender_id: str_field(&tender, "id"),
            tender_title: str_field(&tender, "title"),
            unit_id: str_field(&unit, "id"),
            unit_name: str_field(&unit, "name"),
            orderer_id: str_field(&orderer, "id"),
            orderer_name: str_field(&orderer, "displayName"),
            last_application_date: ts_field(node, "lastApplicationDate"),
            created_at: ts_field(node, "createdAt"),
            announced_at: ts_field(&tender, "announcedAt"),
            raw_json: node.to_string(),
        })
    }
}

fn str_field(node: &Value, key: &str) -> String {
    node.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn num_field(node: &Value, key: &str) -> f64 {
    node.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// The source is inconsistent about date encoding: epoch numbers in some
/// query variants, RFC 3339 strings in others. Accept both; anything else
/// is zero.
fn ts_field(node: &Value, key: &str) -> i64 {
    match node.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp())
            .unwrap_or(0),
        _ => 0,
    }
}

/// One page of the list query, in source order.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Vacancy>,
    pub has_next: bool,
    pub end_cursor: Option<String>,
}

/// Full record for one vacancy id, with child collections. Child rows are
/// replaced wholesale on every detail fetch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VacancyDetail {
    pub shifts: Vec<ShiftRow>,
    pub requirements: Vec<RequirementRow>,
    pub pricing: Vec<PricingRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShiftRow {
    pub starts_at: i64,
    pub ends_at: i64,
    pub shift_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementRow {
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingRow {
    pub label: String,
    pub amount: f64,
    pub currency: String,
}

impl VacancyDetail {
    /// Parse the detail query's entity node. Missing collections are empty,
    /// not errors — older tenders predate the schedule feature.
    pub fn from_node(node: &Value) -> Self {
        let shifts = node
            .get("shifts")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| ShiftRow {
                        starts_at: ts_field(row, "startsAt"),
                        ends_at: ts_field(row, "endsAt"),
                        shift_type: str_field(row, "shiftType"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let requirements = node
            .get("requirements")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| RequirementRow {
                        kind: str_field(row, "kind"),
                        value: str_field(row, "value"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let pricing = node
            .get("pricing")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|row| PricingRow {
                        label: str_field(row, "label"),
                        amount: num_field(row, "amount"),
                        currency: row
                            .get("currency")
                            .and_then(Value::as_str)
                            .unwrap_or("SEK")
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        VacancyDetail {
            shifts,
            requirements,
            pricing,
        }
    }
}

/// Accounting for one orchestrated run. Appended to `scrape_history` and
/// never modified afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRun {
    pub id: String,
    pub started_at: i64,
    pub duration_seconds: f64,
    pub total_fetched: i64,
    pub new_count: i64,
    pub updated_count: i64,
    pub unchanged_count: i64,
    pub errors: Option<String>,
}

impl ScrapeRun {
    pub fn started(id: String, started_at: DateTime<Utc>) -> Self {
        ScrapeRun {
            id,
            started_at: started_at.timestamp(),
            duration_seconds: 0.0,
            total_fetched: 0,
            new_count: 0,
            updated_count: 0,
            unchanged_count: 0,
            errors: None,
        }
    }
}
