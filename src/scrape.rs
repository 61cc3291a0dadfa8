//! Orchestrated scrape run: fetch all pages, reconcile each record,
//! refresh detail rows for anything new or changed, record the run.
//!
//! The pipeline is sequential by design — one page, then one record at a
//! time. A page-level failure aborts the run (writes already made stand,
//! reconciliation is per-record, not one big transaction); a detail-fetch
//! failure only costs that record its child rows.

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{ScrapeRun, Vacancy};
use crate::pages::{self, VacancySource};
use crate::reconcile::{self, Outcome};
use crate::store::SnapshotStore;

/// Cap on the newly-seen list in a run summary.
const NEW_LIST_CAP: usize = 25;
/// Cap on the changed list in a run summary.
const UPDATE_LIST_CAP: usize = 10;

/// Short form of a newly-seen vacancy for run summaries and notifications.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NewVacancy {
    pub id: String,
    pub title: String,
    pub profession: String,
    pub municipality: String,
    pub region: String,
    pub procured_amount: f64,
    pub unit_name: String,
    pub orderer_name: String,
}

impl NewVacancy {
    fn from_vacancy(v: &Vacancy) -> Self {
        NewVacancy {
            id: v.id.clone(),
            title: v.title.clone(),
            profession: v.profession.clone(),
            municipality: v.municipality.clone(),
            region: v.region.clone(),
            procured_amount: v.procured_amount,
            unit_name: v.unit_name.clone(),
            orderer_name: v.orderer_name.clone(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdatedVacancy {
    pub id: String,
    pub title: String,
    pub changes: Vec<String>,
}

/// What `POST /scrape` and `vh scrape` hand back: the run row plus capped
/// lists of what appeared and what moved.
#[derive(Debug, serde::Serialize)]
pub struct ScrapeReport {
    #[serde(flatten)]
    pub run: ScrapeRun,
    pub new_vacancies: Vec<NewVacancy>,
    pub updates: Vec<UpdatedVacancy>,
}

/// Execute one full run against `source`, persisting through `store`.
///
/// Always appends a run row, including on failure — a failed run is
/// recorded with its error message and whatever counts were reached.
pub async fn run_scrape(
    source: &dyn VacancySource,
    store: &dyn SnapshotStore,
    max_pages: usize,
) -> Result<ScrapeReport> {
    let started = Utc::now();
    let mut run = ScrapeRun::started(Uuid::new_v4().to_string(), started);
    let mut new_vacancies = Vec::new();
    let mut updates = Vec::new();

    tracing::info!(run_id = %run.id, "scrape run started");

    let fetched = match pages::fetch_all(source, max_pages).await {
        Ok(items) => items,
        Err(err) => {
            tracing::error!(run_id = %run.id, error = %err, "page fetch failed, aborting run");
            run.errors = Some(err.to_string());
            run.duration_seconds = elapsed_seconds(started);
            store.append_run(&run).await?;
            return Ok(ScrapeReport {
                run,
                new_vacancies,
                updates,
            });
        }
    };
    run.total_fetched = fetched.len() as i64;

    for vacancy in &fetched {
        let now = Utc::now().timestamp();
        let outcome = match reconcile::reconcile(store, vacancy, now).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(run_id = %run.id, id = %vacancy.id, error = %err, "reconcile failed, aborting run");
                run.errors = Some(format!("reconcile {}: {}", vacancy.id, err));
                break;
            }
        };

        match outcome {
            Outcome::New => {
                run.new_count += 1;
                if new_vacancies.len() < NEW_LIST_CAP {
                    new_vacancies.push(NewVacancy::from_vacancy(vacancy));
                }
                refresh_detail(source, store, &vacancy.id).await;
            }
            Outcome::Updated(changes) => {
                run.updated_count += 1;
                if updates.len() < UPDATE_LIST_CAP {
                    updates.push(UpdatedVacancy {
                        id: vacancy.id.clone(),
                        title: vacancy.title.clone(),
                        changes,
                    });
                }
                refresh_detail(source, store, &vacancy.id).await;
            }
            Outcome::Unchanged => {
                run.unchanged_count += 1;
            }
        }
    }

    run.duration_seconds = elapsed_seconds(started);
    store.append_run(&run).await?;

    tracing::info!(
        run_id = %run.id,
        total = run.total_fetched,
        new = run.new_count,
        updated = run.updated_count,
        unchanged = run.unchanged_count,
        "scrape run finished"
    );

    Ok(ScrapeReport {
        run,
        new_vacancies,
        updates,
    })
}

/// Best-effort detail refresh. Failures are logged and skipped; they never
/// abort the run.
async fn refresh_detail(source: &dyn VacancySource, store: &dyn SnapshotStore, id: &str) {
    match source.fetch_detail(id).await {
        Ok(Some(detail)) => {
            if let Err(err) = store.replace_detail(id, &detail).await {
                tracing::warn!(id, error = %err, "failed to store detail rows");
            }
        }
        Ok(None) => {
            tracing::debug!(id, "source has no detail for record");
        }
        Err(err) => {
            tracing::warn!(id, error = %err, "detail fetch failed, skipping");
        }
    }
}

fn elapsed_seconds(started: chrono::DateTime<Utc>) -> f64 {
    (Utc::now() - started).num_milliseconds() as f64 / 1000.0
}
