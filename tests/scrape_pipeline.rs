//! End-to-end orchestration over a scripted source and the in-memory
//! store: run accounting, idempotence, detail replacement, and failure
//! recording.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use vacancy_harvester::error::Error;
use vacancy_harvester::models::{Page, ShiftRow, Vacancy, VacancyDetail};
use vacancy_harvester::pages::VacancySource;
use vacancy_harvester::scrape::run_scrape;
use vacancy_harvester::store::InMemoryStore;

fn vac(id: &str, fill_rate: f64) -> Vacancy {
    Vacancy::from_node(&json!({
        "id": id,
        "title": format!("Vacancy {}", id),
        "profession": "NURSE",
        "municipality": "Umeå",
        "procuredAmount": 500.0,
        "tender": {"fillRate": fill_rate, "dynamicStatus": "OPEN"},
    }))
    .unwrap()
}

/// Pages handed out by index; cursors are stringified page indices.
struct ScriptedSource {
    pages: Vec<Vec<Vacancy>>,
    fail_page: Option<usize>,
    detail_calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(pages: Vec<Vec<Vacancy>>) -> Self {
        ScriptedSource {
            pages,
            fail_page: None,
            detail_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VacancySource for ScriptedSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, Error> {
        let idx = match cursor {
            None => 0,
            Some(c) => c.parse::<usize>().unwrap() + 1,
        };
        if self.fail_page == Some(idx) {
            return Err(Error::Transport("connection reset by peer".into()));
        }
        let items = self.pages[idx].clone();
        let has_next = idx + 1 < self.pages.len();
        Ok(Page {
            items,
            has_next,
            end_cursor: has_next.then(|| idx.to_string()),
        })
    }

    async fn fetch_detail(&self, _id: &str) -> Result<Option<VacancyDetail>, Error> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(VacancyDetail {
            shifts: vec![ShiftRow {
                starts_at: 100,
                ends_at: 200,
                shift_type: "DAY".into(),
            }],
            requirements: vec![],
            pricing: vec![],
        }))
    }
}

#[tokio::test]
async fn first_run_classifies_everything_as_new() {
    let source = ScriptedSource::new(vec![
        vec![vac("a", 0.1), vac("b", 0.2)],
        vec![vac("c", 0.3)],
    ]);
    let store = InMemoryStore::new();

    let report = run_scrape(&source, &store, 20).await.unwrap();

    assert_eq!(report.run.total_fetched, 3);
    assert_eq!(report.run.new_count, 3);
    assert_eq!(report.run.updated_count, 0);
    assert_eq!(report.run.unchanged_count, 0);
    assert!(report.run.errors.is_none());
    assert_eq!(report.new_vacancies.len(), 3);
    assert_eq!(report.new_vacancies[0].id, "a");

    // detail rows were fetched and stored for every new record
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.detail("b").unwrap().shifts.len(), 1);

    // exactly one run row, counts consistent
    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(
        runs[0].new_count + runs[0].updated_count + runs[0].unchanged_count,
        runs[0].total_fetched
    );
}

#[tokio::test]
async fn second_identical_run_is_all_unchanged() {
    let pages = vec![vec![vac("a", 0.1), vac("b", 0.2)]];
    let store = InMemoryStore::new();

    let source = ScriptedSource::new(pages.clone());
    run_scrape(&source, &store, 20).await.unwrap();

    let source = ScriptedSource::new(pages);
    let report = run_scrape(&source, &store, 20).await.unwrap();

    assert_eq!(report.run.new_count, 0);
    assert_eq!(report.run.unchanged_count, 2);
    assert!(report.new_vacancies.is_empty());
    // unchanged records get no detail refresh
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.runs().len(), 2);
}

#[tokio::test]
async fn changed_volatile_field_is_reported_with_its_name() {
    let store = InMemoryStore::new();

    let source = ScriptedSource::new(vec![vec![vac("a", 0.5)]]);
    run_scrape(&source, &store, 20).await.unwrap();
    let first_seen = store.row("a").unwrap().first_seen_at;

    let source = ScriptedSource::new(vec![vec![vac("a", 0.8)]]);
    let report = run_scrape(&source, &store, 20).await.unwrap();

    assert_eq!(report.run.updated_count, 1);
    assert_eq!(report.updates.len(), 1);
    assert_eq!(report.updates[0].id, "a");
    assert_eq!(report.updates[0].changes, vec!["fill_rate".to_string()]);

    let row = store.row("a").unwrap();
    assert_eq!(row.vacancy.fill_rate, 0.8);
    assert_eq!(row.first_seen_at, first_seen);
    // updated records get their detail refreshed
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_failure_records_the_error_and_still_appends_a_run() {
    let mut source = ScriptedSource::new(vec![
        vec![vac("a", 0.1)],
        vec![vac("b", 0.2)],
    ]);
    source.fail_page = Some(1);
    let store = InMemoryStore::new();

    let report = run_scrape(&source, &store, 20).await.unwrap();

    assert!(report.run.errors.as_deref().unwrap().contains("connection reset"));
    assert_eq!(report.run.total_fetched, 0);
    assert_eq!(report.run.new_count, 0);

    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].errors.is_some());
}

#[tokio::test]
async fn traversal_respects_the_page_cap() {
    // 5 pages available, cap at 2
    let source = ScriptedSource::new(vec![
        vec![vac("a", 0.1)],
        vec![vac("b", 0.1)],
        vec![vac("c", 0.1)],
        vec![vac("d", 0.1)],
        vec![vac("e", 0.1)],
    ]);
    let store = InMemoryStore::new();

    let report = run_scrape(&source, &store, 2).await.unwrap();
    assert_eq!(report.run.total_fetched, 2);
    assert_eq!(report.run.new_count, 2);
}

/// A source whose detail endpoint always fails.
struct BrokenDetailSource(ScriptedSource);

#[async_trait]
impl VacancySource for BrokenDetailSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, Error> {
        self.0.fetch_page(cursor).await
    }

    async fn fetch_detail(&self, _id: &str) -> Result<Option<VacancyDetail>, Error> {
        Err(Error::Transport("detail endpoint down".into()))
    }
}

#[tokio::test]
async fn detail_failures_do_not_abort_the_run() {
    let source = BrokenDetailSource(ScriptedSource::new(vec![vec![
        vac("a", 0.1),
        vac("b", 0.2),
    ]]));
    let store = InMemoryStore::new();

    let report = run_scrape(&source, &store, 20).await.unwrap();

    // both records landed despite every detail fetch failing
    assert_eq!(report.run.new_count, 2);
    assert!(report.run.errors.is_none());
    assert!(store.detail("a").is_none());
    assert!(store.row("a").is_some());
}
