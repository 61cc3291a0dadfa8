//! Change classification against the persisted snapshot.
//!
//! Only the volatile fields are compared. Stable descriptive fields are
//! assumed immutable by the source and are not diffed, though the raw
//! payload is refreshed harmlessly on every update write. Reconciliation
//! is idempotent: the same record twice with no intervening change yields
//! `Unchanged` the second time.

use anyhow::Result;

use crate::models::Vacancy;
use crate::store::SnapshotStore;

/// How one fetched record relates to its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Never seen before; a full row was written.
    New,
    /// Volatile fields differ; lists exactly the fields that changed, in
    /// the fixed order fill_rate, dynamic_status, procured_amount.
    Updated(Vec<String>),
    /// Nothing to do; no write occurred.
    Unchanged,
}

/// Classify `vacancy` against the store and persist accordingly.
pub async fn reconcile(
    store: &dyn SnapshotStore,
    vacancy: &Vacancy,
    now: i64,
) -> Result<Outcome> {
    let Some(snapshot) = store.volatile_snapshot(&vacancy.id).await? else {
        store.insert_vacancy(vacancy, now).await?;
        return Ok(Outcome::New);
    };

    let mut changed = Vec::new();
    if snapshot.fill_rate != vacancy.fill_rate {
        changed.push("fill_rate".to_string());
    }
    if snapshot.dynamic_status != vacancy.dynamic_status {
        changed.push("dynamic_status".to_string());
    }
    if snapshot.procured_amount != vacancy.procured_amount {
        changed.push("procured_amount".to_string());
    }

    if changed.is_empty() {
        return Ok(Outcome::Unchanged);
    }

    store.update_volatile(vacancy, now).await?;
    Ok(Outcome::Updated(changed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn vacancy(id: &str, fill_rate: f64, status: &str, amount: f64) -> Vacancy {
        Vacancy::from_node(&json!({
            "id": id,
            "title": "Ward nurse",
            "profession": "NURSE",
            "procuredAmount": amount,
            "tender": {"fillRate": fill_rate, "dynamicStatus": status},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_id_is_new_then_unchanged() {
        let store = InMemoryStore::new();
        let v = vacancy("vac-1", 0.5, "OPEN", 500.0);

        assert_eq!(reconcile(&store, &v, 1000).await.unwrap(), Outcome::New);
        // identical record again: idempotent, never New twice
        assert_eq!(
            reconcile(&store, &v, 2000).await.unwrap(),
            Outcome::Unchanged
        );
    }

    #[tokio::test]
    async fn fill_rate_change_lists_exactly_that_field() {
        let store = InMemoryStore::new();
        reconcile(&store, &vacancy("vac-1", 0.5, "OPEN", 500.0), 1000)
            .await
            .unwrap();

        let outcome = reconcile(&store, &vacancy("vac-1", 0.8, "OPEN", 500.0), 2000)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Updated(vec!["fill_rate".to_string()]));
    }

    #[tokio::test]
    async fn multiple_changes_report_in_fixed_order() {
        let store = InMemoryStore::new();
        reconcile(&store, &vacancy("vac-1", 0.5, "OPEN", 500.0), 1000)
            .await
            .unwrap();

        let outcome = reconcile(&store, &vacancy("vac-1", 0.9, "FILLED", 520.0), 2000)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Updated(vec![
                "fill_rate".to_string(),
                "dynamic_status".to_string(),
                "procured_amount".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn update_never_touches_first_seen() {
        let store = InMemoryStore::new();
        reconcile(&store, &vacancy("vac-1", 0.5, "OPEN", 500.0), 1000)
            .await
            .unwrap();
        reconcile(&store, &vacancy("vac-1", 0.8, "OPEN", 500.0), 2000)
            .await
            .unwrap();

        let row = store.row("vac-1").unwrap();
        assert_eq!(row.first_seen_at, 1000);
        assert_eq!(row.last_updated_at, 2000);
        assert_eq!(row.vacancy.fill_rate, 0.8);
    }

    #[tokio::test]
    async fn unchanged_never_touches_last_updated() {
        let store = InMemoryStore::new();
        let v = vacancy("vac-1", 0.5, "OPEN", 500.0);
        reconcile(&store, &v, 1000).await.unwrap();
        reconcile(&store, &v, 5000).await.unwrap();

        let row = store.row("vac-1").unwrap();
        assert_eq!(row.last_updated_at, 1000);
        assert_eq!(row.first_seen_at, 1000);
    }

    #[tokio::test]
    async fn stable_field_changes_are_not_detected() {
        let store = InMemoryStore::new();
        let v = vacancy("vac-1", 0.5, "OPEN", 500.0);
        reconcile(&store, &v, 1000).await.unwrap();

        let mut retitled = v.clone();
        retitled.title = "Completely new title".into();
        retitled.raw_json = r#"{"id":"vac-1","title":"Completely new title"}"#.into();
        // title is a stable field; it does not drive classification
        assert_eq!(
            reconcile(&store, &retitled, 2000).await.unwrap(),
            Outcome::Unchanged
        );
    }
}
