//! Cursor-based pagination over the vacancy list.
//!
//! [`VacancySource`] is the seam between the network and the pipeline:
//! the GraphQL-backed implementation lives here, tests substitute fakes.
//! Traversal preserves source order (created-at descending) and does not
//! deduplicate — the same id can legitimately reappear across pages when
//! records are inserted upstream mid-traversal, and dedup by id is the
//! reconciler's job.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::graphql::{
    self, GraphQlClient, VACANCIES_QUERY, VACANCY_DETAIL_QUERY,
};
use crate::models::{Page, Vacancy, VacancyDetail};

/// Where vacancy pages and details come from.
#[async_trait]
pub trait VacancySource: Send + Sync {
    /// Fetch one page; `None` cursor means start from the beginning.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, Error>;

    /// Fetch the full record for one id. `Ok(None)` means the source no
    /// longer knows the id.
    async fn fetch_detail(&self, id: &str) -> Result<Option<VacancyDetail>, Error>;
}

/// Walk the collection end-to-end, stopping when the source reports no
/// next page or after `max_pages` pages. The cap bounds worst-case
/// traversal cost even against a source that never stops reporting
/// `hasNextPage`.
pub async fn fetch_all(
    source: &dyn VacancySource,
    max_pages: usize,
) -> Result<Vec<Vacancy>, Error> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    while pages < max_pages {
        let page = source.fetch_page(cursor.as_deref()).await?;
        tracing::debug!(page = pages + 1, items = page.items.len(), "fetched page");
        all.extend(page.items);
        pages += 1;

        if !page.has_next {
            break;
        }
        cursor = page.end_cursor;
    }

    tracing::info!(vacancies = all.len(), pages, "pagination complete");
    Ok(all)
}

/// GraphQL-backed [`VacancySource`].
pub struct GraphQlSource {
    client: GraphQlClient,
    page_size: i64,
}

impl GraphQlSource {
    pub fn new(client: GraphQlClient, page_size: i64) -> Self {
        GraphQlSource { client, page_size }
    }
}

#[async_trait]
impl VacancySource for GraphQlSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, Error> {
        let data = self
            .client
            .execute(
                "VacanciesList",
                VACANCIES_QUERY,
                graphql::list_variables(self.page_size, cursor),
            )
            .await?;
        parse_page(&data)
    }

    async fn fetch_detail(&self, id: &str) -> Result<Option<VacancyDetail>, Error> {
        let data = self
            .client
            .execute(
                "VacancyDetail",
                VACANCY_DETAIL_QUERY,
                graphql::detail_variables(id),
            )
            .await?;
        match data.get("vacancy") {
            Some(node) if !node.is_null() => Ok(Some(VacancyDetail::from_node(node))),
            _ => Ok(None),
        }
    }
}

/// Parse `{ allVacancies: { pageInfo, edges } }` into a [`Page`].
pub fn parse_page(data: &Value) -> Result<Page, Error> {
    let connection = data
        .get("allVacancies")
        .ok_or_else(|| Error::Decode("response has no allVacancies field".into()))?;

    let page_info = connection.get("pageInfo").cloned().unwrap_or(Value::Null);
    let has_next = page_info
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let end_cursor = page_info
        .get("endCursor")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut items = Vec::new();
    if let Some(edges) = connection.get("edges").and_then(Value::as_array) {
        for edge in edges {
            let Some(node) = edge.get("node") else {
                continue;
            };
            items.push(Vacancy::from_node(node)?);
        }
    }

    Ok(Page {
        items,
        has_next,
        end_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page_json(ids: &[&str], has_next: bool, cursor: Option<&str>) -> Value {
        json!({
            "allVacancies": {
                "pageInfo": {"hasNextPage": has_next, "endCursor": cursor},
                "edges": ids.iter().map(|id| json!({"node": {"id": id}})).collect::<Vec<_>>(),
            }
        })
    }

    #[test]
    fn parses_a_page_in_source_order() {
        let page = parse_page(&page_json(&["a", "b", "c"], true, Some("cur-1"))).unwrap();
        let ids: Vec<&str> = page.items.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(page.has_next);
        assert_eq!(page.end_cursor.as_deref(), Some("cur-1"));
    }

    #[test]
    fn missing_page_info_terminates_traversal() {
        let page = parse_page(&json!({"allVacancies": {"edges": []}})).unwrap();
        assert!(!page.has_next);
        assert!(page.end_cursor.is_none());
    }

    #[test]
    fn unexpected_shape_is_a_decode_error() {
        assert!(matches!(
            parse_page(&json!({"somethingElse": {}})),
            Err(Error::Decode(_))
        ));
    }

    /// A source that always reports another page.
    struct EndlessSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VacancySource for EndlessSource {
        async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // cursor must be absent on the first call and echoed afterwards
            if n == 0 {
                assert!(cursor.is_none());
            } else {
                assert_eq!(cursor, Some(format!("cur-{}", n - 1).as_str()));
            }
            Ok(Page {
                items: vec![Vacancy::from_node(&json!({"id": format!("vac-{}", n)})).unwrap()],
                has_next: true,
                end_cursor: Some(format!("cur-{}", n)),
            })
        }

        async fn fetch_detail(&self, _id: &str) -> Result<Option<VacancyDetail>, Error> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn fetch_all_stops_at_the_page_cap() {
        let source = EndlessSource {
            calls: AtomicUsize::new(0),
        };
        let all = fetch_all(&source, 5).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(source.calls.load(Ordering::SeqCst), 5);
    }

    /// Two pages then done.
    struct TwoPageSource;

    #[async_trait]
    impl VacancySource for TwoPageSource {
        async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page, Error> {
            match cursor {
                None => Ok(Page {
                    items: vec![Vacancy::from_node(&json!({"id": "a"})).unwrap()],
                    has_next: true,
                    end_cursor: Some("cur-a".into()),
                }),
                Some("cur-a") => Ok(Page {
                    items: vec![Vacancy::from_node(&json!({"id": "b"})).unwrap()],
                    has_next: false,
                    end_cursor: None,
                }),
                other => panic!("unexpected cursor {:?}", other),
            }
        }

        async fn fetch_detail(&self, _id: &str) -> Result<Option<VacancyDetail>, Error> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn fetch_all_stops_when_has_next_is_false() {
        let all = fetch_all(&TwoPageSource, 20).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }
}
