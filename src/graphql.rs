//! Authenticated GraphQL transport.
//!
//! One retry policy lives here and nowhere else: a 401 forces a token
//! refresh and the operation is re-sent exactly once. A second 401 fails
//! the call. Every other non-success status fails immediately, and a
//! GraphQL-level `errors` array on a 200 is surfaced as its own failure
//! kind so callers can tell a bad query from a broken connection.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthSession;
use crate::config::SourceConfig;
use crate::error::Error;

/// List query: cursor-paged vacancies, newest first, presentable tenders
/// only.
pub const VACANCIES_QUERY: &str = r#"
query VacanciesList($afterCursor: String, $filter: VacancyFilter!, $orderBy: VacancyOrderBy!, $orderDir: OrderByDirection!, $take: Int!) {
  allVacancies(
    afterCursor: $afterCursor
    filter: $filter
    orderBy: $orderBy
    orderDir: $orderDir
    take: $take
  ) {
    pageInfo {
      hasNextPage
      endCursor
    }
    edges {
      node {
        id
        title
        profession
        specializations
        municipality
        region
        jobType
        jobStartsAt
        jobEndsAt
        lastApplicationDate
        createdAt
        procuredAmount
        procuredAmountCurrency
        tender {
          id
          title
          announcedAt
          scope
          fillRate
          dynamicStatus
          unit {
            id
            name
            municipality
          }
          orderer {
            id
            displayName
          }
        }
      }
    }
  }
}
"#;

/// Detail query: one vacancy with its schedule, requirement, and pricing
/// rows.
pub const VACANCY_DETAIL_QUERY: &str = r#"
query VacancyDetail($id: ID!) {
  vacancy(id: $id) {
    id
    title
    shifts {
      startsAt
      endsAt
      shiftType
    }
    requirements {
      kind
      value
    }
    pricing {
      label
      amount
      currency
    }
  }
}
"#;

pub fn list_variables(page_size: i64, after_cursor: Option<&str>) -> Value {
    let mut variables = json!({
        "filter": {
            "AND": [
                {"tender": {"doesAcceptPresentations": true}},
                {}
            ]
        },
        "take": page_size,
        "orderBy": "CREATED_AT",
        "orderDir": "DESC",
    });
    if let Some(cursor) = after_cursor {
        variables["afterCursor"] = json!(cursor);
    }
    variables
}

pub fn detail_variables(id: &str) -> Value {
    json!({ "id": id })
}

/// GraphQL client bound to one [`AuthSession`].
pub struct GraphQlClient {
    http: reqwest::Client,
    source: SourceConfig,
    auth: Arc<AuthSession>,
}

impl GraphQlClient {
    pub fn new(source: SourceConfig, auth: Arc<AuthSession>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(source.timeout_secs))
            .build()?;
        Ok(GraphQlClient { http, source, auth })
    }

    /// Execute one operation and return its `data` object.
    pub async fn execute(
        &self,
        operation_name: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, Error> {
        let payload = json!({
            "operationName": operation_name,
            "query": query,
            "variables": variables,
        });

        let mut refreshed = false;
        loop {
            let token = if refreshed {
                self.auth.refresh().await?.access_token
            } else {
                self.auth.valid_token().await?
            };

            let resp = self
                .http
                .post(&self.source.graphql_url)
                .header("Authorization", format!("Bearer {}", token))
                .header("Origin", &self.source.origin)
                .header("Referer", format!("{}/", self.source.origin))
                .header("st-auth-mode", "header")
                .json(&payload)
                .send()
                .await?;

            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(Error::Auth(format!(
                        "{}: still unauthorized after refresh",
                        operation_name
                    )));
                }
                tracing::info!(operation = operation_name, "401, refreshing token and retrying");
                refreshed = true;
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Transport(format!(
                    "{} returned {}: {}",
                    operation_name, status, text
                )));
            }

            let body: Value = resp
                .json()
                .await
                .map_err(|e| Error::Transport(format!("{}: bad body: {}", operation_name, e)))?;

            if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
                return Err(Error::RemoteQuery(errors.clone()));
            }

            return Ok(body.get("data").cloned().unwrap_or(Value::Null));
        }
    }
}
