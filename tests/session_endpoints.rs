//! Session and transport scenarios against an in-process stub of the
//! identity and GraphQL endpoints: header-based token extraction, expiry
//! decoding, the refresh-falls-back-to-login rule, and the
//! exactly-one-401-retry policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::json;

use vacancy_harvester::auth::AuthSession;
use vacancy_harvester::config::{Credentials, SourceConfig};
use vacancy_harvester::error::Error;
use vacancy_harvester::graphql::GraphQlClient;
use vacancy_harvester::pages::{GraphQlSource, VacancySource};

/// Fixed expiry far in the future so tokens issued by the stub are fresh.
const TOKEN_EXP: i64 = 4102444800; // 2100-01-01
/// Expiry issued by the refresh endpoint, distinguishable from login's.
const REFRESHED_EXP: i64 = TOKEN_EXP + 600;

fn jwt_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"sub":"user-1"}}"#, exp));
    format!("{}.{}.stub-signature", header, payload)
}

#[derive(Clone, Copy, PartialEq)]
enum GraphqlMode {
    Ok,
    FailFirst401,
    Always401,
    ErrorsArray,
    ServerError,
}

#[derive(Clone)]
struct StubState {
    signin_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    graphql_calls: Arc<AtomicUsize>,
    graphql_mode: GraphqlMode,
}

impl StubState {
    fn new(graphql_mode: GraphqlMode) -> Self {
        StubState {
            signin_calls: Arc::new(AtomicUsize::new(0)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            graphql_calls: Arc::new(AtomicUsize::new(0)),
            graphql_mode,
        }
    }
}

async fn stub_signin(State(state): State<StubState>) -> impl IntoResponse {
    state.signin_calls.fetch_add(1, Ordering::SeqCst);
    let mut headers = HeaderMap::new();
    headers.insert("st-access-token", jwt_with_exp(TOKEN_EXP).parse().unwrap());
    headers.insert("st-refresh-token", "rt-login".parse().unwrap());
    headers.insert("front-token", "ft-login".parse().unwrap());
    (headers, Json(json!({"status": "OK"})))
}

/// Issues a new access token but omits the refresh and front token
/// headers — clients must keep their prior values.
async fn stub_refresh(State(state): State<StubState>) -> impl IntoResponse {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let mut headers = HeaderMap::new();
    headers.insert(
        "st-access-token",
        jwt_with_exp(REFRESHED_EXP).parse().unwrap(),
    );
    (headers, Json(json!({"status": "OK"})))
}

async fn stub_graphql(State(state): State<StubState>) -> impl IntoResponse {
    let call = state.graphql_calls.fetch_add(1, Ordering::SeqCst);
    match state.graphql_mode {
        GraphqlMode::Always401 => (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response(),
        GraphqlMode::FailFirst401 if call == 0 => {
            (StatusCode::UNAUTHORIZED, Json(json!({}))).into_response()
        }
        GraphqlMode::ErrorsArray => Json(json!({
            "errors": [{"message": "field does not exist"}]
        }))
        .into_response(),
        GraphqlMode::ServerError => {
            (StatusCode::BAD_GATEWAY, Json(json!({}))).into_response()
        }
        _ => Json(json!({
            "data": {
                "allVacancies": {
                    "pageInfo": {"hasNextPage": false, "endCursor": null},
                    "edges": [{"node": {
                        "id": "vac-1",
                        "title": "Night nurse",
                        "profession": "NURSE",
                        "tender": {"fillRate": 0.5, "dynamicStatus": "OPEN"},
                    }}],
                }
            }
        }))
        .into_response(),
    }
}

async fn spawn_stub(state: StubState) -> String {
    let app = Router::new()
        .route("/auth/signin", post(stub_signin))
        .route("/auth/session/refresh", post(stub_refresh))
        .route("/graphql", post(stub_graphql))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn source_config(base: &str) -> SourceConfig {
    SourceConfig {
        graphql_url: format!("{}/graphql", base),
        signin_url: format!("{}/auth/signin", base),
        refresh_url: format!("{}/auth/session/refresh", base),
        origin: "https://app.example.test".to_string(),
        timeout_secs: 5,
    }
}

fn credentials() -> Credentials {
    Credentials {
        email: "scraper@example.test".to_string(),
        password: "hunter2".to_string(),
    }
}

fn session(base: &str) -> AuthSession {
    AuthSession::new(source_config(base), credentials()).unwrap()
}

fn graphql_source(base: &str) -> GraphQlSource {
    let auth = Arc::new(session(base));
    let client = GraphQlClient::new(source_config(base), auth).unwrap();
    GraphQlSource::new(client, 30)
}

#[tokio::test]
async fn login_reads_tokens_from_headers_and_decodes_expiry() {
    let state = StubState::new(GraphqlMode::Ok);
    let base = spawn_stub(state.clone()).await;

    let credential = session(&base).login().await.unwrap();

    assert_eq!(credential.expires_at_unix, TOKEN_EXP);
    assert_eq!(credential.refresh_token.as_deref(), Some("rt-login"));
    assert_eq!(credential.front_token.as_deref(), Some("ft-login"));
    assert_eq!(state.signin_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn valid_token_reuses_a_fresh_credential() {
    let state = StubState::new(GraphqlMode::Ok);
    let base = spawn_stub(state.clone()).await;
    let session = session(&base);

    let first = session.valid_token().await.unwrap();
    let second = session.valid_token().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(state.signin_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_without_a_token_delegates_to_login() {
    let state = StubState::new(GraphqlMode::Ok);
    let base = spawn_stub(state.clone()).await;

    let credential = session(&base).refresh().await.unwrap();

    assert_eq!(state.signin_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(credential.expires_at_unix, TOKEN_EXP);
}

#[tokio::test]
async fn refresh_merges_over_the_prior_credential() {
    let state = StubState::new(GraphqlMode::Ok);
    let base = spawn_stub(state.clone()).await;
    let session = session(&base);

    session.login().await.unwrap();
    let refreshed = session.refresh().await.unwrap();

    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(refreshed.expires_at_unix, REFRESHED_EXP);
    // headers omitted by the refresh response keep their prior values
    assert_eq!(refreshed.refresh_token.as_deref(), Some("rt-login"));
    assert_eq!(refreshed.front_token.as_deref(), Some("ft-login"));
}

#[tokio::test]
async fn unauthorized_once_triggers_exactly_one_refresh_and_succeeds() {
    let state = StubState::new(GraphqlMode::FailFirst401);
    let base = spawn_stub(state.clone()).await;
    let source = graphql_source(&base);

    let page = source.fetch_page(None).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "vac-1");
    assert!(!page.has_next);
    assert_eq!(state.graphql_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.signin_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthorized_twice_is_a_fatal_auth_error() {
    let state = StubState::new(GraphqlMode::Always401);
    let base = spawn_stub(state.clone()).await;
    let source = graphql_source(&base);

    let err = source.fetch_page(None).await.unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    // exactly one retry, no loop
    assert_eq!(state.graphql_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn graphql_error_array_is_a_remote_query_error() {
    let state = StubState::new(GraphqlMode::ErrorsArray);
    let base = spawn_stub(state.clone()).await;
    let source = graphql_source(&base);

    let err = source.fetch_page(None).await.unwrap_err();

    match err {
        Error::RemoteQuery(errors) => {
            assert_eq!(errors[0]["message"], "field does not exist");
        }
        other => panic!("expected RemoteQuery, got {:?}", other),
    }
    assert_eq!(state.graphql_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_auth_failure_is_transport_and_not_retried() {
    let state = StubState::new(GraphqlMode::ServerError);
    let base = spawn_stub(state.clone()).await;
    let source = graphql_source(&base);

    let err = source.fetch_page(None).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(state.graphql_calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.refresh_calls.load(Ordering::SeqCst), 0);
}
