//! GitHub client tests against a local fake of the REST API.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use codecheck_core::{
    PipelineRunProbe, ProviderFailure, ProvisionError, RemoteProvisioner, RepoHandle, RepoName,
    RunState, PIPELINE_PATH,
};
use codecheck_github::{GitHubClient, GitHubConfig};

// ---------------------------------------------------------------------------
// Fake API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Create { name: String, private: bool },
    Put { repo: String, path: String, content: Vec<u8>, branch: String },
    Delete { repo: String },
    Runs { repo: String, branch: Option<String> },
}

#[derive(Clone, Default)]
struct Fake {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Fake {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("lock").clone()
    }

    fn record(&self, event: Seen) {
        self.seen.lock().expect("lock").push(event);
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-token")
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Bad credentials"})),
    )
        .into_response()
}

async fn create_repo(
    State(fake): State<Fake>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    fake.record(Seen::Create {
        name: name.clone(),
        private: body["private"].as_bool().unwrap_or(false),
    });
    match name.as_str() {
        "code-check-taken" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": "Repository creation failed."})),
        )
            .into_response(),
        "code-check-limited" => (
            StatusCode::FORBIDDEN,
            [("x-ratelimit-remaining", "0")],
            Json(json!({"message": "API rate limit exceeded"})),
        )
            .into_response(),
        _ => (
            StatusCode::CREATED,
            Json(json!({
                "name": name,
                "owner": {"login": "bot"},
                "html_url": format!("https://github.test/bot/{name}"),
            })),
        )
            .into_response(),
    }
}

async fn put_contents(
    State(fake): State<Fake>,
    Path((_owner, repo, path)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let content = STANDARD
        .decode(body["content"].as_str().unwrap_or_default())
        .unwrap_or_default();
    fake.record(Seen::Put {
        repo,
        path,
        content,
        branch: body["branch"].as_str().unwrap_or_default().to_string(),
    });
    (StatusCode::CREATED, Json(json!({"content": {}}))).into_response()
}

async fn delete_repo(
    State(fake): State<Fake>,
    Path((_owner, repo)): Path<(String, String)>,
) -> Response {
    fake.record(Seen::Delete { repo: repo.clone() });
    match repo.as_str() {
        "code-check-gone" => {
            (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response()
        }
        "code-check-broken" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "Server Error"})),
        )
            .into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn list_runs(
    State(fake): State<Fake>,
    Path((_owner, repo)): Path<(String, String)>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Response {
    fake.record(Seen::Runs {
        repo: repo.clone(),
        branch: query.get("branch").cloned(),
    });
    match repo.as_str() {
        "code-check-slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({"total_count": 0, "workflow_runs": []})).into_response()
        }
        "code-check-fresh" => {
            (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response()
        }
        _ => Json(json!({
            "total_count": 1,
            "workflow_runs": [{
                "id": 99,
                "status": "completed",
                "conclusion": "success",
                "html_url": "https://github.test/bot/r/actions/runs/99"
            }]
        }))
        .into_response(),
    }
}

async fn spawn_fake() -> (Fake, SocketAddr) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/user/repos", post(create_repo))
        .route("/repos/:owner/:repo/contents/*path", put(put_contents))
        .route("/repos/:owner/:repo", delete(delete_repo))
        .route("/repos/:owner/:repo/actions/runs", get(list_runs))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake api");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (fake, addr)
}

fn client_for(addr: SocketAddr, token: &str) -> GitHubClient {
    let config = GitHubConfig::new(token, "bot")
        .with_api_base_url(format!("http://{addr}"))
        .with_request_timeout(Duration::from_millis(500));
    GitHubClient::new(config).expect("client")
}

fn handle(name: &str) -> RepoHandle {
    RepoHandle {
        name: name.to_string(),
        owner: "bot".to_string(),
        html_url: None,
    }
}

fn repo_name(suffix: &str) -> RepoName {
    RepoName::for_check(&codecheck_core::CheckId::from_external(suffix))
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provisions_repository_source_and_pipeline() {
    let (fake, addr) = spawn_fake().await;
    let client = client_for(addr, "test-token");

    let repo = client
        .create_repository(&repo_name("abc"))
        .await
        .expect("create");
    assert_eq!(repo.name, "code-check-abc");
    assert_eq!(repo.owner, "bot");
    assert_eq!(
        repo.html_url.as_deref(),
        Some("https://github.test/bot/code-check-abc")
    );

    client
        .commit_file(&repo, "main.py", b"print(1)\n", "Add main.py for CI/CD check")
        .await
        .expect("commit source");
    client
        .install_pipeline_definition(&repo, "main.py")
        .await
        .expect("install pipeline");

    let seen = fake.seen();
    assert_eq!(
        seen[0],
        Seen::Create {
            name: "code-check-abc".into(),
            private: true
        }
    );
    assert_eq!(
        seen[1],
        Seen::Put {
            repo: "code-check-abc".into(),
            path: "main.py".into(),
            content: b"print(1)\n".to_vec(),
            branch: "main".into(),
        }
    );
    let Seen::Put { path, content, .. } = &seen[2] else {
        panic!("expected pipeline commit, got {:?}", seen[2]);
    };
    assert_eq!(path, PIPELINE_PATH);
    let document = String::from_utf8(content.clone()).expect("utf-8 pipeline");
    assert!(document.contains("CHECK_FILE: main.py"));
}

#[tokio::test]
async fn taken_name_is_a_conflict() {
    let (_fake, addr) = spawn_fake().await;
    let err = client_for(addr, "test-token")
        .create_repository(&repo_name("taken"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProvisionError::Provision {
            repo: "code-check-taken".into(),
            cause: ProviderFailure::NameConflict,
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limit_is_quota_and_retryable() {
    let (_fake, addr) = spawn_fake().await;
    let err = client_for(addr, "test-token")
        .create_repository(&repo_name("limited"))
        .await
        .unwrap_err();
    assert_eq!(err.cause(), &ProviderFailure::QuotaExceeded);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn bad_token_is_unauthorized() {
    let (_fake, addr) = spawn_fake().await;
    let err = client_for(addr, "wrong")
        .create_repository(&repo_name("abc"))
        .await
        .unwrap_err();
    assert_eq!(err.cause(), &ProviderFailure::Unauthorized);
}

#[tokio::test]
async fn unreachable_api_is_network_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = client_for(addr, "test-token")
        .create_repository(&repo_name("abc"))
        .await
        .unwrap_err();
    assert!(matches!(err.cause(), ProviderFailure::Network(_)));
    assert!(err.is_retryable());
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_treats_missing_repository_as_done() {
    let (fake, addr) = spawn_fake().await;
    let client = client_for(addr, "test-token");

    client
        .delete_repository(&handle("code-check-abc"))
        .await
        .expect("delete");
    client
        .delete_repository(&handle("code-check-gone"))
        .await
        .expect("already gone");

    let err = client
        .delete_repository(&handle("code-check-broken"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Teardown {
            cause: ProviderFailure::Api { status: 500, .. },
            ..
        }
    ));
    assert_eq!(fake.seen().len(), 3);
}

// ---------------------------------------------------------------------------
// Workflow runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn latest_run_reads_default_branch() {
    let (fake, addr) = spawn_fake().await;
    let run = client_for(addr, "test-token")
        .latest_run(&handle("code-check-abc"))
        .await
        .expect("probe")
        .expect("a run");

    assert_eq!(run.id, 99);
    assert_eq!(run.state, RunState::Completed);
    assert!(run.succeeded());
    assert_eq!(
        fake.seen(),
        vec![Seen::Runs {
            repo: "code-check-abc".into(),
            branch: Some("main".into())
        }]
    );
}

#[tokio::test]
async fn latest_run_missing_actions_is_none() {
    let (_fake, addr) = spawn_fake().await;
    let run = client_for(addr, "test-token")
        .latest_run(&handle("code-check-fresh"))
        .await
        .expect("probe");
    assert!(run.is_none());
}

#[tokio::test]
async fn slow_response_is_timeout() {
    let (_fake, addr) = spawn_fake().await;
    let err = client_for(addr, "test-token")
        .latest_run(&handle("code-check-slow"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProvisionError::Probe {
            repo: "code-check-slow".into(),
            cause: ProviderFailure::Timeout { limit_ms: 500 },
        }
    );
}
