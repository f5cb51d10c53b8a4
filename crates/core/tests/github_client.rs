//! GitHub client tests against a local wiremock server.

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prconflict_core::errors::GitHubError;
use prconflict_core::git::{GitHubClient, GitHubRepository};
use prconflict_core::models::{CandidateSource, Mergeability, RepoSlug};

const REPO_PATH: &str = "/repos/octo/widgets";

fn slug() -> RepoSlug {
    RepoSlug::new("octo", "widgets")
}

fn repo_json(owner: &str, name: &str) -> Value {
    json!({
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "owner": {"login": owner},
        "clone_url": format!("https://github.com/{}/{}.git", owner, name),
        "default_branch": "main"
    })
}

fn pr_json(number: u64, head_owner: &str, head_ref: &str, draft: bool, mergeable: Value) -> Value {
    json!({
        "number": number,
        "title": format!("PR {}", number),
        "state": "open",
        "draft": draft,
        "head": {"ref": head_ref, "sha": "abc123", "repo": repo_json(head_owner, "widgets")},
        "base": {"ref": "main", "sha": "def456", "repo": repo_json("octo", "widgets")},
        "mergeable": mergeable
    })
}

fn repository(owner: &str, name: &str) -> GitHubRepository {
    serde_json::from_value(repo_json(owner, name)).unwrap()
}

async fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(server.uri(), "mock-token").unwrap()
}

#[tokio::test]
async fn test_get_repository_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REPO_PATH))
        .and(header("authorization", "Bearer mock-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_json("octo", "widgets")))
        .expect(1)
        .mount(&server)
        .await;

    let repo = client(&server).await.get_repository(&slug()).await.unwrap();
    assert_eq!(repo.default_branch.as_deref(), Some("main"));
    assert_eq!(repo.slug(), slug());
}

#[tokio::test]
async fn test_pagination_stops_at_short_page() {
    let server = MockServer::start().await;
    let full: Vec<Value> = (1..=100)
        .map(|n| pr_json(n, "octo", &format!("b{}", n), false, Value::Null))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls", REPO_PATH)))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .and(query_param("state", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(full)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls", REPO_PATH)))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pr_json(101, "octo", "b101", false, Value::Null)])))
        .expect(1)
        .mount(&server)
        .await;

    let prs = client(&server)
        .await
        .list_open_pull_requests(&slug(), None)
        .await
        .unwrap();
    assert_eq!(prs.len(), 101);
    assert_eq!(prs[100].number, 101);
}

#[tokio::test]
async fn test_fetch_candidates_classifies_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls", REPO_PATH)))
        .and(query_param("base", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            pr_json(1, "octo", "feature", false, Value::Null),
            pr_json(2, "someone", "fix", false, Value::Null),
            pr_json(3, "octo", "wip", true, Value::Null),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls/1", REPO_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(1, "octo", "feature", false, json!(true))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls/2", REPO_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(2, "someone", "fix", false, json!(false))))
        .mount(&server)
        .await;
    // Drafts are never looked up individually.
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls/3", REPO_PATH)))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let candidates = client(&server)
        .await
        .fetch_candidates(&repository("octo", "widgets"), "main")
        .await
        .unwrap();

    assert_eq!(candidates.len(), 3);
    assert_eq!(
        candidates[0].source,
        CandidateSource::SameRepository {
            branch: "feature".into()
        }
    );
    assert_eq!(candidates[0].mergeability, Mergeability::Mergeable);
    match &candidates[1].source {
        CandidateSource::Fork {
            clone_url, branch, ..
        } => {
            assert_eq!(clone_url, "https://github.com/someone/widgets.git");
            assert_eq!(branch, "fix");
        }
        other => panic!("expected a fork source, got {:?}", other),
    }
    assert_eq!(candidates[1].mergeability, Mergeability::Conflicting);
    assert!(candidates[2].draft);
}

#[tokio::test]
async fn test_renamed_repository_classifies_against_canonical_name() {
    let server = MockServer::start().await;
    // The old name still resolves, but GitHub answers with the new identity.
    Mock::given(method("GET"))
        .and(path("/repos/octo/gadgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repo_json("octo", "widgets")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls", REPO_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pr_json(5, "octo", "feature", false, Value::Null)])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls/5", REPO_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr_json(5, "octo", "feature", false, json!(true))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).await;
    let repo = client
        .get_repository(&RepoSlug::new("octo", "gadgets"))
        .await
        .unwrap();
    let candidates = client.fetch_candidates(&repo, "main").await.unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(
        candidates[0].source,
        CandidateSource::SameRepository {
            branch: "feature".into()
        }
    );
}

#[tokio::test]
async fn test_unauthorized_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REPO_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
        .mount(&server)
        .await;

    let err = client(&server).await.get_repository(&slug()).await.unwrap_err();
    assert!(matches!(err, GitHubError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls/7", REPO_PATH)))
        .respond_with(ResponseTemplate::new(429).insert_header("x-ratelimit-reset", "1700000000"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/pulls/8", REPO_PATH)))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1700000001"),
        )
        .mount(&server)
        .await;

    let client = client(&server).await;
    match client.get_pull_request(&slug(), 7).await.unwrap_err() {
        GitHubError::RateLimited { reset_at } => assert_eq!(reset_at, "1700000000"),
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert!(matches!(
        client.get_pull_request(&slug(), 8).await.unwrap_err(),
        GitHubError::RateLimited { .. }
    ));
}

#[tokio::test]
async fn test_server_error_is_an_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(REPO_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server).await.get_repository(&slug()).await.unwrap_err();
    assert!(matches!(err, GitHubError::ApiError { status: 502, .. }));
}
