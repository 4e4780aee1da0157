//! Integration tests for the HTTP API
//!
//! in-memory store 위에서 router 전체를 `oneshot` 으로 구동.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use qa_forum_api::{
    auth::Claims,
    db::{User, UserRole, UserStatus},
    routes::create_router,
    AppState, Config, MemoryStore, Store,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-test-secret-at-least-32-bytes";

struct TestApp {
    router: Router,
    store: Arc<dyn Store>,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(Config::for_memory(SECRET))
    }

    fn with_config(config: Config) -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let router = create_router(AppState::new(store.clone(), config));
        Self { router, store }
    }

    async fn user(&self, username: &str, role: UserRole, status: UserStatus) -> (User, String) {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            credential_hash: "external".to_string(),
            reputation: 1,
            role,
            status,
            bio: None,
            location: None,
            website: None,
            created_at: Utc::now(),
        };
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_user(&user).await.unwrap();
        tx.commit().await.unwrap();

        let token = token_for(user.id);
        (user, token)
    }

    async fn member(&self, username: &str) -> (User, String) {
        self.user(username, UserRole::User, UserStatus::Active).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse { status, headers, body }
    }

    /// 익명 POST. peer 주소는 `ConnectInfo` 로 주입
    async fn anonymous_post(&self, uri: &str, peer: SocketAddr, forwarded_for: &str) -> StatusCode {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("X-Forwarded-For", forwarded_for)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        self.router.clone().oneshot(request).await.unwrap().status()
    }

    async fn create_question(&self, token: &str, tags: &[&str]) -> String {
        let response = self
            .send(
                Method::POST,
                "/api/questions",
                Some(token),
                Some(json!({
                    "title": "How do I test axum routers?",
                    "description": "Looking for a way to drive the router without a socket.",
                    "tags": tags,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    async fn create_answer(&self, token: &str, question_id: &str) -> String {
        let response = self
            .send(
                Method::POST,
                "/api/answers",
                Some(token),
                Some(json!({
                    "question": question_id,
                    "content": "Use tower::ServiceExt::oneshot on the router.",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }
}

fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as u64,
        iat: Some(Utc::now().timestamp() as u64),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

// ============ Health ============

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let response = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["store"]["connected"], true);
}

// ============ Auth ============

#[tokio::test]
async fn test_mutations_require_valid_token() {
    let app = TestApp::new();
    let body = json!({ "target": Uuid::new_v4(), "targetType": "Answer", "voteType": "upvote" });

    let response = app.send(Method::POST, "/api/votes", None, Some(body.clone())).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["success"], false);

    let response = app
        .send(Method::POST, "/api/votes", Some("not-a-jwt"), Some(body))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_suspended_user_is_forbidden() {
    let app = TestApp::new();
    let (_, token) = app.user("sleeper", UserRole::User, UserStatus::Suspended).await;

    let response = app.send(Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_hides_private_fields() {
    let app = TestApp::new();
    let (user, token) = app.member("alice").await;

    let me = app.send(Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(me.body["email"], "alice@example.com");
    assert!(me.body.get("credentialHash").is_none());

    let public = app
        .send(Method::GET, &format!("/api/users/{}", user.id), None, None)
        .await;
    assert_eq!(public.status, StatusCode::OK);
    assert_eq!(public.body["username"], "alice");
    assert!(public.body.get("email").is_none());
}

// ============ Votes ============

#[tokio::test]
async fn test_vote_lifecycle_updates_score() {
    let app = TestApp::new();
    let (_, asker) = app.member("asker").await;
    let (_, helper) = app.member("helper").await;
    let (_, voter) = app.member("voter").await;

    let question_id = app.create_question(&asker, &["rust"]).await;
    let answer_id = app.create_answer(&helper, &question_id).await;
    let list_uri = format!("/api/answers/question/{}", question_id);
    let vote = |vote_type: &str| {
        json!({ "target": answer_id, "targetType": "Answer", "voteType": vote_type })
    };

    let response = app.send(Method::POST, "/api/votes", Some(&voter), Some(vote("upvote"))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Vote recorded successfully");
    let answers = app.send(Method::GET, &list_uri, None, None).await;
    assert_eq!(answers.body[0]["metrics"]["score"], 1);

    let response = app.send(Method::POST, "/api/votes", Some(&voter), Some(vote("upvote"))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "You have already voted");

    let response = app.send(Method::POST, "/api/votes", Some(&voter), Some(vote("downvote"))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Vote updated successfully");
    let answers = app.send(Method::GET, &list_uri, None, None).await;
    assert_eq!(answers.body[0]["metrics"]["score"], -1);

    let remove_uri = format!("/api/votes/{}/Answer", answer_id);
    let response = app.send(Method::DELETE, &remove_uri, Some(&voter), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let answers = app.send(Method::GET, &list_uri, None, None).await;
    assert_eq!(answers.body[0]["metrics"]["score"], 0);

    let response = app.send(Method::DELETE, &remove_uri, Some(&voter), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["code"], "VOTE_NOT_FOUND");
}

#[tokio::test]
async fn test_vote_request_validation() {
    let app = TestApp::new();
    let (_, voter) = app.member("voter").await;

    let response = app
        .send(
            Method::POST,
            "/api/votes",
            Some(&voter),
            Some(json!({ "target": Uuid::new_v4(), "targetType": "answer", "voteType": "up" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
    assert_eq!(response.body["errors"].as_array().unwrap().len(), 2);

    let response = app
        .send(
            Method::POST,
            "/api/votes",
            Some(&voter),
            Some(json!({ "target": Uuid::new_v4(), "targetType": "Question", "voteType": "upvote" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// ============ Acceptance ============

#[tokio::test]
async fn test_accept_transfers_between_answers() {
    let app = TestApp::new();
    let (_, asker) = app.member("asker").await;
    let (_, helper) = app.member("helper").await;

    let question_id = app.create_question(&asker, &["rust"]).await;
    let first = app.create_answer(&helper, &question_id).await;
    let second = app.create_answer(&helper, &question_id).await;

    let response = app
        .send(Method::POST, &format!("/api/answers/{}/accept", first), Some(&helper), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    for answer_id in [&first, &second] {
        let response = app
            .send(Method::POST, &format!("/api/answers/{}/accept", answer_id), Some(&asker), None)
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["message"], "Answer accepted successfully");
    }

    let question = app
        .send(Method::GET, &format!("/api/questions/{}", question_id), None, None)
        .await;
    assert_eq!(question.body["acceptedAnswer"], second.as_str());
    assert_eq!(question.body["metrics"]["answerCount"], 2);

    let answers = app
        .send(Method::GET, &format!("/api/answers/question/{}", question_id), None, None)
        .await;
    let accepted: Vec<&Value> = answers
        .body
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["isAccepted"] == true)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0]["id"], second.as_str());

    // 채택 알림 2건
    let count = app
        .send(Method::GET, "/api/notifications/unread-count", Some(&helper), None)
        .await;
    assert_eq!(count.body["count"], 2);
}

// ============ Questions & Tags ============

#[tokio::test]
async fn test_question_creation_creates_missing_tags_only() {
    let app = TestApp::new();
    let (_, asker) = app.member("asker").await;

    app.create_question(&asker, &["react"]).await;
    app.create_question(&asker, &["React", "new-tag-xyz"]).await;

    let tags = app.send(Method::GET, "/api/tags", None, None).await;
    assert_eq!(tags.body["pagination"]["total"], 2);
    assert_eq!(tags.body["items"][0]["name"], "react");
    assert_eq!(tags.body["items"][0]["metrics"]["questionCount"], 2);
}

#[tokio::test]
async fn test_closed_question_rejects_answers() {
    let app = TestApp::new();
    let (_, asker) = app.member("asker").await;
    let (_, helper) = app.member("helper").await;
    let question_id = app.create_question(&asker, &["rust"]).await;

    let response = app
        .send(
            Method::PUT,
            &format!("/api/questions/{}", question_id),
            Some(&asker),
            Some(json!({ "status": "closed" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .send(
            Method::POST,
            "/api/answers",
            Some(&helper),
            Some(json!({
                "question": question_id,
                "content": "An answer that should never be stored.",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["errors"][0]["field"], "question");
}

// ============ Rate limiting ============

#[tokio::test]
async fn test_rate_limit_returns_retry_after() {
    let mut config = Config::for_memory(SECRET);
    config.rate_limit_max = 2;
    let app = TestApp::with_config(config);
    let (_, asker) = app.member("asker").await;

    app.create_question(&asker, &["rust"]).await;
    app.create_question(&asker, &["rust"]).await;

    let response = app
        .send(
            Method::POST,
            "/api/questions",
            Some(&asker),
            Some(json!({ "title": "x", "description": "y", "tags": [] })),
        )
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers.contains_key(header::RETRY_AFTER));

    // 조회는 제한 대상 아님
    let response = app.send(Method::GET, "/api/questions", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_ignores_spoofed_forwarded_for() {
    let mut config = Config::for_memory(SECRET);
    config.rate_limit_max = 2;
    let app = TestApp::with_config(config);
    let peer: SocketAddr = "198.51.100.7:41000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..5 {
        let forwarded = format!("10.0.0.{}", i);
        statuses.push(app.anonymous_post("/api/votes", peer, &forwarded).await);
    }

    assert_eq!(
        statuses,
        [
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[tokio::test]
async fn test_trusted_proxy_keys_by_forwarded_client() {
    let mut config = Config::for_memory(SECRET);
    config.rate_limit_max = 2;
    config.trust_forwarded_for = true;
    let app = TestApp::with_config(config);
    let proxy: SocketAddr = "10.1.1.1:8443".parse().unwrap();

    for i in 0..4 {
        let client = format!("203.0.113.{}", i);
        assert_eq!(
            app.anonymous_post("/api/votes", proxy, &client).await,
            StatusCode::UNAUTHORIZED
        );
    }
}

// ============ Users & stats ============

#[tokio::test]
async fn test_leaderboard_and_profile_by_username() {
    let app = TestApp::new();
    let (alice, _) = app.member("alice").await;
    app.member("bob").await;
    app.user("banned", UserRole::User, UserStatus::Banned).await;

    let response = app.send(Method::GET, "/api/users/leaderboard", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    let names: Vec<&str> = response
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["alice", "bob"]);

    let response = app
        .send(Method::GET, "/api/users/profile/alice", None, None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], alice.id.to_string());
    assert!(response.body.get("email").is_none());

    let response = app
        .send(Method::GET, "/api/users/profile/nobody", None, None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_deactivate_own_account() {
    let app = TestApp::new();
    let (_, token) = app.member("carol").await;
    app.member("dave").await;

    let response = app
        .send(
            Method::PUT,
            "/api/users/me",
            Some(&token),
            Some(json!({ "bio": "Writes Rust", "location": "Seoul" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["bio"], "Writes Rust");

    let response = app
        .send(
            Method::PUT,
            "/api/users/me",
            Some(&token),
            Some(json!({ "username": "dave" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["errors"][0]["field"], "username");

    let response = app.send(Method::DELETE, "/api/users/me", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.send(Method::GET, "/api/users/me", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_community_and_dashboard_stats() {
    let app = TestApp::new();
    let (_, asker) = app.member("asker").await;
    let (_, helper) = app.member("helper").await;

    let question_id = app.create_question(&asker, &["rust"]).await;
    let answer_id = app.create_answer(&helper, &question_id).await;
    let response = app
        .send(
            Method::POST,
            &format!("/api/answers/{}/accept", answer_id),
            Some(&asker),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.send(Method::GET, "/api/stats/community", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["totalQuestions"], 1);
    assert_eq!(response.body["totalAnswers"], 1);
    assert_eq!(response.body["totalUsers"], 2);
    assert_eq!(response.body["questionsToday"], 1);

    let response = app.send(Method::GET, "/api/stats/dashboard", None, None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .send(Method::GET, "/api/stats/dashboard", Some(&helper), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["answersGiven"], 1);
    assert_eq!(response.body["acceptedAnswers"], 1);
    assert_eq!(response.body["reputation"], 5);
}

// ============ Admin ============

#[tokio::test]
async fn test_reconcile_requires_admin() {
    let app = TestApp::new();
    let (_, member) = app.member("member").await;
    let (_, admin) = app.user("root", UserRole::Admin, UserStatus::Active).await;

    let response = app
        .send(Method::POST, "/api/admin/reconcile", Some(&member), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .send(Method::POST, "/api/admin/reconcile", Some(&admin), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["corrected"], 0);
}
