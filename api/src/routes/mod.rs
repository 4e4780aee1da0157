//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/api/votes/*` - 투표 / 투표 취소
//! - `/api/answers/*` - 답변, 채택, 댓글
//! - `/api/questions/*` - 질문 CRUD
//! - `/api/tags/*` - 태그 조회
//! - `/api/notifications/*` - 알림함
//! - `/api/users/*` - 프로필, 리더보드
//! - `/api/stats/*` - 커뮤니티 / 대시보드 통계
//! - `/api/admin/*` - 관리 작업

pub mod admin;
pub mod answers;
pub mod health;
pub mod notifications;
pub mod questions;
pub mod stats;
pub mod tags;
pub mod users;
pub mod votes;

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::services::enforce_rate_limit;
use crate::AppState;

/// JSON body extractor. 파싱 실패도 `ApiError` 형식으로 응답
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Path extractor (`ApiError` rejection)
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET    /health
///
/// POST   /api/votes                          - 투표 (upvote | downvote)
/// DELETE /api/votes/:targetId/:targetType    - 투표 취소
///
/// POST   /api/answers                        - 답변 작성
/// GET    /api/answers/question/:questionId   - 질문의 답변 목록
/// PUT    /api/answers/:id                    - 답변 수정
/// DELETE /api/answers/:id                    - 답변 삭제
/// POST   /api/answers/:id/accept             - 답변 채택
/// POST   /api/answers/:id/comments           - 댓글 작성
///
/// GET    /api/questions                      - 질문 목록
/// POST   /api/questions                      - 질문 작성
/// GET    /api/questions/:id                  - 질문 조회
/// PUT    /api/questions/:id                  - 질문 수정 / 상태 변경
/// DELETE /api/questions/:id                  - 질문 삭제
///
/// GET    /api/tags, /api/tags/:id
///
/// GET    /api/notifications                  - 알림 목록 (?status=unread)
/// GET    /api/notifications/unread-count
/// PUT    /api/notifications/mark-all-read
/// PUT    /api/notifications/:id/read
/// DELETE /api/notifications/:id
///
/// GET    /api/users/me, /api/users/:id
/// PUT    /api/users/me                       - 프로필 수정
/// DELETE /api/users/me                       - 계정 비활성화
/// GET    /api/users/leaderboard              - reputation 순위
/// GET    /api/users/profile/:username
///
/// GET    /api/stats/community, /api/stats/dashboard
/// POST   /api/admin/reconcile
/// ```
pub fn create_router(state: AppState) -> Router {
    // CORS 설정
    // 프로덕션: ALLOWED_ORIGINS 만 허용, 개발: localhost 허용
    let cors = if state.config.is_production() {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        CorsLayer::new()
            .allow_origin([
                HeaderValue::from_static("http://localhost:5173"), // Vite dev server
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:5173"),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let api = Router::new()
        // Votes
        .route("/votes", post(votes::cast_vote))
        .route("/votes/:target_id/:target_type", delete(votes::remove_vote))

        // Answers
        .route("/answers", post(answers::create_answer))
        .route("/answers/question/:question_id", get(answers::list_answers))
        .route(
            "/answers/:id",
            put(answers::update_answer).delete(answers::delete_answer),
        )
        .route("/answers/:id/accept", post(answers::accept_answer))
        .route("/answers/:id/comments", post(answers::create_comment))

        // Questions
        .route(
            "/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/questions/:id",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )

        // Tags
        .route("/tags", get(tags::list_tags))
        .route("/tags/:id", get(tags::get_tag))

        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/mark-all-read", put(notifications::mark_all_read))
        .route("/notifications/:id/read", put(notifications::mark_read))
        .route("/notifications/:id", delete(notifications::delete_notification))

        // Users
        .route(
            "/users/me",
            get(users::me).put(users::update_me).delete(users::deactivate_me),
        )
        .route("/users/leaderboard", get(users::leaderboard))
        .route("/users/profile/:username", get(users::profile_by_username))
        .route("/users/:id", get(users::profile))

        // Stats
        .route("/stats/community", get(stats::community))
        .route("/stats/dashboard", get(stats::dashboard))

        // Admin
        .route("/admin/reconcile", post(admin::reconcile))

        // 변경 요청 rate limit
        .route_layer(middleware::from_fn_with_state(state.clone(), enforce_rate_limit));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .nest("/api", api)

        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)

        // 상태 주입
        .with_state(state)
}
