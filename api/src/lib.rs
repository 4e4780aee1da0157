//! Q&A Community API Library
//!
//! # Overview
//!
//! 질문/답변 커뮤니티 백엔드. 투표 ledger, 점수 집계, 답변 채택, 태그, 알림을
//! 제공하며 모든 다중 문서 변경은 store 트랜잭션 하나로 원자적으로 처리됨.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                         API                              │
//! │                                                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐    │
//! │  │ Routes  │  │Services │  │   DB    │  │  Types  │    │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘    │
//! │       │            │            │            │          │
//! │       └────────────┴────────────┴────────────┘          │
//! │                         │                                │
//! └─────────────────────────┼────────────────────────────────┘
//!                           │
//!                           ▼
//!             ┌──────────────────────────┐
//!             │  PostgreSQL │  In-memory │
//!             └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입 및 처리
//! - `auth`: JWT 검증, `AuthUser` extractor
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 비즈니스 로직 (votes, answers, questions, tags, notifications)
//! - `db`: `Store` trait 과 PostgreSQL / in-memory 구현
//! - `types`: 공통 타입 정의
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qa_forum_api::{config::Config, routes, AppState, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(Arc::new(MemoryStore::new()), config);
//!     let app = routes::create_router(state);
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::{Database, MemoryStore, Store};
pub use error::ApiError;
pub use services::RateLimiter;

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let rate_limiter = RateLimiter::new(
            store.clone(),
            config.rate_limit_max,
            config.rate_limit_window,
        );
        Self {
            store,
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
        }
    }
}
