//! Rate Limiting
//!
//! Fixed-window 카운터를 store 에 보관 (`user:<id>` 또는 `ip:<addr>` 키).
//! 프로세스 메모리에 두지 않으므로 여러 인스턴스가 같은 한도를 공유함.
//! GET/HEAD/OPTIONS 는 제한하지 않음.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::auth::token_subject;
use crate::db::{window_start, Store};
use crate::error::ApiError;
use crate::AppState;

/// 한 번의 체크 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub limit: u64,
    pub remaining: u64,
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// 카운터 +1 후 한도 초과면 `RateLimited`
    pub async fn check(&self, key: &str) -> Result<RateDecision, ApiError> {
        let hits = self.store.hit_counter(key, self.window).await?;

        if hits > self.max_requests {
            let retry_after_secs = self.seconds_until_reset();
            tracing::warn!(%key, hits, retry_after_secs, "rate limit exceeded");
            return Err(ApiError::RateLimited { retry_after_secs });
        }

        Ok(RateDecision {
            limit: self.max_requests,
            remaining: self.max_requests - hits,
        })
    }

    fn seconds_until_reset(&self) -> u64 {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let reset = window_start(now, self.window) + window;
        (reset - now).num_seconds().max(1) as u64
    }
}

/// 요청자 키: 인증된 경우 사용자 id, 아니면 client IP
///
/// IP 는 연결된 peer 주소. `X-Forwarded-For` 는 `trust_forwarded_for` 일 때만 사용
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    jwt_secret: &str,
    trust_forwarded_for: bool,
) -> String {
    if let Some(user_id) = token_subject(headers, jwt_secret) {
        return format!("user:{}", user_id);
    }

    let forwarded = trust_forwarded_for
        .then(|| headers.get("X-Forwarded-For"))
        .flatten()
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let ip = forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    format!("ip:{}", ip)
}

/// Rate limit middleware (변경 요청에만 적용)
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(request).await);
    }

    let key = client_key(
        request.headers(),
        connect_info.map(|ci| ci.0),
        &state.config.jwt_secret,
        state.config.trust_forwarded_for,
    );
    let decision = state.rate_limiter.check(&key).await?;

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));

    Ok(response)
}
