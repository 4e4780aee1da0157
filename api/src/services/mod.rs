//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어.
//! 모든 다중 문서 변경은 하나의 `StoreTx` 안에서 실행됨.
//!
//! # Services
//! - `VoteService`: vote ledger + score 재집계
//! - `AnswerService`: 답변/댓글, 채택 (Acceptance Manager)
//! - `QuestionService`: 질문 CRUD, 태그 카운트
//! - `TagService`: 태그 정규화 / 조회
//! - `NotificationService`: 알림함
//! - `Reconciler`: 파생 카운터 주기적 보정
//! - `RateLimiter`: store 기반 fixed-window 카운터
//! - `UserService` / `StatsService`: 프로필, 리더보드, 커뮤니티 통계

mod answers;
mod notifications;
mod questions;
mod rate_limit;
mod reconcile;
mod stats;
mod tags;
mod users;
mod votes;

use std::future::Future;
use std::ops::RangeInclusive;

pub use answers::{AnswerChanges, AnswerService, NewAnswer, NewComment};
pub use notifications::NotificationService;
pub use questions::{NewQuestion, QuestionChanges, QuestionService};
pub use rate_limit::{enforce_rate_limit, RateLimiter};
pub use reconcile::{spawn_reconciler, ReconcileReport, Reconciler};
pub use stats::{DashboardStats, StatsService};
pub use tags::{TagName, TagService};
pub use users::{ProfileChanges, UserService};
pub use votes::{VoteOutcome, VoteReceipt, VoteService};

use crate::error::{ApiError, FieldError};

/// 필드 검증 에러 누적기
#[derive(Debug, Default)]
pub(crate) struct Validation {
    errors: Vec<FieldError>,
}

impl Validation {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// 앞뒤 공백 제외한 글자 수 검사
    pub fn length(&mut self, field: &str, value: &str, range: RangeInclusive<usize>) {
        let len = value.trim().chars().count();
        if !range.contains(&len) {
            self.push(
                field,
                format!(
                    "{} must be between {} and {} characters",
                    field,
                    range.start(),
                    range.end()
                ),
            );
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationError(self.errors))
        }
    }
}

/// `Conflict` (동시 insert 의 unique index 위반) 이면 한 번만 재시도
pub(crate) async fn retry_on_conflict<T, F, Fut>(operation: &str, mut attempt: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    match attempt().await {
        Err(ApiError::Conflict(reason)) => {
            tracing::warn!(operation, %reason, "conflict, retrying once");
            attempt().await
        }
        other => other,
    }
}
