//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: 왜 trait 기반 store 인가?
//! A: 같은 서비스 코드를 PostgreSQL 과 in-memory 두 구현 위에서 실행
//!
//!    ```rust,ignore
//!    let mut tx = store.begin().await?;
//!    let vote = tx.find_vote(user_id, target).await?;
//!    tx.write_metrics(target, tally).await?;
//!    tx.commit().await?;
//!    ```
//!
//!    - Postgres: `sqlx::Transaction` + `SELECT ... FOR UPDATE`
//!    - Memory: 전역 mutex + working copy (commit 시에만 반영)
//!
//! Q: 여러 document 를 건드리는 작업은?
//! A: 전부 하나의 `StoreTx` 안에서 실행
//!    - vote 기록 + 점수 재계산
//!    - 기존 채택 해제 + 새 답변 채택
//!    - 답변 생성 + answerCount 증가
//!    commit 전에 drop 되면 rollback.
//!
//! Lock 순서는 question → answer → comment 로 고정.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::models::{
    ActivityCounts, Answer, Comment, CommunityCounts, Notification, NotificationStatus, Question,
    Tag, User, Vote, VoteTally, VoteTarget, VoteType,
};
use crate::types::PageRequest;

/// Store 계층 에러
#[derive(Debug, Error)]
pub enum StoreError {
    /// unique index 위반 (동시 insert race)
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// 저장된 데이터가 모델과 맞지 않음
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document store 진입점
#[async_trait]
pub trait Store: Send + Sync {
    /// 트랜잭션 시작
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    /// Health check
    async fn ping(&self) -> StoreResult<()>;

    /// Fixed-window 카운터 증가 후 현재 window 의 hit 수 반환
    async fn hit_counter(&self, key: &str, window: Duration) -> StoreResult<u64>;

    /// window 가 지난 카운터 삭제, 삭제된 개수 반환
    async fn purge_counters(&self, older_than: DateTime<Utc>) -> StoreResult<u64>;
}

/// 하나의 트랜잭션 안에서 실행되는 document 연산
///
/// `lock_*` 메서드는 해당 row 를 commit 까지 잠금
#[async_trait]
pub trait StoreTx: Send {
    // ============ Users ============
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    async fn user_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>>;
    async fn user_by_username(&mut self, username: &str) -> StoreResult<Option<User>>;
    /// username / email / status / 프로필 필드만 저장 (reputation, role 제외)
    async fn save_user(&mut self, user: &User) -> StoreResult<()>;
    /// active 사용자, reputation 내림차순
    async fn top_users(&mut self, limit: i64) -> StoreResult<Vec<User>>;

    // ============ Stats ============
    /// `today` 이후 작성 수, `active_since` 이후 활동 사용자 수 포함
    async fn community_counts(
        &mut self,
        today: DateTime<Utc>,
        active_since: DateTime<Utc>,
    ) -> StoreResult<CommunityCounts>;
    async fn activity_counts(&mut self, user_id: Uuid) -> StoreResult<ActivityCounts>;

    // ============ Tags ============
    /// name 기준 insert-or-fetch. 새로 만들었으면 `true`
    async fn find_or_insert_tag(&mut self, tag: &Tag) -> StoreResult<(Tag, bool)>;
    async fn tag_by_id(&mut self, id: Uuid) -> StoreResult<Option<Tag>>;
    async fn list_tags(&mut self, page: &PageRequest) -> StoreResult<(Vec<Tag>, i64)>;
    async fn adjust_tag_question_count(&mut self, ids: &[Uuid], delta: i64) -> StoreResult<()>;

    // ============ Questions ============
    async fn insert_question(&mut self, question: &Question) -> StoreResult<()>;
    async fn question_by_id(&mut self, id: Uuid) -> StoreResult<Option<Question>>;
    async fn lock_question(&mut self, id: Uuid) -> StoreResult<Option<Question>>;
    /// deleted 제외, 최신순
    async fn list_questions(&mut self, page: &PageRequest) -> StoreResult<(Vec<Question>, i64)>;
    /// title / description / tags / status / accepted_answer 만 저장 (metrics 제외)
    async fn save_question(&mut self, question: &Question) -> StoreResult<()>;
    async fn increment_views(&mut self, id: Uuid) -> StoreResult<()>;
    async fn adjust_answer_count(&mut self, id: Uuid, delta: i64) -> StoreResult<()>;
    async fn set_answer_count(&mut self, id: Uuid, count: i64) -> StoreResult<()>;
    async fn question_ids(&mut self) -> StoreResult<Vec<Uuid>>;

    // ============ Answers ============
    async fn insert_answer(&mut self, answer: &Answer) -> StoreResult<()>;
    async fn answer_by_id(&mut self, id: Uuid) -> StoreResult<Option<Answer>>;
    async fn lock_answer(&mut self, id: Uuid) -> StoreResult<Option<Answer>>;
    /// active 만, 채택 답변 먼저 → score 내림차순
    async fn answers_for_question(&mut self, question_id: Uuid) -> StoreResult<Vec<Answer>>;
    /// content / status / is_accepted / accepted_at 만 저장 (metrics 제외)
    async fn save_answer(&mut self, answer: &Answer) -> StoreResult<()>;
    /// 질문의 모든 답변 채택 해제, 변경된 개수 반환
    async fn clear_acceptance(&mut self, question_id: Uuid) -> StoreResult<u64>;
    async fn count_active_answers(&mut self, question_id: Uuid) -> StoreResult<i64>;
    async fn answer_ids(&mut self) -> StoreResult<Vec<Uuid>>;

    // ============ Comments ============
    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()>;
    async fn comment_by_id(&mut self, id: Uuid) -> StoreResult<Option<Comment>>;
    async fn comment_ids(&mut self) -> StoreResult<Vec<Uuid>>;

    // ============ Votes ============
    /// 투표 대상 row 잠금. 대상이 없거나 투표 불가 상태면 `false`
    async fn lock_target(&mut self, target: VoteTarget) -> StoreResult<bool>;
    async fn find_vote(&mut self, user_id: Uuid, target: VoteTarget) -> StoreResult<Option<Vote>>;
    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()>;
    async fn update_vote_type(&mut self, vote_id: Uuid, vote_type: VoteType) -> StoreResult<()>;
    async fn delete_vote(&mut self, user_id: Uuid, target: VoteTarget) -> StoreResult<Option<Vote>>;
    /// 활성 투표만 카운트
    async fn tally_votes(&mut self, target: VoteTarget) -> StoreResult<VoteTally>;
    async fn write_metrics(&mut self, target: VoteTarget, tally: VoteTally) -> StoreResult<()>;

    // ============ Notifications ============
    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()>;
    async fn list_notifications(
        &mut self,
        recipient: Uuid,
        status: Option<NotificationStatus>,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Notification>, i64)>;
    async fn count_unread(&mut self, recipient: Uuid) -> StoreResult<i64>;
    async fn mark_notification_read(
        &mut self,
        id: Uuid,
        recipient: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Notification>>;
    async fn mark_all_read(&mut self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<u64>;
    async fn delete_notification(&mut self, id: Uuid, recipient: Uuid) -> StoreResult<bool>;

    /// Commit. commit 없이 drop 하면 rollback
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
