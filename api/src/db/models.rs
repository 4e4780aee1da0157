//! Database Models
//!
//! Document models for the Q&A community: users, questions, answers, comments,
//! votes, tags and notifications. Reference fields hold the identifier of the
//! referenced document; derived counters live in the `*Metrics` structs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Enums ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
    Banned,
}

/// 질문 상태
///
/// ```text
/// active ──► closed ──► deleted
///   │  ▲        │
///   │  └────────┘
///   ├──► duplicate ──► deleted
///   └──► deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Active,
    Closed,
    Deleted,
    Duplicate,
}

impl QuestionStatus {
    pub fn can_transition_to(self, next: QuestionStatus) -> bool {
        use QuestionStatus::*;
        matches!(
            (self, next),
            (Active, Closed)
                | (Active, Deleted)
                | (Active, Duplicate)
                | (Closed, Active)
                | (Closed, Deleted)
                | (Duplicate, Deleted)
        )
    }

    /// deleted 상태는 모든 조회 경로에서 숨김
    pub fn is_visible(self) -> bool {
        self != QuestionStatus::Deleted
    }

    pub fn accepts_answers(self) -> bool {
        self == QuestionStatus::Active
    }
}

/// Answer / Comment 공용 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Active,
    Deleted,
    Hidden,
}

impl ContentStatus {
    pub fn can_transition_to(self, next: ContentStatus) -> bool {
        use ContentStatus::*;
        matches!(
            (self, next),
            (Active, Deleted) | (Active, Hidden) | (Hidden, Active) | (Hidden, Deleted)
        )
    }

    pub fn is_visible(self) -> bool {
        self == ContentStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "target_type")]
pub enum TargetType {
    Question,
    Answer,
    Comment,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Question => "Question",
            TargetType::Answer => "Answer",
            TargetType::Comment => "Comment",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Question" => Ok(TargetType::Question),
            "Answer" => Ok(TargetType::Answer),
            "Comment" => Ok(TargetType::Comment),
            other => Err(format!(
                "targetType must be one of Question, Answer, Comment (got '{}')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vote_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
    Archived,
}

// ============ Users ============

/// 사용자
///
/// credential_hash 는 외부 auth 서비스가 관리하며 응답에 절대 포함되지 않음
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub reputation: i64,
    pub role: UserRole,
    pub status: UserStatus,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Moderator | UserRole::Admin)
    }
}

// ============ Stats ============

/// 커뮤니티 전체 집계 (deleted 제외)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityCounts {
    pub total_questions: i64,
    pub total_answers: i64,
    pub total_users: i64,
    /// 최근 가입했거나 질문/답변을 작성한 사용자
    pub active_users: i64,
    pub questions_today: i64,
    pub answers_today: i64,
}

/// 한 사용자의 활동 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub questions_asked: i64,
    pub answers_given: i64,
    /// 작성한 질문 + 답변의 score 합
    pub total_votes: i64,
    pub accepted_answers: i64,
}

// ============ Questions ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMetrics {
    pub views: i64,
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
    pub answer_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[sqlx(rename = "author_id")]
    pub author: Uuid,
    /// 1~5개 태그 id
    #[sqlx(rename = "tag_ids")]
    pub tags: Vec<Uuid>,
    #[sqlx(rename = "accepted_answer_id")]
    pub accepted_answer: Option<Uuid>,
    #[sqlx(flatten)]
    pub metrics: QuestionMetrics,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============ Answers & Comments ============

/// Answer / Comment 의 투표 집계값
///
/// Score Aggregator 만 갱신함 (score = upvotes - downvotes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VoteMetrics {
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: Uuid,
    pub content: String,
    #[sqlx(rename = "author_id")]
    pub author: Uuid,
    #[sqlx(rename = "question_id")]
    pub question: Uuid,
    #[sqlx(flatten)]
    pub metrics: VoteMetrics,
    pub is_accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    #[sqlx(rename = "answer_id")]
    pub answer: Uuid,
    #[sqlx(rename = "author_id")]
    pub author: Uuid,
    pub content: String,
    #[sqlx(flatten)]
    pub metrics: VoteMetrics,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
}

// ============ Votes ============

/// 투표 대상 (document id + 종류)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoteTarget {
    pub id: Uuid,
    pub kind: TargetType,
}

impl VoteTarget {
    pub fn new(id: Uuid, kind: TargetType) -> Self {
        Self { id, kind }
    }

    pub fn question(id: Uuid) -> Self {
        Self::new(id, TargetType::Question)
    }

    pub fn answer(id: Uuid) -> Self {
        Self::new(id, TargetType::Answer)
    }

    pub fn comment(id: Uuid) -> Self {
        Self::new(id, TargetType::Comment)
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Vote ledger 레코드
///
/// (user, target, target_type) 당 최대 1개 (unique index)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Uuid,
    #[sqlx(rename = "user_id")]
    pub user: Uuid,
    #[sqlx(rename = "target_id")]
    pub target: Uuid,
    pub target_type: TargetType,
    pub vote_type: VoteType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(user: Uuid, target: VoteTarget, vote_type: VoteType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user,
            target: target.id,
            target_type: target.kind,
            vote_type,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn target_ref(&self) -> VoteTarget {
        VoteTarget::new(self.target, self.target_type)
    }
}

/// 활성 투표 카운트 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteTally {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteTally {
    pub fn score(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    pub fn to_metrics(self) -> VoteMetrics {
        VoteMetrics {
            upvotes: self.upvotes,
            downvotes: self.downvotes,
            score: self.score(),
        }
    }
}

// ============ Tags ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TagMetrics {
    pub question_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    /// 소문자 정규화된 이름 (unique)
    pub name: String,
    pub slug: String,
    #[sqlx(flatten)]
    pub metrics: TagMetrics,
    pub created_at: DateTime<Utc>,
}

// ============ Notifications ============

/// 알림 종류별 payload
///
/// 타입마다 필드가 고정된 tagged union (`{"type": ..., "data": {...}}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationPayload {
    AnswerReceived { question_id: Uuid, answer_id: Uuid },
    AnswerAccepted { question_id: Uuid, answer_id: Uuid },
    QuestionUpvoted { question_id: Uuid },
    AnswerUpvoted { question_id: Uuid, answer_id: Uuid },
    AnswerCommented { answer_id: Uuid, comment_id: Uuid },
    BadgeEarned { badge: String },
    ReputationMilestone { reputation: i64 },
    SystemAnnouncement { body: String },
    ModerationAction { action: String, reason: Option<String> },
}

impl NotificationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationPayload::AnswerReceived { .. } => "answer_received",
            NotificationPayload::AnswerAccepted { .. } => "answer_accepted",
            NotificationPayload::QuestionUpvoted { .. } => "question_upvoted",
            NotificationPayload::AnswerUpvoted { .. } => "answer_upvoted",
            NotificationPayload::AnswerCommented { .. } => "answer_commented",
            NotificationPayload::BadgeEarned { .. } => "badge_earned",
            NotificationPayload::ReputationMilestone { .. } => "reputation_milestone",
            NotificationPayload::SystemAnnouncement { .. } => "system_announcement",
            NotificationPayload::ModerationAction { .. } => "moderation_action",
        }
    }

    pub fn title(&self) -> String {
        match self {
            NotificationPayload::AnswerReceived { .. } => "New answer to your question".to_string(),
            NotificationPayload::AnswerAccepted { .. } => "Your answer was accepted".to_string(),
            NotificationPayload::QuestionUpvoted { .. } => "Your question was upvoted".to_string(),
            NotificationPayload::AnswerUpvoted { .. } => "Your answer was upvoted".to_string(),
            NotificationPayload::AnswerCommented { .. } => "New comment on your answer".to_string(),
            NotificationPayload::BadgeEarned { badge } => format!("Badge earned: {}", badge),
            NotificationPayload::ReputationMilestone { reputation } => {
                format!("Reputation milestone: {}", reputation)
            }
            NotificationPayload::SystemAnnouncement { .. } => "Announcement".to_string(),
            NotificationPayload::ModerationAction { action, .. } => {
                format!("Moderation action: {}", action)
            }
        }
    }

    pub fn message(&self, sender_name: Option<&str>) -> String {
        let who = sender_name.unwrap_or("Someone");
        match self {
            NotificationPayload::AnswerReceived { .. } => format!("{} answered your question", who),
            NotificationPayload::AnswerAccepted { .. } => format!("{} accepted your answer", who),
            NotificationPayload::QuestionUpvoted { .. } => format!("{} upvoted your question", who),
            NotificationPayload::AnswerUpvoted { .. } => format!("{} upvoted your answer", who),
            NotificationPayload::AnswerCommented { .. } => format!("{} commented on your answer", who),
            NotificationPayload::BadgeEarned { badge } => format!("You earned the {} badge", badge),
            NotificationPayload::ReputationMilestone { reputation } => {
                format!("You reached {} reputation", reputation)
            }
            NotificationPayload::SystemAnnouncement { body } => body.clone(),
            NotificationPayload::ModerationAction { reason, .. } => reason
                .clone()
                .unwrap_or_else(|| "A moderator acted on your content".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Uuid,
    pub sender: Option<Uuid>,
    #[serde(flatten)]
    pub payload: NotificationPayload,
    pub title: String,
    pub message: String,
    pub status: NotificationStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_status_transitions() {
        assert!(QuestionStatus::Active.can_transition_to(QuestionStatus::Deleted));
        assert!(QuestionStatus::Closed.can_transition_to(QuestionStatus::Active));
        assert!(!QuestionStatus::Deleted.can_transition_to(QuestionStatus::Active));
        assert!(!QuestionStatus::Duplicate.can_transition_to(QuestionStatus::Active));
    }

    #[test]
    fn test_content_status_deleted_is_terminal() {
        for next in [ContentStatus::Active, ContentStatus::Hidden, ContentStatus::Deleted] {
            assert!(!ContentStatus::Deleted.can_transition_to(next));
        }
        assert!(ContentStatus::Hidden.can_transition_to(ContentStatus::Active));
    }

    #[test]
    fn test_target_type_parse() {
        assert_eq!("Answer".parse::<TargetType>(), Ok(TargetType::Answer));
        assert!("answer".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_notification_payload_is_tagged() {
        let answer_id = Uuid::new_v4();
        let question_id = Uuid::new_v4();
        let payload = NotificationPayload::AnswerUpvoted { question_id, answer_id };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "answer_upvoted");
        assert_eq!(json["data"]["answer_id"], answer_id.to_string());

        let back: NotificationPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.kind(), "answer_upvoted");
    }

    #[test]
    fn test_tally_score() {
        let tally = VoteTally { upvotes: 3, downvotes: 5 };
        assert_eq!(tally.to_metrics(), VoteMetrics { upvotes: 3, downvotes: 5, score: -2 });
    }
}
