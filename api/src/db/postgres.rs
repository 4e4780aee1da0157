//! PostgreSQL transaction
//!
//! `StoreTx` 구현. 모든 쿼리는 하나의 `sqlx::Transaction` 위에서 실행되고
//! `lock_*` 는 `SELECT ... FOR UPDATE` 로 row 를 잠금

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, Postgres, Transaction};
use uuid::Uuid;

use super::models::{
    ActivityCounts, Answer, Comment, CommunityCounts, Notification, NotificationPayload, NotificationStatus, Question, Tag,
    TargetType, User, Vote, VoteTally, VoteTarget, VoteType,
};
use super::repository::{StoreError, StoreResult, StoreTx};
use crate::types::PageRequest;

const USER_COLUMNS: &str = "id, username, email, credential_hash, reputation, role, status, \
     bio, location, website, created_at";

const TAG_COLUMNS: &str = "id, name, slug, question_count, created_at";

const QUESTION_COLUMNS: &str = "id, title, description, author_id, tag_ids, accepted_answer_id, \
     views, upvotes, downvotes, score, answer_count, status, created_at, updated_at";

const ANSWER_COLUMNS: &str = "id, content, author_id, question_id, upvotes, downvotes, score, \
     is_accepted, accepted_at, status, created_at, updated_at";

const COMMENT_COLUMNS: &str =
    "id, answer_id, author_id, content, upvotes, downvotes, score, status, created_at";

const VOTE_COLUMNS: &str =
    "id, user_id, target_id, target_type, vote_type, is_active, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str =
    "id, recipient_id, sender_id, payload, title, message, status, read_at, created_at";

/// 대상 종류별 테이블
fn target_table(kind: TargetType) -> &'static str {
    match kind {
        TargetType::Question => "questions",
        TargetType::Answer => "answers",
        TargetType::Comment => "comments",
    }
}

/// 투표 가능 상태 조건
fn votable_condition(kind: TargetType) -> &'static str {
    match kind {
        TargetType::Question => "status <> 'deleted'",
        TargetType::Answer | TargetType::Comment => "status = 'active'",
    }
}

/// notifications row (payload 는 JSONB)
#[derive(FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    sender_id: Option<Uuid>,
    payload: Json<NotificationPayload>,
    title: String,
    message: String,
    status: NotificationStatus,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: row.id,
            recipient: row.recipient_id,
            sender: row.sender_id,
            payload: row.payload.0,
            title: row.title,
            message: row.message,
            status: row.status,
            read_at: row.read_at,
            created_at: row.created_at,
        }
    }
}

pub(crate) struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    async fn count(&mut self, sql: &str, id: Uuid) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn ids(&mut self, table: &str) -> StoreResult<Vec<Uuid>> {
        let sql = format!("SELECT id FROM {} ORDER BY created_at", table);
        let rows: Vec<(Uuid,)> = sqlx::query_as(&sql).fetch_all(&mut *self.tx).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    // ============ Users ============

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, credential_hash, reputation, role, status,
                               bio, location, website, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.credential_hash)
        .bind(user.reputation)
        .bind(user.role)
        .bind(user.status)
        .bind(&user.bio)
        .bind(&user.location)
        .bind(&user.website)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn user_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = $2, email = $3, status = $4, bio = $5, location = $6, website = $7
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.status)
        .bind(&user.bio)
        .bind(&user.location)
        .bind(&user.website)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn top_users(&mut self, limit: i64) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE status = 'active' \
             ORDER BY reputation DESC, username ASC LIMIT $1",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(users)
    }

    // ============ Stats ============

    async fn community_counts(
        &mut self,
        today: DateTime<Utc>,
        active_since: DateTime<Utc>,
    ) -> StoreResult<CommunityCounts> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM questions WHERE status <> 'deleted'),
                (SELECT COUNT(*) FROM answers WHERE status <> 'deleted'),
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM users u
                  WHERE u.created_at >= $2
                     OR EXISTS (SELECT 1 FROM questions q
                                 WHERE q.author_id = u.id AND q.created_at >= $2)
                     OR EXISTS (SELECT 1 FROM answers a
                                 WHERE a.author_id = u.id AND a.created_at >= $2)),
                (SELECT COUNT(*) FROM questions WHERE status <> 'deleted' AND created_at >= $1),
                (SELECT COUNT(*) FROM answers WHERE status <> 'deleted' AND created_at >= $1)
            "#,
        )
        .bind(today)
        .bind(active_since)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(CommunityCounts {
            total_questions: row.0,
            total_answers: row.1,
            total_users: row.2,
            active_users: row.3,
            questions_today: row.4,
            answers_today: row.5,
        })
    }

    async fn activity_counts(&mut self, user_id: Uuid) -> StoreResult<ActivityCounts> {
        let (questions_asked, answers_given, total_votes, accepted_answers): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM questions WHERE author_id = $1 AND status <> 'deleted'),
                    (SELECT COUNT(*) FROM answers WHERE author_id = $1 AND status <> 'deleted'),
                    (SELECT COALESCE(SUM(score), 0)::BIGINT FROM questions
                      WHERE author_id = $1 AND status <> 'deleted')
                  + (SELECT COALESCE(SUM(score), 0)::BIGINT FROM answers
                      WHERE author_id = $1 AND status <> 'deleted'),
                    (SELECT COUNT(*) FROM answers
                      WHERE author_id = $1 AND is_accepted AND status <> 'deleted')
                "#,
            )
            .bind(user_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(ActivityCounts {
            questions_asked,
            answers_given,
            total_votes,
            accepted_answers,
        })
    }

    // ============ Tags ============

    async fn find_or_insert_tag(&mut self, tag: &Tag) -> StoreResult<(Tag, bool)> {
        // ON CONFLICT DO NOTHING: 동시 생성 시에도 트랜잭션이 abort 되지 않음
        let sql = format!(
            r#"
            INSERT INTO tags (id, name, slug, question_count, created_at)
            VALUES ($1, $2, $3, 0, $4)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            TAG_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Tag>(&sql)
            .bind(tag.id)
            .bind(&tag.name)
            .bind(&tag.slug)
            .bind(tag.created_at)
            .fetch_optional(&mut *self.tx)
            .await?;

        if let Some(created) = inserted {
            return Ok((created, true));
        }

        let sql = format!(
            "SELECT {} FROM tags WHERE name = $1 OR slug = $2 LIMIT 1",
            TAG_COLUMNS
        );
        let existing = sqlx::query_as::<_, Tag>(&sql)
            .bind(&tag.name)
            .bind(&tag.slug)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("tag '{}' vanished after conflict", tag.name)))?;

        Ok((existing, false))
    }

    async fn tag_by_id(&mut self, id: Uuid) -> StoreResult<Option<Tag>> {
        let sql = format!("SELECT {} FROM tags WHERE id = $1", TAG_COLUMNS);
        let tag = sqlx::query_as::<_, Tag>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(tag)
    }

    async fn list_tags(&mut self, page: &PageRequest) -> StoreResult<(Vec<Tag>, i64)> {
        let sql = format!(
            "SELECT {} FROM tags ORDER BY question_count DESC, name ASC LIMIT $1 OFFSET $2",
            TAG_COLUMNS
        );
        let tags = sqlx::query_as::<_, Tag>(&sql)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&mut *self.tx)
            .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags")
            .fetch_one(&mut *self.tx)
            .await?;

        Ok((tags, total))
    }

    async fn adjust_tag_question_count(&mut self, ids: &[Uuid], delta: i64) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE tags SET question_count = GREATEST(question_count + $2, 0) WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(delta)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    // ============ Questions ============

    async fn insert_question(&mut self, question: &Question) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO questions (
                id, title, description, author_id, tag_ids, accepted_answer_id,
                views, upvotes, downvotes, score, answer_count, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(question.id)
        .bind(&question.title)
        .bind(&question.description)
        .bind(question.author)
        .bind(&question.tags)
        .bind(question.accepted_answer)
        .bind(question.metrics.views)
        .bind(question.metrics.upvotes)
        .bind(question.metrics.downvotes)
        .bind(question.metrics.score)
        .bind(question.metrics.answer_count)
        .bind(question.status)
        .bind(question.created_at)
        .bind(question.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn question_by_id(&mut self, id: Uuid) -> StoreResult<Option<Question>> {
        let sql = format!("SELECT {} FROM questions WHERE id = $1", QUESTION_COLUMNS);
        let question = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(question)
    }

    async fn lock_question(&mut self, id: Uuid) -> StoreResult<Option<Question>> {
        let sql = format!(
            "SELECT {} FROM questions WHERE id = $1 FOR UPDATE",
            QUESTION_COLUMNS
        );
        let question = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(question)
    }

    async fn list_questions(&mut self, page: &PageRequest) -> StoreResult<(Vec<Question>, i64)> {
        let sql = format!(
            r#"
            SELECT {} FROM questions
            WHERE status <> 'deleted'
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
            QUESTION_COLUMNS
        );
        let questions = sqlx::query_as::<_, Question>(&sql)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&mut *self.tx)
            .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM questions WHERE status <> 'deleted'")
                .fetch_one(&mut *self.tx)
                .await?;

        Ok((questions, total))
    }

    async fn save_question(&mut self, question: &Question) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE questions
            SET title = $2, description = $3, tag_ids = $4, accepted_answer_id = $5,
                status = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(question.id)
        .bind(&question.title)
        .bind(&question.description)
        .bind(&question.tags)
        .bind(question.accepted_answer)
        .bind(question.status)
        .bind(question.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn increment_views(&mut self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE questions SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn adjust_answer_count(&mut self, id: Uuid, delta: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE questions SET answer_count = GREATEST(answer_count + $2, 0) WHERE id = $1",
        )
        .bind(id)
        .bind(delta)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_answer_count(&mut self, id: Uuid, count: i64) -> StoreResult<()> {
        sqlx::query("UPDATE questions SET answer_count = $2 WHERE id = $1")
            .bind(id)
            .bind(count)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn question_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        self.ids("questions").await
    }

    // ============ Answers ============

    async fn insert_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO answers (
                id, content, author_id, question_id, upvotes, downvotes, score,
                is_accepted, accepted_at, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(answer.id)
        .bind(&answer.content)
        .bind(answer.author)
        .bind(answer.question)
        .bind(answer.metrics.upvotes)
        .bind(answer.metrics.downvotes)
        .bind(answer.metrics.score)
        .bind(answer.is_accepted)
        .bind(answer.accepted_at)
        .bind(answer.status)
        .bind(answer.created_at)
        .bind(answer.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn answer_by_id(&mut self, id: Uuid) -> StoreResult<Option<Answer>> {
        let sql = format!("SELECT {} FROM answers WHERE id = $1", ANSWER_COLUMNS);
        let answer = sqlx::query_as::<_, Answer>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(answer)
    }

    async fn lock_answer(&mut self, id: Uuid) -> StoreResult<Option<Answer>> {
        let sql = format!("SELECT {} FROM answers WHERE id = $1 FOR UPDATE", ANSWER_COLUMNS);
        let answer = sqlx::query_as::<_, Answer>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(answer)
    }

    async fn answers_for_question(&mut self, question_id: Uuid) -> StoreResult<Vec<Answer>> {
        let sql = format!(
            r#"
            SELECT {} FROM answers
            WHERE question_id = $1 AND status = 'active'
            ORDER BY is_accepted DESC, score DESC, created_at ASC
            "#,
            ANSWER_COLUMNS
        );
        let answers = sqlx::query_as::<_, Answer>(&sql)
            .bind(question_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(answers)
    }

    async fn save_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE answers
            SET content = $2, status = $3, is_accepted = $4, accepted_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(answer.id)
        .bind(&answer.content)
        .bind(answer.status)
        .bind(answer.is_accepted)
        .bind(answer.accepted_at)
        .bind(answer.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn clear_acceptance(&mut self, question_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE answers SET is_accepted = FALSE, accepted_at = NULL
            WHERE question_id = $1 AND is_accepted
            "#,
        )
        .bind(question_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_active_answers(&mut self, question_id: Uuid) -> StoreResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM answers WHERE question_id = $1 AND status = 'active'",
            question_id,
        )
        .await
    }

    async fn answer_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        self.ids("answers").await
    }

    // ============ Comments ============

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO comments (
                id, answer_id, author_id, content, upvotes, downvotes, score, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(comment.id)
        .bind(comment.answer)
        .bind(comment.author)
        .bind(&comment.content)
        .bind(comment.metrics.upvotes)
        .bind(comment.metrics.downvotes)
        .bind(comment.metrics.score)
        .bind(comment.status)
        .bind(comment.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn comment_by_id(&mut self, id: Uuid) -> StoreResult<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(comment)
    }

    async fn comment_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        self.ids("comments").await
    }

    // ============ Votes ============

    async fn lock_target(&mut self, target: VoteTarget) -> StoreResult<bool> {
        let sql = format!(
            "SELECT id FROM {} WHERE id = $1 AND {} FOR UPDATE",
            target_table(target.kind),
            votable_condition(target.kind)
        );
        let row: Option<(Uuid,)> = sqlx::query_as(&sql)
            .bind(target.id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn find_vote(&mut self, user_id: Uuid, target: VoteTarget) -> StoreResult<Option<Vote>> {
        let sql = format!(
            "SELECT {} FROM votes WHERE user_id = $1 AND target_id = $2 AND target_type = $3",
            VOTE_COLUMNS
        );
        let vote = sqlx::query_as::<_, Vote>(&sql)
            .bind(user_id)
            .bind(target.id)
            .bind(target.kind)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(vote)
    }

    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO votes (id, user_id, target_id, target_type, vote_type, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(vote.id)
        .bind(vote.user)
        .bind(vote.target)
        .bind(vote.target_type)
        .bind(vote.vote_type)
        .bind(vote.is_active)
        .bind(vote.created_at)
        .bind(vote.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_vote_type(&mut self, vote_id: Uuid, vote_type: VoteType) -> StoreResult<()> {
        sqlx::query("UPDATE votes SET vote_type = $2, updated_at = NOW() WHERE id = $1")
            .bind(vote_id)
            .bind(vote_type)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_vote(&mut self, user_id: Uuid, target: VoteTarget) -> StoreResult<Option<Vote>> {
        let sql = format!(
            r#"
            DELETE FROM votes
            WHERE user_id = $1 AND target_id = $2 AND target_type = $3
            RETURNING {}
            "#,
            VOTE_COLUMNS
        );
        let vote = sqlx::query_as::<_, Vote>(&sql)
            .bind(user_id)
            .bind(target.id)
            .bind(target.kind)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(vote)
    }

    async fn tally_votes(&mut self, target: VoteTarget) -> StoreResult<VoteTally> {
        let (upvotes, downvotes): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE vote_type = 'upvote'),
                COUNT(*) FILTER (WHERE vote_type = 'downvote')
            FROM votes
            WHERE target_id = $1 AND target_type = $2 AND is_active
            "#,
        )
        .bind(target.id)
        .bind(target.kind)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(VoteTally { upvotes, downvotes })
    }

    async fn write_metrics(&mut self, target: VoteTarget, tally: VoteTally) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET upvotes = $2, downvotes = $3, score = $4 WHERE id = $1",
            target_table(target.kind)
        );
        sqlx::query(&sql)
            .bind(target.id)
            .bind(tally.upvotes)
            .bind(tally.downvotes)
            .bind(tally.score())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    // ============ Notifications ============

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient_id, sender_id, kind, payload, title, message, status, read_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(notification.id)
        .bind(notification.recipient)
        .bind(notification.sender)
        .bind(notification.payload.kind())
        .bind(Json(&notification.payload))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.status)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_notifications(
        &mut self,
        recipient: Uuid,
        status: Option<NotificationStatus>,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Notification>, i64)> {
        let sql = format!(
            r#"
            SELECT {} FROM notifications
            WHERE recipient_id = $1 AND ($2::notification_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(recipient)
            .bind(status)
            .bind(i64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&mut *self.tx)
            .await?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE recipient_id = $1 AND ($2::notification_status IS NULL OR status = $2)
            "#,
        )
        .bind(recipient)
        .bind(status)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok((rows.into_iter().map(Notification::from).collect(), total))
    }

    async fn count_unread(&mut self, recipient: Uuid) -> StoreResult<i64> {
        self.count(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND status = 'unread'",
            recipient,
        )
        .await
    }

    async fn mark_notification_read(
        &mut self,
        id: Uuid,
        recipient: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Notification>> {
        let sql = format!(
            r#"
            UPDATE notifications SET status = 'read', read_at = $3
            WHERE id = $1 AND recipient_id = $2
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(id)
            .bind(recipient)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Notification::from))
    }

    async fn mark_all_read(&mut self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET status = 'read', read_at = $2
            WHERE recipient_id = $1 AND status = 'unread'
            "#,
        )
        .bind(recipient)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&mut self, id: Uuid, recipient: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
            .bind(id)
            .bind(recipient)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
