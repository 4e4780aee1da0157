//! Answer Service & Acceptance Manager
//!
//! # Interview Q&A
//!
//! Q: 채택 이전 중에 "채택 답변 0개 또는 2개" 상태가 보이지 않는 이유는?
//! A: clear → set → question.accepted_answer 갱신을 한 트랜잭션에서 실행하고,
//!    질문 row 를 먼저 잠그기 때문. 동시에 같은 질문의 채택을 시도하는 요청은
//!    질문 row lock 에서 직렬화됨. partial unique index 가 마지막 방어선.
//!
//! Q: 락 순서는?
//! A: question → answer → comment 고정. 역순으로 잡는 경로가 없으므로 교착 없음.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{
    Answer, Comment, ContentStatus, NotificationPayload, Store, User, VoteMetrics,
};
use crate::error::ApiError;
use crate::services::notifications::emit;
use crate::services::{retry_on_conflict, Validation};

const CONTENT_LEN: std::ops::RangeInclusive<usize> = 20..=15000;
const COMMENT_LEN: std::ops::RangeInclusive<usize> = 1..=1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnswer {
    #[serde(alias = "questionId")]
    pub question: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerChanges {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub content: String,
}

pub struct AnswerService {
    store: Arc<dyn Store>,
}

impl AnswerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 질문의 활성 답변 (채택 답변 우선, score 내림차순)
    pub async fn list_for_question(&self, question_id: Uuid) -> Result<Vec<Answer>, ApiError> {
        let mut tx = self.store.begin().await?;
        tx.question_by_id(question_id)
            .await?
            .filter(|q| q.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;
        Ok(tx.answers_for_question(question_id).await?)
    }

    /// 답변 작성 + answer_count 증가 (같은 트랜잭션)
    pub async fn create_answer(&self, author: &User, input: NewAnswer) -> Result<Answer, ApiError> {
        let mut validation = Validation::default();
        validation.length("content", &input.content, CONTENT_LEN);
        validation.finish()?;

        let mut tx = self.store.begin().await?;
        let question = tx
            .lock_question(input.question)
            .await?
            .filter(|q| q.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;

        if !question.status.accepts_answers() {
            return Err(ApiError::invalid(
                "question",
                "This question is not accepting new answers",
            ));
        }

        let now = Utc::now();
        let answer = Answer {
            id: Uuid::new_v4(),
            content: input.content.trim().to_string(),
            author: author.id,
            question: question.id,
            metrics: VoteMetrics::default(),
            is_accepted: false,
            accepted_at: None,
            status: ContentStatus::Active,
            created_at: now,
            updated_at: now,
        };

        tx.insert_answer(&answer).await?;
        tx.adjust_answer_count(question.id, 1).await?;
        emit(
            tx.as_mut(),
            question.author,
            Some(author.id),
            NotificationPayload::AnswerReceived {
                question_id: question.id,
                answer_id: answer.id,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(answer_id = %answer.id, question_id = %question.id, "answer created");
        Ok(answer)
    }

    pub async fn update_answer(
        &self,
        requester: &User,
        id: Uuid,
        changes: AnswerChanges,
    ) -> Result<Answer, ApiError> {
        let mut validation = Validation::default();
        validation.length("content", &changes.content, CONTENT_LEN);
        validation.finish()?;

        let mut tx = self.store.begin().await?;
        let mut answer = tx
            .lock_answer(id)
            .await?
            .filter(|a| a.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Answer".to_string()))?;

        if answer.author != requester.id {
            return Err(ApiError::NotAuthorized(
                "Only the author can edit this answer".to_string(),
            ));
        }

        answer.content = changes.content.trim().to_string();
        answer.updated_at = Utc::now();
        tx.save_answer(&answer).await?;
        tx.commit().await?;

        Ok(answer)
    }

    /// soft delete. 채택된 답변이면 질문의 accepted_answer 도 해제
    pub async fn delete_answer(&self, requester: &User, id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.store.begin().await?;
        let question_id = tx
            .answer_by_id(id)
            .await?
            .filter(|a| a.status.is_visible())
            .map(|a| a.question)
            .ok_or_else(|| ApiError::NotFound("Answer".to_string()))?;

        let mut question = tx
            .lock_question(question_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;
        let mut answer = tx
            .lock_answer(id)
            .await?
            .filter(|a| a.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Answer".to_string()))?;

        if answer.author != requester.id && !requester.is_staff() {
            return Err(ApiError::NotAuthorized(
                "Only the author or a moderator can delete this answer".to_string(),
            ));
        }

        let was_accepted = answer.is_accepted;
        let now = Utc::now();
        answer.status = ContentStatus::Deleted;
        answer.is_accepted = false;
        answer.accepted_at = None;
        answer.updated_at = now;
        tx.save_answer(&answer).await?;
        tx.adjust_answer_count(question_id, -1).await?;

        if was_accepted || question.accepted_answer == Some(id) {
            question.accepted_answer = None;
            question.updated_at = now;
            tx.save_question(&question).await?;
        }

        tx.commit().await?;

        tracing::info!(answer_id = %id, by = %requester.id, was_accepted, "answer deleted");
        Ok(())
    }

    /// 답변 채택 (기존 채택은 같은 트랜잭션에서 해제)
    pub async fn accept_answer(&self, answer_id: Uuid, requester: &User) -> Result<Answer, ApiError> {
        retry_on_conflict("accept_answer", move || {
            self.try_accept_answer(answer_id, requester)
        })
        .await
    }

    async fn try_accept_answer(&self, answer_id: Uuid, requester: &User) -> Result<Answer, ApiError> {
        let mut tx = self.store.begin().await?;

        let question_id = tx
            .answer_by_id(answer_id)
            .await?
            .filter(|a| a.status.is_visible())
            .map(|a| a.question)
            .ok_or_else(|| ApiError::NotFound("Answer".to_string()))?;

        let mut question = tx
            .lock_question(question_id)
            .await?
            .filter(|q| q.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;

        if question.author != requester.id {
            return Err(ApiError::NotAuthorized(
                "Only the question author can accept answers".to_string(),
            ));
        }

        let mut answer = tx
            .lock_answer(answer_id)
            .await?
            .filter(|a| a.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Answer".to_string()))?;

        let previous = question.accepted_answer;
        tx.clear_acceptance(question.id).await?;

        let now = Utc::now();
        answer.is_accepted = true;
        answer.accepted_at = Some(now);
        tx.save_answer(&answer).await?;

        question.accepted_answer = Some(answer.id);
        question.updated_at = now;
        tx.save_question(&question).await?;

        emit(
            tx.as_mut(),
            answer.author,
            Some(requester.id),
            NotificationPayload::AnswerAccepted {
                question_id: question.id,
                answer_id: answer.id,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            %answer_id,
            question_id = %question.id,
            previous = ?previous,
            "answer accepted"
        );
        Ok(answer)
    }

    /// 활성 답변에 댓글 작성
    pub async fn create_comment(
        &self,
        author: &User,
        answer_id: Uuid,
        input: NewComment,
    ) -> Result<Comment, ApiError> {
        let mut validation = Validation::default();
        validation.length("content", &input.content, COMMENT_LEN);
        validation.finish()?;

        let mut tx = self.store.begin().await?;
        let answer = tx
            .answer_by_id(answer_id)
            .await?
            .filter(|a| a.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Answer".to_string()))?;

        let comment = Comment {
            id: Uuid::new_v4(),
            answer: answer.id,
            author: author.id,
            content: input.content.trim().to_string(),
            metrics: VoteMetrics::default(),
            status: ContentStatus::Active,
            created_at: Utc::now(),
        };

        tx.insert_comment(&comment).await?;
        emit(
            tx.as_mut(),
            answer.author,
            Some(author.id),
            NotificationPayload::AnswerCommented {
                answer_id: answer.id,
                comment_id: comment.id,
            },
        )
        .await?;
        tx.commit().await?;

        tracing::debug!(comment_id = %comment.id, %answer_id, "comment created");
        Ok(comment)
    }
}
