//! Question Service
//!
//! 질문 생성/수정/삭제는 태그 question_count 변경과 같은 트랜잭션에서 실행됨.
//! 삭제는 soft delete (status = deleted) 이며 모든 조회 경로에서 제외됨.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{Question, QuestionMetrics, QuestionStatus, Store, User};
use crate::error::ApiError;
use crate::services::tags::{find_or_create_tags, parse_tag_names};
use crate::services::Validation;
use crate::types::{Page, PageRequest};

const TITLE_LEN: std::ops::RangeInclusive<usize> = 10..=200;
const DESCRIPTION_LEN: std::ops::RangeInclusive<usize> = 20..=10000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// 부분 수정. status 는 close / reopen / duplicate 용 (삭제는 DELETE 로만)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<QuestionStatus>,
}

impl QuestionChanges {
    fn touches_content(&self) -> bool {
        self.title.is_some() || self.description.is_some() || self.tags.is_some()
    }
}

pub struct QuestionService {
    store: Arc<dyn Store>,
}

impl QuestionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, author: &User, input: NewQuestion) -> Result<Question, ApiError> {
        let mut validation = Validation::default();
        validation.length("title", &input.title, TITLE_LEN);
        validation.length("description", &input.description, DESCRIPTION_LEN);
        let tag_names = parse_tag_names(&input.tags, &mut validation);
        validation.finish()?;

        let mut tx = self.store.begin().await?;
        let (tag_ids, created_tags) = find_or_create_tags(tx.as_mut(), &tag_names).await?;

        let now = Utc::now();
        let question = Question {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            author: author.id,
            tags: tag_ids,
            accepted_answer: None,
            metrics: QuestionMetrics::default(),
            status: QuestionStatus::Active,
            created_at: now,
            updated_at: now,
        };

        tx.insert_question(&question).await?;
        tx.adjust_tag_question_count(&question.tags, 1).await?;
        tx.commit().await?;

        tracing::info!(
            question_id = %question.id,
            author = %author.id,
            created_tags,
            "question created"
        );
        Ok(question)
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<Question>, ApiError> {
        let mut tx = self.store.begin().await?;
        let (questions, total) = tx.list_questions(&page).await?;
        Ok(Page::new(questions, page, total))
    }

    /// 단건 조회 (조회수 +1)
    pub async fn get(&self, id: Uuid) -> Result<Question, ApiError> {
        let mut tx = self.store.begin().await?;
        let mut question = tx
            .question_by_id(id)
            .await?
            .filter(|q| q.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;

        tx.increment_views(id).await?;
        tx.commit().await?;

        question.metrics.views += 1;
        Ok(question)
    }

    pub async fn update(
        &self,
        requester: &User,
        id: Uuid,
        changes: QuestionChanges,
    ) -> Result<Question, ApiError> {
        let mut validation = Validation::default();
        if let Some(title) = &changes.title {
            validation.length("title", title, TITLE_LEN);
        }
        if let Some(description) = &changes.description {
            validation.length("description", description, DESCRIPTION_LEN);
        }
        let tag_names = changes
            .tags
            .as_ref()
            .map(|tags| parse_tag_names(tags, &mut validation));
        if changes.status == Some(QuestionStatus::Deleted) {
            validation.push("status", "Use DELETE to remove a question");
        }
        validation.finish()?;

        let mut tx = self.store.begin().await?;
        let mut question = tx
            .lock_question(id)
            .await?
            .filter(|q| q.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;

        let is_author = question.author == requester.id;
        if changes.touches_content() && !is_author {
            return Err(ApiError::NotAuthorized(
                "Only the author can edit this question".to_string(),
            ));
        }
        if changes.status.is_some() && !(is_author || requester.is_staff()) {
            return Err(ApiError::NotAuthorized(
                "Only the author or a moderator can change the status".to_string(),
            ));
        }

        if let Some(next) = changes.status {
            if next != question.status && !question.status.can_transition_to(next) {
                return Err(ApiError::invalid(
                    "status",
                    format!("Cannot change status from {:?} to {:?}", question.status, next),
                ));
            }
            question.status = next;
        }
        if let Some(title) = changes.title {
            question.title = title.trim().to_string();
        }
        if let Some(description) = changes.description {
            question.description = description.trim().to_string();
        }
        if let Some(names) = tag_names {
            let (new_ids, _) = find_or_create_tags(tx.as_mut(), &names).await?;
            let removed: Vec<_> = question
                .tags
                .iter()
                .filter(|t| !new_ids.contains(t))
                .copied()
                .collect();
            let added: Vec<_> = new_ids
                .iter()
                .filter(|t| !question.tags.contains(t))
                .copied()
                .collect();
            tx.adjust_tag_question_count(&removed, -1).await?;
            tx.adjust_tag_question_count(&added, 1).await?;
            question.tags = new_ids;
        }

        question.updated_at = Utc::now();
        tx.save_question(&question).await?;
        tx.commit().await?;

        tracing::info!(question_id = %id, status = ?question.status, "question updated");
        Ok(question)
    }

    /// soft delete (작성자 또는 moderator/admin)
    pub async fn delete(&self, requester: &User, id: Uuid) -> Result<(), ApiError> {
        let mut tx = self.store.begin().await?;
        let mut question = tx
            .lock_question(id)
            .await?
            .filter(|q| q.status.is_visible())
            .ok_or_else(|| ApiError::NotFound("Question".to_string()))?;

        if question.author != requester.id && !requester.is_staff() {
            return Err(ApiError::NotAuthorized(
                "Only the author or a moderator can delete this question".to_string(),
            ));
        }

        question.status = QuestionStatus::Deleted;
        question.updated_at = Utc::now();
        tx.save_question(&question).await?;
        tx.adjust_tag_question_count(&question.tags, -1).await?;
        tx.commit().await?;

        tracing::info!(question_id = %id, by = %requester.id, "question deleted");
        Ok(())
    }
}
