//! Tag Service
//!
//! 태그 이름은 trim + 소문자로 정규화되고, slug 는 공백을 `-` 로 치환함.
//! 없는 태그는 질문 생성 시 lazily 생성 (name unique index 기준 insert-or-fetch).

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::{Store, StoreResult, StoreTx, Tag, TagMetrics};
use crate::error::ApiError;
use crate::services::Validation;
use crate::types::{Page, PageRequest};

pub const MIN_TAGS: usize = 1;
pub const MAX_TAGS: usize = 5;

/// 정규화된 태그 이름
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagName {
    pub name: String,
    pub slug: String,
}

impl TagName {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let name = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let len = name.chars().count();
        if !(2..=50).contains(&len) {
            return Err(format!("Tag '{}' must be between 2 and 50 characters", raw.trim()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
        {
            return Err(format!(
                "Tag '{}' can only contain letters, numbers, hyphens, and underscores",
                raw.trim()
            ));
        }

        let slug = name.replace(' ', "-");
        Ok(Self { name, slug })
    }
}

/// 요청된 태그 목록 검증: 1~5개, 정규화 후 중복 제거
pub(crate) fn parse_tag_names(raw: &[String], validation: &mut Validation) -> Vec<TagName> {
    let mut names: Vec<TagName> = Vec::with_capacity(raw.len());
    let mut valid = true;

    for value in raw {
        match TagName::parse(value) {
            Ok(tag) if names.iter().any(|n| n.name == tag.name) => {}
            Ok(tag) => names.push(tag),
            Err(message) => {
                valid = false;
                validation.push("tags", message);
            }
        }
    }

    if valid && !(MIN_TAGS..=MAX_TAGS).contains(&names.len()) {
        validation.push(
            "tags",
            format!("Question must have between {} and {} tags", MIN_TAGS, MAX_TAGS),
        );
    }

    names
}

/// 이름 → id 변환. 없는 태그는 생성하고, 생성 개수를 함께 반환
pub(crate) async fn find_or_create_tags(
    tx: &mut dyn StoreTx,
    names: &[TagName],
) -> StoreResult<(Vec<Uuid>, usize)> {
    let mut ids = Vec::with_capacity(names.len());
    let mut created = 0;

    for tag_name in names {
        let candidate = Tag {
            id: Uuid::new_v4(),
            name: tag_name.name.clone(),
            slug: tag_name.slug.clone(),
            metrics: TagMetrics::default(),
            created_at: Utc::now(),
        };
        let (tag, is_new) = tx.find_or_insert_tag(&candidate).await?;
        if is_new {
            tracing::info!(name = %tag.name, "tag created");
            created += 1;
        }
        if !ids.contains(&tag.id) {
            ids.push(tag.id);
        }
    }

    Ok((ids, created))
}

pub struct TagService {
    store: Arc<dyn Store>,
}

impl TagService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, page: PageRequest) -> Result<Page<Tag>, ApiError> {
        let mut tx = self.store.begin().await?;
        let (tags, total) = tx.list_tags(&page).await?;
        Ok(Page::new(tags, page, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<Tag, ApiError> {
        let mut tx = self.store.begin().await?;
        tx.tag_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Tag".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_tag_name_normalization() {
        let tag = TagName::parse("  Rust   Async ").unwrap();
        assert_eq!(tag.name, "rust async");
        assert_eq!(tag.slug, "rust-async");
    }

    #[test]
    fn test_tag_name_rejects_symbols() {
        assert!(TagName::parse("c++").is_err());
        assert!(TagName::parse("a").is_err());
    }

    #[test]
    fn test_tag_count_bounds() {
        let mut v = Validation::default();
        parse_tag_names(&[], &mut v);
        assert!(v.finish().is_err());

        let mut v = Validation::default();
        parse_tag_names(&strings(&["a1", "b1", "c1", "d1", "e1", "f1"]), &mut v);
        assert!(v.finish().is_err());

        // 정규화 후 중복은 하나로 합쳐짐
        let mut v = Validation::default();
        let names = parse_tag_names(&strings(&["React", "react", "hooks"]), &mut v);
        assert!(v.finish().is_ok());
        assert_eq!(names.len(), 2);
    }
}
