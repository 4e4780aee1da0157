//! Notification Service
//!
//! 알림은 트리거가 된 변경과 같은 트랜잭션 안에서 기록됨
//! (답변 생성, 채택, 업보트, 댓글). 조회/읽음 처리는 수신자 본인만 가능.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::{
    Notification, NotificationPayload, NotificationStatus, Store, StoreResult, StoreTx,
};
use crate::error::ApiError;
use crate::types::{Page, PageRequest};

/// 알림 기록. 수신자와 발신자가 같으면 아무것도 하지 않음
pub(crate) async fn emit(
    tx: &mut dyn StoreTx,
    recipient: Uuid,
    sender: Option<Uuid>,
    payload: NotificationPayload,
) -> StoreResult<()> {
    if sender == Some(recipient) {
        return Ok(());
    }

    let sender_name = match sender {
        Some(id) => tx.user_by_id(id).await?.map(|u| u.username),
        None => None,
    };

    let notification = Notification {
        id: Uuid::new_v4(),
        recipient,
        sender,
        title: payload.title(),
        message: payload.message(sender_name.as_deref()),
        payload,
        status: NotificationStatus::Unread,
        read_at: None,
        created_at: Utc::now(),
    };

    tx.insert_notification(&notification).await?;
    tracing::debug!(%recipient, kind = notification.payload.kind(), "notification emitted");
    Ok(())
}

pub struct NotificationService {
    store: Arc<dyn Store>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        recipient: Uuid,
        status: Option<NotificationStatus>,
        page: PageRequest,
    ) -> Result<Page<Notification>, ApiError> {
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_notifications(recipient, status, &page).await?;
        Ok(Page::new(items, page, total))
    }

    pub async fn unread_count(&self, recipient: Uuid) -> Result<i64, ApiError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.count_unread(recipient).await?)
    }

    pub async fn mark_read(&self, id: Uuid, recipient: Uuid) -> Result<Notification, ApiError> {
        let mut tx = self.store.begin().await?;
        let notification = tx
            .mark_notification_read(id, recipient, Utc::now())
            .await?
            .ok_or_else(|| ApiError::NotFound("Notification".to_string()))?;
        tx.commit().await?;
        Ok(notification)
    }

    pub async fn mark_all_read(&self, recipient: Uuid) -> Result<u64, ApiError> {
        let mut tx = self.store.begin().await?;
        let updated = tx.mark_all_read(recipient, Utc::now()).await?;
        tx.commit().await?;
        tracing::debug!(%recipient, updated, "notifications marked read");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid, recipient: Uuid) -> Result<(), ApiError> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_notification(id, recipient).await? {
            return Err(ApiError::NotFound("Notification".to_string()));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, UserRole};
    use crate::services::test_support::seed_user;

    async fn seed_notification(store: &Arc<dyn Store>, recipient: Uuid, sender: Uuid) {
        let mut tx = store.begin().await.unwrap();
        emit(
            tx.as_mut(),
            recipient,
            Some(sender),
            NotificationPayload::QuestionUpvoted { question_id: Uuid::new_v4() },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_self_notification_is_skipped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let user = seed_user(&store, "alice", UserRole::User).await;
        seed_notification(&store, user.id, user.id).await;

        let service = NotificationService::new(store);
        assert_eq!(service.unread_count(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inbox_read_flow() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let alice = seed_user(&store, "alice", UserRole::User).await;
        let bob = seed_user(&store, "bob", UserRole::User).await;
        seed_notification(&store, alice.id, bob.id).await;
        seed_notification(&store, alice.id, bob.id).await;

        let service = NotificationService::new(store);
        let page = service.list(alice.id, None, PageRequest::default()).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].message, "bob upvoted your question");

        let first = page.items[0].id;
        let read = service.mark_read(first, alice.id).await.unwrap();
        assert_eq!(read.status, NotificationStatus::Read);
        assert_eq!(service.unread_count(alice.id).await.unwrap(), 1);

        // 다른 사용자의 알림은 건드릴 수 없음
        let err = service.delete(first, bob.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        assert_eq!(service.mark_all_read(alice.id).await.unwrap(), 1);
        let unread = service
            .list(alice.id, Some(NotificationStatus::Unread), PageRequest::default())
            .await
            .unwrap();
        assert!(unread.items.is_empty());
    }
}
