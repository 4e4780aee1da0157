//! Vote Ledger & Score Aggregator
//!
//! # Flow
//!
//! ```text
//! cast_vote / remove_vote
//!   └─ BEGIN
//!        ├─ lock target row          (404 if missing / not votable)
//!        ├─ ledger mutation          (insert | switch | delete)
//!        ├─ recompute                (full recount → upvotes, downvotes, score)
//!        └─ notification (upvote)
//!      COMMIT
//! ```
//!
//! 점수는 항상 ledger 전체 재집계 결과이며 delta 로 패치하지 않음.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::{
    NotificationPayload, Store, StoreResult, StoreTx, TargetType, Vote, VoteTally, VoteTarget,
    VoteType,
};
use crate::error::ApiError;
use crate::services::notifications::emit;
use crate::services::retry_on_conflict;

/// 투표 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Created,
    /// 기존 투표의 vote_type 변경 (row 수는 그대로)
    Switched { from: VoteType },
}

#[derive(Debug, Clone, Copy)]
pub struct VoteReceipt {
    pub outcome: VoteOutcome,
    pub tally: VoteTally,
}

impl VoteReceipt {
    pub fn message(&self) -> &'static str {
        match self.outcome {
            VoteOutcome::Created => "Vote recorded successfully",
            VoteOutcome::Switched { .. } => "Vote updated successfully",
        }
    }
}

/// 대상의 활성 투표를 다시 세어 metrics 에 기록
///
/// 같은 트랜잭션 안에서 ledger 변경 직후 호출됨. 멱등.
pub(crate) async fn recompute_in(
    tx: &mut dyn StoreTx,
    target: VoteTarget,
) -> StoreResult<VoteTally> {
    let tally = tx.tally_votes(target).await?;
    tx.write_metrics(target, tally).await?;
    Ok(tally)
}

pub struct VoteService {
    store: Arc<dyn Store>,
}

impl VoteService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 투표 기록 / 변경
    ///
    /// 동시 첫 투표가 unique index 에 걸리면 한 번 재시도
    pub async fn cast_vote(
        &self,
        user_id: Uuid,
        target: VoteTarget,
        vote_type: VoteType,
    ) -> Result<VoteReceipt, ApiError> {
        retry_on_conflict("cast_vote", move || {
            self.try_cast_vote(user_id, target, vote_type)
        })
        .await
    }

    async fn try_cast_vote(
        &self,
        user_id: Uuid,
        target: VoteTarget,
        vote_type: VoteType,
    ) -> Result<VoteReceipt, ApiError> {
        let mut tx = self.store.begin().await?;

        if !tx.lock_target(target).await? {
            return Err(ApiError::NotFound(target.kind.to_string()));
        }

        let outcome = match tx.find_vote(user_id, target).await? {
            Some(existing) if existing.vote_type == vote_type => {
                return Err(ApiError::DuplicateVote);
            }
            Some(existing) => {
                tx.update_vote_type(existing.id, vote_type).await?;
                VoteOutcome::Switched { from: existing.vote_type }
            }
            None => {
                tx.insert_vote(&Vote::new(user_id, target, vote_type)).await?;
                VoteOutcome::Created
            }
        };

        let tally = recompute_in(tx.as_mut(), target).await?;

        if vote_type == VoteType::Upvote {
            notify_upvote(tx.as_mut(), user_id, target).await?;
        }

        tx.commit().await?;

        tracing::info!(
            %user_id,
            %target,
            ?vote_type,
            ?outcome,
            score = tally.score(),
            "vote recorded"
        );

        Ok(VoteReceipt { outcome, tally })
    }

    /// 투표 취소
    pub async fn remove_vote(&self, user_id: Uuid, target: VoteTarget) -> Result<VoteTally, ApiError> {
        let mut tx = self.store.begin().await?;

        // 대상이 삭제된 뒤에도 본인 투표는 취소할 수 있음
        tx.lock_target(target).await?;

        if tx.delete_vote(user_id, target).await?.is_none() {
            return Err(ApiError::VoteNotFound);
        }

        let tally = recompute_in(tx.as_mut(), target).await?;
        tx.commit().await?;

        tracing::info!(%user_id, %target, score = tally.score(), "vote removed");
        Ok(tally)
    }

    /// 단독 재집계 (reconciliation / 관리용)
    pub async fn recompute(&self, target: VoteTarget) -> Result<VoteTally, ApiError> {
        let mut tx = self.store.begin().await?;
        tx.lock_target(target).await?;
        let tally = recompute_in(tx.as_mut(), target).await?;
        tx.commit().await?;
        Ok(tally)
    }
}

/// 업보트 알림 (작성자 본인 투표는 제외)
async fn notify_upvote(tx: &mut dyn StoreTx, voter: Uuid, target: VoteTarget) -> StoreResult<()> {
    let (recipient, payload) = match target.kind {
        TargetType::Question => match tx.question_by_id(target.id).await? {
            Some(q) => (q.author, NotificationPayload::QuestionUpvoted { question_id: q.id }),
            None => return Ok(()),
        },
        TargetType::Answer => match tx.answer_by_id(target.id).await? {
            Some(a) => (
                a.author,
                NotificationPayload::AnswerUpvoted {
                    question_id: a.question,
                    answer_id: a.id,
                },
            ),
            None => return Ok(()),
        },
        TargetType::Comment => return Ok(()),
    };

    emit(tx, recipient, Some(voter), payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, StoreError, UserRole};
    use crate::services::test_support::{seed_answer, seed_question, seed_user};
    use tokio_test::assert_ok;

    async fn setup() -> (Arc<dyn Store>, VoteService, Uuid, VoteTarget) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let author = seed_user(&store, "author", UserRole::User).await;
        let question = seed_question(&store, author.id).await;
        let answer = seed_answer(&store, question.id, author.id).await;
        let voter = seed_user(&store, "voter", UserRole::User).await;
        let service = VoteService::new(store.clone());
        (store, service, voter.id, VoteTarget::answer(answer.id))
    }

    async fn vote_rows(store: &Arc<dyn Store>, user_id: Uuid, target: VoteTarget) -> usize {
        let mut tx = store.begin().await.unwrap();
        usize::from(tx.find_vote(user_id, target).await.unwrap().is_some())
    }

    #[tokio::test]
    async fn test_upvote_switch_remove_scenario() {
        let (_store, service, voter, target) = setup().await;

        let receipt = service.cast_vote(voter, target, VoteType::Upvote).await.unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Created);
        assert_eq!(receipt.tally.score(), 1);

        let receipt = service.cast_vote(voter, target, VoteType::Downvote).await.unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Switched { from: VoteType::Upvote });
        assert_eq!(receipt.tally.score(), -1);

        let tally = service.remove_vote(voter, target).await.unwrap();
        assert_eq!(tally, VoteTally::default());
    }

    #[tokio::test]
    async fn test_duplicate_vote_leaves_ledger_unchanged() {
        let (store, service, voter, target) = setup().await;

        assert_ok!(service.cast_vote(voter, target, VoteType::Upvote).await);
        let err = service.cast_vote(voter, target, VoteType::Upvote).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateVote));

        assert_eq!(vote_rows(&store, voter, target).await, 1);
        let tally = service.recompute(target).await.unwrap();
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });
    }

    #[tokio::test]
    async fn test_switch_updates_in_place_and_drops_score_by_two() {
        let (store, service, voter, target) = setup().await;
        let other = seed_user(&store, "other", UserRole::User).await;

        service.cast_vote(other.id, target, VoteType::Upvote).await.unwrap();
        let before = service.cast_vote(voter, target, VoteType::Upvote).await.unwrap();
        let after = service.cast_vote(voter, target, VoteType::Downvote).await.unwrap();

        assert_eq!(before.tally.score() - after.tally.score(), 2);
        assert_eq!(vote_rows(&store, voter, target).await, 1);
    }

    #[tokio::test]
    async fn test_remove_missing_vote_keeps_metrics() {
        let (store, service, voter, target) = setup().await;
        let other = seed_user(&store, "other", UserRole::User).await;
        service.cast_vote(other.id, target, VoteType::Downvote).await.unwrap();

        let err = service.remove_vote(voter, target).await.unwrap_err();
        assert!(matches!(err, ApiError::VoteNotFound));

        let mut tx = store.begin().await.unwrap();
        let answer = tx.answer_by_id(target.id).await.unwrap().unwrap();
        assert_eq!(answer.metrics.score, -1);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let (_store, service, voter, target) = setup().await;
        service.cast_vote(voter, target, VoteType::Upvote).await.unwrap();

        let first = service.recompute(target).await.unwrap();
        let second = service.recompute(target).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_vote_on_missing_target_is_not_found() {
        let (_store, service, voter, _target) = setup().await;
        let err = service
            .cast_vote(voter, VoteTarget::question(Uuid::new_v4()), VoteType::Upvote)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upvote_notifies_author_once() {
        let (store, service, voter, target) = setup().await;
        service.cast_vote(voter, target, VoteType::Upvote).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let answer = tx.answer_by_id(target.id).await.unwrap().unwrap();
        assert_eq!(tx.count_unread(answer.author).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_votes_keep_one_row() {
        let (store, service, voter, target) = setup().await;
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.cast_vote(voter, target, VoteType::Upvote).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    assert_eq!(receipt.outcome, VoteOutcome::Created);
                    created += 1;
                }
                Err(err) => assert!(matches!(err, ApiError::DuplicateVote), "{:?}", err),
            }
        }

        assert_eq!(created, 1);
        assert_eq!(vote_rows(&store, voter, target).await, 1);
        let tally = service.recompute(target).await.unwrap();
        assert_eq!(tally, VoteTally { upvotes: 1, downvotes: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_voters_all_counted() {
        let (store, service, _voter, target) = setup().await;
        let service = Arc::new(service);

        let mut voters = Vec::new();
        for i in 0..6 {
            voters.push(seed_user(&store, &format!("crowd{}", i), UserRole::User).await.id);
        }

        let handles: Vec<_> = voters
            .iter()
            .enumerate()
            .map(|(i, &voter)| {
                let service = service.clone();
                let vote_type = if i % 3 == 0 { VoteType::Downvote } else { VoteType::Upvote };
                tokio::spawn(async move { service.cast_vote(voter, target, vote_type).await })
            })
            .collect();
        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        let mut tx = store.begin().await.unwrap();
        let answer = tx.answer_by_id(target.id).await.unwrap().unwrap();
        assert_eq!(answer.metrics.upvotes, 4);
        assert_eq!(answer.metrics.downvotes, 2);
        assert_eq!(answer.metrics.score, 2);
    }

    #[tokio::test]
    async fn test_existing_ledger_row_blocks_same_vote() {
        let (store, service, voter, target) = setup().await;

        // 다른 경로로 먼저 기록된 투표 (metrics 미반영 상태)
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_vote(&Vote::new(voter, target, VoteType::Upvote)).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = service.cast_vote(voter, target, VoteType::Upvote).await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateVote));
        assert_eq!(vote_rows(&store, voter, target).await, 1);

        let receipt = service.cast_vote(voter, target, VoteType::Downvote).await.unwrap();
        assert_eq!(receipt.outcome, VoteOutcome::Switched { from: VoteType::Upvote });
        assert_eq!(receipt.tally, VoteTally { upvotes: 0, downvotes: 1 });
    }

    #[tokio::test]
    async fn test_second_ledger_insert_is_a_conflict() {
        let (store, _service, voter, target) = setup().await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_vote(&Vote::new(voter, target, VoteType::Upvote)).await.unwrap();
        let err = tx
            .insert_vote(&Vote::new(voter, target, VoteType::Downvote))
            .await
            .unwrap_err();
        assert!(matches!(&err, StoreError::UniqueViolation(c) if c == "votes_user_target_key"));
        assert!(matches!(ApiError::from(err), ApiError::Conflict(_)));
    }
}
