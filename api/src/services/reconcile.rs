//! Reconciliation Job
//!
//! answer_count / vote metrics / accepted_answer 는 쓰기 트랜잭션에서 함께 갱신되지만,
//! 수동 DB 수정이나 장애 복구 후 drift 가 생길 수 있음. 주기적으로 원본(ledger,
//! answers)에서 다시 계산해 덮어씀. 대상 하나당 트랜잭션 하나.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::{Store, StoreResult, TargetType, VoteTarget};
use crate::services::votes::recompute_in;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub questions_checked: u64,
    pub answers_checked: u64,
    pub comments_checked: u64,
    /// 값이 실제로 바뀐 문서 수
    pub corrected: u64,
    pub counters_purged: u64,
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    /// 이보다 오래된 rate limit window 삭제
    counter_retention: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, counter_retention: Duration) -> Self {
        Self {
            store,
            counter_retention,
        }
    }

    pub async fn run_once(&self) -> StoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let (question_ids, answer_ids, comment_ids) = {
            let mut tx = self.store.begin().await?;
            (
                tx.question_ids().await?,
                tx.answer_ids().await?,
                tx.comment_ids().await?,
            )
        };

        for id in question_ids {
            report.questions_checked += 1;
            if self.reconcile_question(id).await? {
                report.corrected += 1;
            }
        }
        for id in answer_ids {
            report.answers_checked += 1;
            if self.reconcile_target(VoteTarget::answer(id)).await? {
                report.corrected += 1;
            }
        }
        for id in comment_ids {
            report.comments_checked += 1;
            if self.reconcile_target(VoteTarget::comment(id)).await? {
                report.corrected += 1;
            }
        }

        let retention = chrono::Duration::from_std(self.counter_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        report.counters_purged = self.store.purge_counters(Utc::now() - retention).await?;

        if report.corrected > 0 {
            tracing::warn!(?report, "reconciliation corrected drifted documents");
        } else {
            tracing::debug!(?report, "reconciliation finished");
        }
        Ok(report)
    }

    /// answer_count, 질문 vote metrics, stale accepted_answer
    async fn reconcile_question(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let Some(mut question) = tx.lock_question(id).await? else {
            return Ok(false);
        };

        let mut changed = false;

        let answer_count = tx.count_active_answers(id).await?;
        if answer_count != question.metrics.answer_count {
            tx.set_answer_count(id, answer_count).await?;
            changed = true;
        }

        let tally = recompute_in(tx.as_mut(), VoteTarget::question(id)).await?;
        if tally.upvotes != question.metrics.upvotes
            || tally.downvotes != question.metrics.downvotes
            || tally.score() != question.metrics.score
        {
            changed = true;
        }

        if let Some(accepted) = question.accepted_answer {
            let still_valid = tx
                .answer_by_id(accepted)
                .await?
                .is_some_and(|a| a.question == id && a.is_accepted && a.status.is_visible());
            if !still_valid {
                question.accepted_answer = None;
                question.updated_at = Utc::now();
                tx.save_question(&question).await?;
                changed = true;
            }
        }

        tx.commit().await?;
        if changed {
            tracing::info!(question_id = %id, answer_count, "question counters reconciled");
        }
        Ok(changed)
    }

    /// answer / comment vote metrics
    async fn reconcile_target(&self, target: VoteTarget) -> StoreResult<bool> {
        let mut tx = self.store.begin().await?;
        tx.lock_target(target).await?;

        let current = match target.kind {
            TargetType::Answer => tx.answer_by_id(target.id).await?.map(|a| a.metrics),
            TargetType::Comment => tx.comment_by_id(target.id).await?.map(|c| c.metrics),
            TargetType::Question => None,
        };
        let Some(current) = current else {
            return Ok(false);
        };

        let tally = tx.tally_votes(target).await?;
        if tally.to_metrics() == current {
            return Ok(false);
        }

        tx.write_metrics(target, tally).await?;
        tx.commit().await?;
        tracing::info!(%target, score = tally.score(), "vote metrics reconciled");
        Ok(true)
    }
}

/// 주기 실행 태스크 시작 (첫 tick 은 건너뜀)
pub fn spawn_reconciler(reconciler: Arc<Reconciler>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;

        tracing::info!("reconciler started (interval: {}s)", every.as_secs());

        loop {
            interval.tick().await;
            if let Err(e) = reconciler.run_once().await {
                tracing::error!("reconciliation failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, UserRole, Vote, VoteType};
    use crate::services::test_support::{seed_answer, seed_question, seed_user};
    use crate::services::{AnswerService, VoteService};

    #[tokio::test]
    async fn test_clean_store_needs_no_corrections() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let author = seed_user(&store, "author", UserRole::User).await;
        let voter = seed_user(&store, "voter", UserRole::User).await;
        let question = seed_question(&store, author.id).await;
        let answer = seed_answer(&store, question.id, author.id).await;
        VoteService::new(store.clone())
            .cast_vote(voter.id, VoteTarget::answer(answer.id), VoteType::Upvote)
            .await
            .unwrap();

        let report = Reconciler::new(store, Duration::from_secs(60))
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.questions_checked, 1);
        assert_eq!(report.answers_checked, 1);
        assert_eq!(report.corrected, 0);
    }

    #[tokio::test]
    async fn test_drifted_counters_are_rebuilt() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let author = seed_user(&store, "author", UserRole::User).await;
        let voter = seed_user(&store, "voter", UserRole::User).await;
        let question = seed_question(&store, author.id).await;
        let answer = seed_answer(&store, question.id, author.id).await;

        // ledger 만 기록하고 metrics 는 건드리지 않음 + answer_count 왜곡
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_vote(&Vote::new(voter.id, VoteTarget::answer(answer.id), VoteType::Downvote))
                .await
                .unwrap();
            tx.set_answer_count(question.id, 7).await.unwrap();
            tx.commit().await.unwrap();
        }

        let reconciler = Reconciler::new(store.clone(), Duration::from_secs(60));
        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report.corrected, 2);

        let mut tx = store.begin().await.unwrap();
        let q = tx.question_by_id(question.id).await.unwrap().unwrap();
        let a = tx.answer_by_id(answer.id).await.unwrap().unwrap();
        drop(tx);
        assert_eq!(q.metrics.answer_count, 1);
        assert_eq!(a.metrics.score, -1);

        // 두 번째 실행은 바뀌는 것이 없음
        assert_eq!(reconciler.run_once().await.unwrap().corrected, 0);
    }

    #[tokio::test]
    async fn test_stale_accepted_answer_is_cleared() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let author = seed_user(&store, "author", UserRole::User).await;
        let question = seed_question(&store, author.id).await;
        let answer = seed_answer(&store, question.id, author.id).await;
        AnswerService::new(store.clone())
            .accept_answer(answer.id, &author)
            .await
            .unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.clear_acceptance(question.id).await.unwrap();
            tx.commit().await.unwrap();
        }

        Reconciler::new(store.clone(), Duration::from_secs(60))
            .run_once()
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let q = tx.question_by_id(question.id).await.unwrap().unwrap();
        assert_eq!(q.accepted_answer, None);
    }
}
