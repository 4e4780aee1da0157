//! Community / dashboard stats

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{ActivityCounts, CommunityCounts, Store};
use crate::error::ApiError;

/// 이 기간 안에 가입했거나 글을 쓴 사용자를 active 로 집계
const ACTIVE_WINDOW_DAYS: i64 = 30;

/// 채택 답변 하나의 가중치
const ACCEPTED_ANSWER_POINTS: i64 = 5;

/// 개인 대시보드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(flatten)]
    pub activity: ActivityCounts,
    /// 받은 score + 채택 답변 가중치
    pub reputation: i64,
}

impl From<ActivityCounts> for DashboardStats {
    fn from(activity: ActivityCounts) -> Self {
        Self {
            reputation: activity.total_votes + activity.accepted_answers * ACCEPTED_ANSWER_POINTS,
            activity,
        }
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub struct StatsService {
    store: Arc<dyn Store>,
}

impl StatsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn community(&self) -> Result<CommunityCounts, ApiError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let counts = tx
            .community_counts(start_of_day(now), now - Duration::days(ACTIVE_WINDOW_DAYS))
            .await?;
        Ok(counts)
    }

    pub async fn dashboard(&self, user_id: Uuid) -> Result<DashboardStats, ApiError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.activity_counts(user_id).await?.into())
    }
}
