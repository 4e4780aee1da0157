//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 컬렉션 구조는?
//! A: document 하나 = row 하나, 참조는 id 컬럼
//!
//!    users, questions, answers, comments, votes, tags, notifications
//!    + rate_limit_counters (keyed, expiring counter)
//!
//! Q: 동시성 불변식은 어디서 보장하는가?
//! A: store 레벨
//!    1. votes (user_id, target_id, target_type) unique index
//!    2. answers (question_id) WHERE is_accepted partial unique index
//!    3. tags name / slug unique index
//!    4. 다중 document 변경은 하나의 트랜잭션 + row lock
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - acquire 타임아웃 처리

mod memory;
mod models;
mod postgres;
mod repository;

pub use memory::MemoryStore;
pub use models::*;
pub use repository::{Store, StoreError, StoreResult, StoreTx};

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use postgres::PgTx;

/// PostgreSQL document store
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx::new(tx)))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn hit_counter(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let start = window_start(Utc::now(), window);

        let (hits,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO rate_limit_counters (key, window_start, hits)
            VALUES ($1, $2, 1)
            ON CONFLICT (key, window_start)
            DO UPDATE SET hits = rate_limit_counters.hits + 1
            RETURNING hits
            "#,
        )
        .bind(key)
        .bind(start)
        .fetch_one(&self.pool)
        .await?;

        Ok(hits.max(0) as u64)
    }

    async fn purge_counters(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// `now` 가 속한 fixed window 의 시작 시각
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let secs = (window.as_secs() as i64).max(1);
    let ts = now.timestamp();
    DateTime::from_timestamp(ts - ts.rem_euclid(secs), 0).unwrap_or(now)
}
