//! In-memory document store
//!
//! 개발 / 테스트용 `Store` 구현. 트랜잭션은 전역 mutex 를 잡고 상태의
//! working copy 위에서 실행되며, commit 시에만 반영됨. unique index 는
//! PostgreSQL 스키마와 같은 제약을 직접 검사함.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::models::{
    ActivityCounts, Answer, Comment, CommunityCounts, ContentStatus, Notification, NotificationStatus, Question, QuestionStatus,
    Tag, TargetType, User, UserStatus, Vote, VoteTally, VoteTarget, VoteType,
};
use super::repository::{Store, StoreError, StoreResult, StoreTx};
use super::window_start;
use crate::types::PageRequest;

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    tags: HashMap<Uuid, Tag>,
    questions: HashMap<Uuid, Question>,
    answers: HashMap<Uuid, Answer>,
    comments: HashMap<Uuid, Comment>,
    votes: HashMap<Uuid, Vote>,
    notifications: HashMap<Uuid, Notification>,
}

/// 프로세스 메모리 store
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    counters: Mutex<HashMap<(String, DateTime<Utc>), u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn hit_counter(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let start = window_start(Utc::now(), window);
        let mut counters = self.counters.lock().await;
        // 지난 window 는 여기서 정리 (reconciler 비활성이어도 무한히 커지지 않음)
        counters.retain(|(_, started), _| *started >= start);
        let hits = counters.entry((key.to_string(), start)).or_insert(0);
        *hits += 1;
        Ok(*hits)
    }

    async fn purge_counters(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|(_, start), _| *start >= older_than);
        Ok((before - counters.len()) as u64)
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn paginate<T>(items: Vec<T>, page: &PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = items
        .into_iter()
        .skip(offset)
        .take(page.limit as usize)
        .collect();
    (items, total)
}

fn sorted_ids<T>(map: &HashMap<Uuid, T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<Uuid> {
    let mut entries: Vec<(DateTime<Utc>, Uuid)> =
        map.iter().map(|(id, doc)| (created_at(doc), *id)).collect();
    entries.sort();
    entries.into_iter().map(|(_, id)| id).collect()
}

impl MemoryTx {
    fn same_target(vote: &Vote, user_id: Uuid, target: VoteTarget) -> bool {
        vote.user == user_id && vote.target == target.id && vote.target_type == target.kind
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    // ============ Users ============

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        let users = &self.working.users;
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation("users_username_key".to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user_by_id(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn user_by_username(&mut self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<()> {
        for other in self.working.users.values().filter(|u| u.id != user.id) {
            if other.username == user.username {
                return Err(StoreError::UniqueViolation("users_username_key".to_string()));
            }
            if other.email == user.email {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
        }

        let stored = self
            .working
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::Corrupt(format!("user {} missing", user.id)))?;
        stored.username = user.username.clone();
        stored.email = user.email.clone();
        stored.status = user.status;
        stored.bio = user.bio.clone();
        stored.location = user.location.clone();
        stored.website = user.website.clone();
        Ok(())
    }

    async fn top_users(&mut self, limit: i64) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self
            .working
            .users
            .values()
            .filter(|u| u.status == UserStatus::Active)
            .cloned()
            .collect();
        users.sort_by(|a, b| {
            b.reputation
                .cmp(&a.reputation)
                .then_with(|| a.username.cmp(&b.username))
        });
        users.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(users)
    }

    // ============ Stats ============

    async fn community_counts(
        &mut self,
        today: DateTime<Utc>,
        active_since: DateTime<Utc>,
    ) -> StoreResult<CommunityCounts> {
        let questions: Vec<&Question> = self
            .working
            .questions
            .values()
            .filter(|q| q.status.is_visible())
            .collect();
        let answers: Vec<&Answer> = self
            .working
            .answers
            .values()
            .filter(|a| a.status != ContentStatus::Deleted)
            .collect();

        let active_users = self
            .working
            .users
            .values()
            .filter(|u| {
                u.created_at >= active_since
                    || self
                        .working
                        .questions
                        .values()
                        .any(|q| q.author == u.id && q.created_at >= active_since)
                    || self
                        .working
                        .answers
                        .values()
                        .any(|a| a.author == u.id && a.created_at >= active_since)
            })
            .count();

        Ok(CommunityCounts {
            total_questions: questions.len() as i64,
            total_answers: answers.len() as i64,
            total_users: self.working.users.len() as i64,
            active_users: active_users as i64,
            questions_today: questions.iter().filter(|q| q.created_at >= today).count() as i64,
            answers_today: answers.iter().filter(|a| a.created_at >= today).count() as i64,
        })
    }

    async fn activity_counts(&mut self, user_id: Uuid) -> StoreResult<ActivityCounts> {
        let mut counts = ActivityCounts::default();
        for q in self.working.questions.values() {
            if q.author == user_id && q.status.is_visible() {
                counts.questions_asked += 1;
                counts.total_votes += q.metrics.score;
            }
        }
        for a in self.working.answers.values() {
            if a.author == user_id && a.status != ContentStatus::Deleted {
                counts.answers_given += 1;
                counts.total_votes += a.metrics.score;
                if a.is_accepted {
                    counts.accepted_answers += 1;
                }
            }
        }
        Ok(counts)
    }

    // ============ Tags ============

    async fn find_or_insert_tag(&mut self, tag: &Tag) -> StoreResult<(Tag, bool)> {
        if let Some(existing) = self
            .working
            .tags
            .values()
            .find(|t| t.name == tag.name || t.slug == tag.slug)
        {
            return Ok((existing.clone(), false));
        }
        let mut created = tag.clone();
        created.metrics.question_count = 0;
        self.working.tags.insert(created.id, created.clone());
        Ok((created, true))
    }

    async fn tag_by_id(&mut self, id: Uuid) -> StoreResult<Option<Tag>> {
        Ok(self.working.tags.get(&id).cloned())
    }

    async fn list_tags(&mut self, page: &PageRequest) -> StoreResult<(Vec<Tag>, i64)> {
        let mut tags: Vec<Tag> = self.working.tags.values().cloned().collect();
        tags.sort_by(|a, b| {
            b.metrics
                .question_count
                .cmp(&a.metrics.question_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(paginate(tags, page))
    }

    async fn adjust_tag_question_count(&mut self, ids: &[Uuid], delta: i64) -> StoreResult<()> {
        for id in ids {
            if let Some(tag) = self.working.tags.get_mut(id) {
                tag.metrics.question_count = (tag.metrics.question_count + delta).max(0);
            }
        }
        Ok(())
    }

    // ============ Questions ============

    async fn insert_question(&mut self, question: &Question) -> StoreResult<()> {
        self.working.questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn question_by_id(&mut self, id: Uuid) -> StoreResult<Option<Question>> {
        Ok(self.working.questions.get(&id).cloned())
    }

    async fn lock_question(&mut self, id: Uuid) -> StoreResult<Option<Question>> {
        // 트랜잭션 전체가 이미 직렬화되어 있음
        self.question_by_id(id).await
    }

    async fn list_questions(&mut self, page: &PageRequest) -> StoreResult<(Vec<Question>, i64)> {
        let mut questions: Vec<Question> = self
            .working
            .questions
            .values()
            .filter(|q| q.status.is_visible())
            .cloned()
            .collect();
        questions.sort_by_key(|q| Reverse(q.created_at));
        Ok(paginate(questions, page))
    }

    async fn save_question(&mut self, question: &Question) -> StoreResult<()> {
        let stored = self
            .working
            .questions
            .get_mut(&question.id)
            .ok_or_else(|| StoreError::Corrupt(format!("question {} missing", question.id)))?;
        stored.title = question.title.clone();
        stored.description = question.description.clone();
        stored.tags = question.tags.clone();
        stored.accepted_answer = question.accepted_answer;
        stored.status = question.status;
        stored.updated_at = question.updated_at;
        Ok(())
    }

    async fn increment_views(&mut self, id: Uuid) -> StoreResult<()> {
        if let Some(q) = self.working.questions.get_mut(&id) {
            q.metrics.views += 1;
        }
        Ok(())
    }

    async fn adjust_answer_count(&mut self, id: Uuid, delta: i64) -> StoreResult<()> {
        if let Some(q) = self.working.questions.get_mut(&id) {
            q.metrics.answer_count = (q.metrics.answer_count + delta).max(0);
        }
        Ok(())
    }

    async fn set_answer_count(&mut self, id: Uuid, count: i64) -> StoreResult<()> {
        if let Some(q) = self.working.questions.get_mut(&id) {
            q.metrics.answer_count = count;
        }
        Ok(())
    }

    async fn question_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        Ok(sorted_ids(&self.working.questions, |q| q.created_at))
    }

    // ============ Answers ============

    async fn insert_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        self.working.answers.insert(answer.id, answer.clone());
        Ok(())
    }

    async fn answer_by_id(&mut self, id: Uuid) -> StoreResult<Option<Answer>> {
        Ok(self.working.answers.get(&id).cloned())
    }

    async fn lock_answer(&mut self, id: Uuid) -> StoreResult<Option<Answer>> {
        self.answer_by_id(id).await
    }

    async fn answers_for_question(&mut self, question_id: Uuid) -> StoreResult<Vec<Answer>> {
        let mut answers: Vec<Answer> = self
            .working
            .answers
            .values()
            .filter(|a| a.question == question_id && a.status.is_visible())
            .cloned()
            .collect();
        answers.sort_by(|a, b| {
            b.is_accepted
                .cmp(&a.is_accepted)
                .then_with(|| b.metrics.score.cmp(&a.metrics.score))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(answers)
    }

    async fn save_answer(&mut self, answer: &Answer) -> StoreResult<()> {
        // partial unique index (question_id) WHERE is_accepted
        if answer.is_accepted
            && self
                .working
                .answers
                .values()
                .any(|a| a.question == answer.question && a.id != answer.id && a.is_accepted)
        {
            return Err(StoreError::UniqueViolation(
                "answers_one_accepted_per_question".to_string(),
            ));
        }

        let stored = self
            .working
            .answers
            .get_mut(&answer.id)
            .ok_or_else(|| StoreError::Corrupt(format!("answer {} missing", answer.id)))?;
        stored.content = answer.content.clone();
        stored.status = answer.status;
        stored.is_accepted = answer.is_accepted;
        stored.accepted_at = answer.accepted_at;
        stored.updated_at = answer.updated_at;
        Ok(())
    }

    async fn clear_acceptance(&mut self, question_id: Uuid) -> StoreResult<u64> {
        let mut cleared = 0;
        for answer in self.working.answers.values_mut() {
            if answer.question == question_id && answer.is_accepted {
                answer.is_accepted = false;
                answer.accepted_at = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn count_active_answers(&mut self, question_id: Uuid) -> StoreResult<i64> {
        let count = self
            .working
            .answers
            .values()
            .filter(|a| a.question == question_id && a.status == ContentStatus::Active)
            .count();
        Ok(count as i64)
    }

    async fn answer_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        Ok(sorted_ids(&self.working.answers, |a| a.created_at))
    }

    // ============ Comments ============

    async fn insert_comment(&mut self, comment: &Comment) -> StoreResult<()> {
        self.working.comments.insert(comment.id, comment.clone());
        Ok(())
    }

    async fn comment_by_id(&mut self, id: Uuid) -> StoreResult<Option<Comment>> {
        Ok(self.working.comments.get(&id).cloned())
    }

    async fn comment_ids(&mut self) -> StoreResult<Vec<Uuid>> {
        Ok(sorted_ids(&self.working.comments, |c| c.created_at))
    }

    // ============ Votes ============

    async fn lock_target(&mut self, target: VoteTarget) -> StoreResult<bool> {
        let votable = match target.kind {
            TargetType::Question => self
                .working
                .questions
                .get(&target.id)
                .is_some_and(|q| q.status != QuestionStatus::Deleted),
            TargetType::Answer => self
                .working
                .answers
                .get(&target.id)
                .is_some_and(|a| a.status == ContentStatus::Active),
            TargetType::Comment => self
                .working
                .comments
                .get(&target.id)
                .is_some_and(|c| c.status == ContentStatus::Active),
        };
        Ok(votable)
    }

    async fn find_vote(&mut self, user_id: Uuid, target: VoteTarget) -> StoreResult<Option<Vote>> {
        Ok(self
            .working
            .votes
            .values()
            .find(|v| Self::same_target(v, user_id, target))
            .cloned())
    }

    async fn insert_vote(&mut self, vote: &Vote) -> StoreResult<()> {
        // unique (user_id, target_id, target_type)
        if self
            .working
            .votes
            .values()
            .any(|v| Self::same_target(v, vote.user, vote.target_ref()))
        {
            return Err(StoreError::UniqueViolation("votes_user_target_key".to_string()));
        }
        self.working.votes.insert(vote.id, vote.clone());
        Ok(())
    }

    async fn update_vote_type(&mut self, vote_id: Uuid, vote_type: VoteType) -> StoreResult<()> {
        if let Some(vote) = self.working.votes.get_mut(&vote_id) {
            vote.vote_type = vote_type;
            vote.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_vote(&mut self, user_id: Uuid, target: VoteTarget) -> StoreResult<Option<Vote>> {
        let id = self
            .working
            .votes
            .values()
            .find(|v| Self::same_target(v, user_id, target))
            .map(|v| v.id);
        Ok(id.and_then(|id| self.working.votes.remove(&id)))
    }

    async fn tally_votes(&mut self, target: VoteTarget) -> StoreResult<VoteTally> {
        let mut tally = VoteTally::default();
        for vote in self.working.votes.values() {
            if vote.is_active && vote.target == target.id && vote.target_type == target.kind {
                match vote.vote_type {
                    VoteType::Upvote => tally.upvotes += 1,
                    VoteType::Downvote => tally.downvotes += 1,
                }
            }
        }
        Ok(tally)
    }

    async fn write_metrics(&mut self, target: VoteTarget, tally: VoteTally) -> StoreResult<()> {
        match target.kind {
            TargetType::Question => {
                if let Some(q) = self.working.questions.get_mut(&target.id) {
                    q.metrics.upvotes = tally.upvotes;
                    q.metrics.downvotes = tally.downvotes;
                    q.metrics.score = tally.score();
                }
            }
            TargetType::Answer => {
                if let Some(a) = self.working.answers.get_mut(&target.id) {
                    a.metrics = tally.to_metrics();
                }
            }
            TargetType::Comment => {
                if let Some(c) = self.working.comments.get_mut(&target.id) {
                    c.metrics = tally.to_metrics();
                }
            }
        }
        Ok(())
    }

    // ============ Notifications ============

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        self.working
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn list_notifications(
        &mut self,
        recipient: Uuid,
        status: Option<NotificationStatus>,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Notification>, i64)> {
        let mut items: Vec<Notification> = self
            .working
            .notifications
            .values()
            .filter(|n| n.recipient == recipient && status.map_or(true, |s| n.status == s))
            .cloned()
            .collect();
        items.sort_by_key(|n| Reverse(n.created_at));
        Ok(paginate(items, page))
    }

    async fn count_unread(&mut self, recipient: Uuid) -> StoreResult<i64> {
        let count = self
            .working
            .notifications
            .values()
            .filter(|n| n.recipient == recipient && n.status == NotificationStatus::Unread)
            .count();
        Ok(count as i64)
    }

    async fn mark_notification_read(
        &mut self,
        id: Uuid,
        recipient: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Notification>> {
        match self.working.notifications.get_mut(&id) {
            Some(n) if n.recipient == recipient => {
                n.status = NotificationStatus::Read;
                n.read_at = Some(at);
                Ok(Some(n.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_all_read(&mut self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let mut updated = 0;
        for n in self.working.notifications.values_mut() {
            if n.recipient == recipient && n.status == NotificationStatus::Unread {
                n.status = NotificationStatus::Read;
                n.read_at = Some(at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_notification(&mut self, id: Uuid, recipient: Uuid) -> StoreResult<bool> {
        let owned = self
            .working
            .notifications
            .get(&id)
            .is_some_and(|n| n.recipient == recipient);
        if owned {
            self.working.notifications.remove(&id);
        }
        Ok(owned)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
