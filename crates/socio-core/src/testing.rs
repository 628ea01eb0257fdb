//! Test stores: an in-memory database and a wrapper that fails on demand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use socio_db::Database;
use socio_db::store::{ReadTransition, Store};
use socio_types::models::{Activity, Chat, Message, Notification, NotificationView, UserProfile};

pub fn memory_store() -> Arc<Database> {
    Arc::new(Database::open_in_memory().unwrap())
}

/// Delegates to an in-memory [`Database`] but can be told to fail specific writes.
pub struct FlakyStore {
    pub inner: Database,
    failing_reads: Mutex<HashSet<Uuid>>,
    fail_deletes: AtomicBool,
    fail_message_inserts: AtomicBool,
    message_insert_delay_ms: AtomicU64,
    fail_notification_inserts: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Database::open_in_memory().unwrap(),
            failing_reads: Mutex::new(HashSet::new()),
            fail_deletes: AtomicBool::new(false),
            fail_message_inserts: AtomicBool::new(false),
            message_insert_delay_ms: AtomicU64::new(0),
            fail_notification_inserts: AtomicBool::new(false),
        })
    }

    pub fn fail_mark_read(&self, id: Uuid) {
        self.failing_reads.lock().unwrap().insert(id);
    }

    pub fn heal_mark_read(&self) {
        self.failing_reads.lock().unwrap().clear();
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_message_inserts(&self, fail: bool) {
        self.fail_message_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every message insert sleep first, so overlapping sends contend.
    pub fn slow_message_inserts(&self, delay: Duration) {
        self.message_insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_notification_inserts(&self, fail: bool) {
        self.fail_notification_inserts.store(fail, Ordering::SeqCst);
    }
}

impl Store for FlakyStore {
    fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        self.inner.upsert_user(profile)
    }

    fn get_user(&self, username: &str) -> Result<Option<UserProfile>> {
        self.inner.get_user(username)
    }

    fn set_block(&self, blocker: &str, blocked: &str, active: bool) -> Result<()> {
        self.inner.set_block(blocker, blocked, active)
    }

    fn is_blocked(&self, blocker: &str, blocked: &str) -> Result<bool> {
        self.inner.is_blocked(blocker, blocked)
    }

    fn insert_or_fetch_chat(&self, candidate: &Chat) -> Result<Chat> {
        self.inner.insert_or_fetch_chat(candidate)
    }

    fn find_chat_by_pair(&self, a: &str, b: &str) -> Result<Option<Chat>> {
        self.inner.find_chat_by_pair(a, b)
    }

    fn get_chat(&self, id: Uuid) -> Result<Option<Chat>> {
        self.inner.get_chat(id)
    }

    fn set_chat_allow_message(&self, id: Uuid, allow: bool) -> Result<()> {
        self.inner.set_chat_allow_message(id, allow)
    }

    fn touch_chat(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.inner.touch_chat(id, at)
    }

    fn chats_for_user(&self, username: &str) -> Result<Vec<Chat>> {
        self.inner.chats_for_user(username)
    }

    fn insert_message(&self, message: &Message) -> Result<()> {
        let delay = self.message_insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            // Runs on the blocking pool
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail_message_inserts.load(Ordering::SeqCst) {
            bail!("injected message insert failure");
        }
        self.inner.insert_message(message)
    }

    fn messages_for_chat(&self, chat_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        self.inner.messages_for_chat(chat_id, limit)
    }

    fn insert_notification(&self, notification: &Notification) -> Result<()> {
        if self.fail_notification_inserts.load(Ordering::SeqCst) {
            bail!("injected notification insert failure");
        }
        self.inner.insert_notification(notification)
    }

    fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        self.inner.get_notification(id)
    }

    fn notification_view(&self, id: Uuid) -> Result<Option<NotificationView>> {
        self.inner.notification_view(id)
    }

    fn notifications_for(&self, receiver: &str) -> Result<Vec<NotificationView>> {
        self.inner.notifications_for(receiver)
    }

    fn unread_notification_ids(&self, receiver: &str) -> Result<Vec<Uuid>> {
        self.inner.unread_notification_ids(receiver)
    }

    fn mark_notification_read(&self, id: Uuid) -> Result<ReadTransition> {
        if self.failing_reads.lock().unwrap().contains(&id) {
            bail!("injected read-state failure for {}", id);
        }
        self.inner.mark_notification_read(id)
    }

    fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.inner.insert_activity(activity)
    }

    fn activities_for(&self, user_id: &str) -> Result<Vec<Activity>> {
        self.inner.activities_for(user_id)
    }

    fn delete_activities(&self, ids: &[Uuid]) -> Result<usize> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("injected delete failure");
        }
        self.inner.delete_activities(ids)
    }
}
