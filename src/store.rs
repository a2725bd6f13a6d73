use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::types::{DeliveryRecord, DeliveryStatus, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable home of the subscription registry and the delivery ledger.
///
/// Every method is a single-table point read/write or a bounded scan; no
/// call spans more than one row mutation, so per-call atomicity is all an
/// implementation has to provide.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_subscription(&self, sub: Subscription) -> Result<()>;
    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>>;
    async fn list_subscriptions(&self, user_id: Uuid) -> Result<Vec<Subscription>>;
    /// Active subscriptions of `user_id` listening for `event`, oldest first.
    async fn list_active(&self, user_id: Uuid, event: EventKind) -> Result<Vec<Subscription>>;
    /// No-op when the id does not exist.
    async fn set_subscription_active(&self, id: Uuid, active: bool) -> Result<()>;
    /// No-op when the id does not exist.
    async fn delete_subscription(&self, id: Uuid) -> Result<()>;

    async fn insert_record(&self, record: DeliveryRecord) -> Result<()>;
    async fn get_record(&self, id: Uuid) -> Result<Option<DeliveryRecord>>;
    async fn list_records(&self, user_id: Uuid) -> Result<Vec<DeliveryRecord>>;
    /// Undelivered records below the attempt cap whose `(user_id, event)`
    /// still matches at least one active subscription, oldest-created
    /// first, at most `limit` of them.
    async fn select_retryable(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>>;
    /// Account for one finished attempt: bump `attempts`, stamp
    /// `delivered_at` on success, re-derive the status. Single-row, atomic.
    async fn record_attempt(
        &self,
        id: Uuid,
        delivered: bool,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryRecord>;

    /// Cascade for user deletion: drops the user's subscriptions and
    /// delivery records.
    async fn purge_user(&self, user_id: Uuid) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    subscriptions: HashMap<Uuid, Subscription>,
    records: HashMap<Uuid, DeliveryRecord>,
}

impl Tables {
    fn list_subscriptions(&self, user_id: Uuid) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sort_subs(&mut subs);
        subs
    }

    fn list_active(&self, user_id: Uuid, event: EventKind) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.active && s.events.contains(&event))
            .cloned()
            .collect();
        sort_subs(&mut subs);
        subs
    }

    fn has_active_match(&self, user_id: Uuid, event: EventKind) -> bool {
        self.subscriptions
            .values()
            .any(|s| s.user_id == user_id && s.active && s.events.contains(&event))
    }

    fn list_records(&self, user_id: Uuid) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        sort_records(&mut records);
        records
    }

    fn select_retryable(&self, max_attempts: u32, limit: usize) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self
            .records
            .values()
            .filter(|r| {
                r.delivered_at.is_none()
                    && r.attempts < max_attempts
                    && self.has_active_match(r.user_id, r.event)
            })
            .cloned()
            .collect();
        sort_records(&mut records);
        records.truncate(limit);
        records
    }

    fn record_attempt(
        &mut self,
        id: Uuid,
        delivered: bool,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryRecord> {
        let record = self.records.get_mut(&id).ok_or(Error::RecordNotFound(id))?;
        record.attempts = record.attempts.saturating_add(1);
        if delivered && record.delivered_at.is_none() {
            record.delivered_at = Some(now);
        }
        record.status =
            DeliveryStatus::derive(record.delivered_at.is_some(), record.attempts, max_attempts);
        Ok(record.clone())
    }

    fn purge_user(&mut self, user_id: Uuid) {
        self.subscriptions.retain(|_, s| s.user_id != user_id);
        self.records.retain(|_, r| r.user_id != user_id);
    }
}

// Stable iteration within one call: creation order, id as tie-break.
fn sort_subs(subs: &mut [Subscription]) {
    subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

fn sort_records(records: &mut [DeliveryRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Volatile store. The default for tests and embedded usage.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_subscription(&self, sub: Subscription) -> Result<()> {
        self.tables.write().await.subscriptions.insert(sub.id, sub);
        Ok(())
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.tables.read().await.subscriptions.get(&id).cloned())
    }

    async fn list_subscriptions(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        Ok(self.tables.read().await.list_subscriptions(user_id))
    }

    async fn list_active(&self, user_id: Uuid, event: EventKind) -> Result<Vec<Subscription>> {
        Ok(self.tables.read().await.list_active(user_id, event))
    }

    async fn set_subscription_active(&self, id: Uuid, active: bool) -> Result<()> {
        if let Some(sub) = self.tables.write().await.subscriptions.get_mut(&id) {
            sub.active = active;
        }
        Ok(())
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        self.tables.write().await.subscriptions.remove(&id);
        Ok(())
    }

    async fn insert_record(&self, record: DeliveryRecord) -> Result<()> {
        self.tables.write().await.records.insert(record.id, record);
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<DeliveryRecord>> {
        Ok(self.tables.read().await.records.get(&id).cloned())
    }

    async fn list_records(&self, user_id: Uuid) -> Result<Vec<DeliveryRecord>> {
        Ok(self.tables.read().await.list_records(user_id))
    }

    async fn select_retryable(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .select_retryable(max_attempts, limit))
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        delivered: bool,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryRecord> {
        self.tables
            .write()
            .await
            .record_attempt(id, delivered, max_attempts, now)
    }

    async fn purge_user(&self, user_id: Uuid) -> Result<()> {
        self.tables.write().await.purge_user(user_id);
        Ok(())
    }
}

/// JSON-file-backed store for single-process deployments: the same tables
/// as [`MemoryStore`], flushed to `subscriptions.json` and
/// `deliveries.json` under a data directory after each mutation.
pub struct FileStore {
    data_dir: PathBuf,
    tables: RwLock<Tables>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Read both tables back from disk. Missing files mean an empty table.
    pub async fn load(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.subscriptions = read_table(&self.subscriptions_path())?;
        tables.records = read_table(&self.records_path())?;
        Ok(())
    }

    fn subscriptions_path(&self) -> PathBuf {
        self.data_dir.join("subscriptions.json")
    }

    fn records_path(&self) -> PathBuf {
        self.data_dir.join("deliveries.json")
    }

    fn persist_subscriptions(&self, tables: &Tables) -> Result<()> {
        write_table(&self.data_dir, &self.subscriptions_path(), &tables.subscriptions)
    }

    fn persist_records(&self, tables: &Tables) -> Result<()> {
        write_table(&self.data_dir, &self.records_path(), &tables.records)
    }
}

fn read_table<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<HashMap<Uuid, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_table<T: serde::Serialize>(
    data_dir: &PathBuf,
    path: &PathBuf,
    table: &HashMap<Uuid, T>,
) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let content = serde_json::to_string_pretty(table)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[async_trait]
impl Store for FileStore {
    async fn insert_subscription(&self, sub: Subscription) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.subscriptions.insert(sub.id, sub);
        self.persist_subscriptions(&tables)
    }

    async fn get_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.tables.read().await.subscriptions.get(&id).cloned())
    }

    async fn list_subscriptions(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        Ok(self.tables.read().await.list_subscriptions(user_id))
    }

    async fn list_active(&self, user_id: Uuid, event: EventKind) -> Result<Vec<Subscription>> {
        Ok(self.tables.read().await.list_active(user_id, event))
    }

    async fn set_subscription_active(&self, id: Uuid, active: bool) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.subscriptions.get_mut(&id) {
            Some(sub) => {
                sub.active = active;
                self.persist_subscriptions(&tables)
            }
            None => Ok(()),
        }
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.remove(&id).is_some() {
            self.persist_subscriptions(&tables)?;
        }
        Ok(())
    }

    async fn insert_record(&self, record: DeliveryRecord) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.records.insert(record.id, record);
        self.persist_records(&tables)
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<DeliveryRecord>> {
        Ok(self.tables.read().await.records.get(&id).cloned())
    }

    async fn list_records(&self, user_id: Uuid) -> Result<Vec<DeliveryRecord>> {
        Ok(self.tables.read().await.list_records(user_id))
    }

    async fn select_retryable(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .select_retryable(max_attempts, limit))
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        delivered: bool,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryRecord> {
        let mut tables = self.tables.write().await;
        let updated = tables.record_attempt(id, delivered, max_attempts, now)?;
        self.persist_records(&tables)?;
        Ok(updated)
    }

    async fn purge_user(&self, user_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.purge_user(user_id);
        self.persist_subscriptions(&tables)?;
        self.persist_records(&tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn subscription(user_id: Uuid, event: EventKind, created: DateTime<Utc>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id,
            url: "http://127.0.0.1:1/hook".into(),
            secret: "secret".into(),
            events: BTreeSet::from([event]),
            active: true,
            created_at: created,
        }
    }

    fn pending_record(user_id: Uuid, event: EventKind, created: DateTime<Utc>) -> DeliveryRecord {
        DeliveryRecord {
            id: Uuid::new_v4(),
            user_id,
            event,
            payload: "{}".into(),
            created_at: created,
            delivered_at: None,
            attempts: 0,
            status: DeliveryStatus::Pending,
        }
    }

    #[tokio::test]
    async fn select_retryable_takes_the_oldest_up_to_the_limit() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .insert_subscription(subscription(user, EventKind::NoteUpdated, at(0)))
            .await
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..12 {
            let record = pending_record(user, EventKind::NoteUpdated, at(i));
            ids.push(record.id);
            store.insert_record(record).await.unwrap();
        }

        let batch = store.select_retryable(5, 10).await.unwrap();
        let selected: Vec<Uuid> = batch.iter().map(|r| r.id).collect();
        assert_eq!(selected, ids[..10].to_vec());
    }

    #[tokio::test]
    async fn records_without_an_active_match_are_not_selected() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let sub = subscription(user, EventKind::FavoriteAdded, at(0));
        let sub_id = sub.id;
        store.insert_subscription(sub).await.unwrap();
        store
            .insert_record(pending_record(user, EventKind::FavoriteAdded, at(1)))
            .await
            .unwrap();

        assert_eq!(store.select_retryable(5, 10).await.unwrap().len(), 1);

        store.set_subscription_active(sub_id, false).await.unwrap();
        assert!(store.select_retryable(5, 10).await.unwrap().is_empty());

        // Reactivation makes the backlog eligible again.
        store.set_subscription_active(sub_id, true).await.unwrap();
        assert_eq!(store.select_retryable(5, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_attempt_transitions() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let record = pending_record(user, EventKind::ReadingStarted, at(0));
        let id = record.id;
        store.insert_record(record).await.unwrap();

        for expected_attempts in 1..=4 {
            let updated = store.record_attempt(id, false, 5, at(10)).await.unwrap();
            assert_eq!(updated.attempts, expected_attempts);
            assert_eq!(updated.status, DeliveryStatus::Pending);
            assert!(updated.delivered_at.is_none());
        }

        let exhausted = store.record_attempt(id, false, 5, at(20)).await.unwrap();
        assert_eq!(exhausted.attempts, 5);
        assert_eq!(exhausted.status, DeliveryStatus::Exhausted);
        assert!(exhausted.delivered_at.is_none());
    }

    #[tokio::test]
    async fn delivered_at_is_set_once_and_never_reset() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let record = pending_record(user, EventKind::SiteStarted, at(0));
        let id = record.id;
        store.insert_record(record).await.unwrap();

        let delivered = store.record_attempt(id, true, 5, at(30)).await.unwrap();
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(delivered.delivered_at, Some(at(30)));

        let again = store.record_attempt(id, true, 5, at(40)).await.unwrap();
        assert_eq!(again.delivered_at, Some(at(30)));
    }

    #[tokio::test]
    async fn missing_record_is_an_error() {
        let store = MemoryStore::new();
        let err = store
            .record_attempt(Uuid::new_v4(), false, 5, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn delete_and_deactivate_are_idempotent() {
        let store = MemoryStore::new();
        let missing = Uuid::new_v4();
        store.delete_subscription(missing).await.unwrap();
        store.set_subscription_active(missing, false).await.unwrap();
    }

    #[tokio::test]
    async fn purge_user_cascades() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .insert_subscription(subscription(user, EventKind::NoteUpdated, at(0)))
            .await
            .unwrap();
        store
            .insert_subscription(subscription(other, EventKind::NoteUpdated, at(0)))
            .await
            .unwrap();
        store
            .insert_record(pending_record(user, EventKind::NoteUpdated, at(1)))
            .await
            .unwrap();

        store.purge_user(user).await.unwrap();

        assert!(store.list_subscriptions(user).await.unwrap().is_empty());
        assert!(store.list_records(user).await.unwrap().is_empty());
        assert_eq!(store.list_subscriptions(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_round_trips_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let user = Uuid::new_v4();
        let sub = subscription(user, EventKind::SnippetsUpdated, at(0));
        let sub_id = sub.id;
        let record = pending_record(user, EventKind::SnippetsUpdated, at(1));
        let record_id = record.id;

        {
            let store = FileStore::new(dir.path());
            store.insert_subscription(sub).await.unwrap();
            store.insert_record(record).await.unwrap();
            store.record_attempt(record_id, false, 5, at(2)).await.unwrap();
        }

        let store = FileStore::new(dir.path());
        store.load().await.unwrap();
        let sub = store.get_subscription(sub_id).await.unwrap().unwrap();
        assert_eq!(sub.secret, "secret");
        let record = store.get_record(record_id).await.unwrap().unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.status, DeliveryStatus::Pending);
    }
}
