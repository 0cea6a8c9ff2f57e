//! Subscription Store — persistence, port allocation, and lifecycle
//! (spec §4.B).
//!
//! One file per record at `<root>/<base32(id)>.json`. Creation is
//! exclusive-create plus a temp-file-then-rename, so a crash mid-write never
//! leaves a torn record behind. Port allocation counts *every* record file
//! that has ever been created (active or inactive) so that a port pair is
//! never reused, even across deactivation (spec invariant 2).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::{NewRecordDetails, Record, RecordEnvelope};

/// A subscription store rooted at a directory of JSON record files.
///
/// Creation is serialized through `create_lock` so that concurrent
/// `create()` calls can't race on port allocation (spec §4.B/§5).
#[derive(Debug)]
pub struct SubscriptionStore {
    root: PathBuf,
    create_lock: Mutex<()>,
}

impl SubscriptionStore {
    /// Open a store rooted at `root`. The directory must already exist;
    /// bootstrapping a missing root is refused (spec §4.B).
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::RootMissing(root.display().to_string()));
        }
        Ok(Self {
            root,
            create_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, subscription_id: &str) -> PathBuf {
        let encoded = base32::encode(base32::Alphabet::Rfc4648 { padding: true }, subscription_id.as_bytes());
        self.root.join(format!("{encoded}.json"))
    }

    fn decode_id_from_filename(filename: &str) -> Option<String> {
        let stem = filename.strip_suffix(".json")?;
        let bytes = base32::decode(base32::Alphabet::Rfc4648 { padding: true }, stem)?;
        String::from_utf8(bytes).ok()
    }

    async fn record_paths(&self) -> StoreResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    async fn read_record(path: &Path) -> StoreResult<Record> {
        let content = tokio::fs::read_to_string(path).await?;
        let envelope: RecordEnvelope = serde_json::from_str(&content)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        envelope.into_record()
    }

    /// The ids of active records only. Inactive records are hidden from
    /// this view (spec §4.B).
    pub async fn list_identifiers(&self) -> StoreResult<HashSet<String>> {
        let mut ids = HashSet::new();
        for path in self.record_paths().await? {
            let record = Self::read_record(&path).await?;
            if record.active {
                ids.insert(record.subscription_id);
            }
        }
        Ok(ids)
    }

    /// Fetch a record, active or inactive.
    pub async fn get(&self, subscription_id: &str) -> StoreResult<Record> {
        let path = self.record_path(subscription_id);
        if !path.exists() {
            return Err(StoreError::NotFound(subscription_id.to_string()));
        }
        Self::read_record(&path).await
    }

    /// Atomically reserve a fresh port pair and create a new record.
    pub async fn create(
        &self,
        subscription_id: &str,
        details: NewRecordDetails,
    ) -> StoreResult<Record> {
        let _guard = self.create_lock.lock().await;

        let path = self.record_path(subscription_id);
        if path.exists() {
            return Err(StoreError::AlreadyExists(subscription_id.to_string()));
        }

        let existing_count = self.record_paths().await?.len();
        let ports = Self::assign_ports(existing_count)?;

        let record = Record {
            subscription_id: subscription_id.to_string(),
            customer_id: details.customer_id,
            product_id: details.product_id,
            customer_email: details.customer_email,
            bucket_name: details.bucket_name,
            introducer_port_number: ports.introducer_port_number,
            storage_port_number: ports.storage_port_number,
            old_secrets: details.old_secrets,
            active: true,
        };

        self.write_new_record(&path, &record).await?;
        info!(
            "created subscription {} with ports ({}, {})",
            subscription_id, ports.introducer_port_number, ports.storage_port_number
        );
        Ok(record)
    }

    fn assign_ports(existing_count: usize) -> StoreResult<crate::record::PortPair> {
        let introducer = crate::record::PortPair::RANGE_START as u32 + existing_count as u32 * 2;
        if introducer >= crate::record::PortPair::RANGE_END as u32 {
            return Err(StoreError::Exhausted);
        }
        crate::record::PortPair::new(introducer as u16, introducer as u16 + 1)
    }

    async fn write_new_record(&self, path: &Path, record: &Record) -> StoreResult<()> {
        let envelope = RecordEnvelope::from_record(record);
        let content = serde_json::to_string(&envelope)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        {
            use std::io::Write;
            use std::fs::OpenOptions;
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
        }

        // Exclusive-create the final path too, so a racing writer that lost
        // the in-process lock (e.g. a second process) still can't clobber
        // an existing record.
        if path.exists() {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StoreError::AlreadyExists(record.subscription_id.clone()));
        }
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    /// Flip `active` to false. Idempotent: deactivating an already-inactive
    /// record is a no-op success.
    pub async fn deactivate(&self, subscription_id: &str) -> StoreResult<()> {
        let path = self.record_path(subscription_id);
        if !path.exists() {
            return Err(StoreError::NotFound(subscription_id.to_string()));
        }

        let mut record = Self::read_record(&path).await?;
        if !record.active {
            debug!("subscription {} already inactive", subscription_id);
            return Ok(());
        }
        record.active = false;

        let envelope = RecordEnvelope::from_record(&record);
        let content = serde_json::to_string(&envelope)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        // Read-modify-write; losing this to a crash is tolerable (spec
        // §4.B) because the store is the ground truth and a later
        // reconciliation will observe and repeat the intent.
        if let Err(e) = tokio::fs::write(&path, content).await {
            warn!(
                "failed to persist deactivation of {}: {}",
                subscription_id, e
            );
            return Err(e.into());
        }
        info!("deactivated subscription {}", subscription_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn details(n: u32) -> NewRecordDetails {
        NewRecordDetails {
            customer_id: format!("cust-{n}"),
            product_id: "prod-1".to_string(),
            customer_email: format!("user{n}@example.com"),
            bucket_name: format!("bucket-{n}"),
            old_secrets: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn open_refuses_missing_root() {
        let err = SubscriptionStore::open("/does/not/exist-xyz").unwrap_err();
        assert!(matches!(err, StoreError::RootMissing(_)));
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();

        let record = store.create("sub-a", details(1)).await.unwrap();
        assert_eq!(record.introducer_port_number, 10000);
        assert_eq!(record.storage_port_number, 10001);
        assert!(record.active);

        let fetched = store.get("sub-a").await.unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();

        store.create("sub-a", details(1)).await.unwrap();
        let err = store.create("sub-a", details(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn ports_increase_monotonically_and_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();

        let a = store.create("sub-a", details(1)).await.unwrap();
        let b = store.create("sub-b", details(2)).await.unwrap();
        let c = store.create("sub-c", details(3)).await.unwrap();

        assert_eq!(a.introducer_port_number, 10000);
        assert_eq!(b.introducer_port_number, 10002);
        assert_eq!(c.introducer_port_number, 10004);
    }

    #[tokio::test]
    async fn deactivation_preserves_port_reservation() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();

        let a = store.create("sub-a", details(1)).await.unwrap();
        store.deactivate("sub-a").await.unwrap();

        // list_identifiers hides inactive records.
        let ids = store.list_identifiers().await.unwrap();
        assert!(ids.is_empty());

        // But get() still finds it, now inactive, with the same ports.
        let fetched = store.get("sub-a").await.unwrap();
        assert!(!fetched.active);
        assert_eq!(fetched.ports().introducer_port_number, a.introducer_port_number);

        // A fresh create must not reuse sub-a's ports.
        let b = store.create("sub-b", details(2)).await.unwrap();
        assert_ne!(b.introducer_port_number, a.introducer_port_number);
        assert_eq!(b.introducer_port_number, 10002);
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();

        store.create("sub-a", details(1)).await.unwrap();
        store.deactivate("sub-a").await.unwrap();
        store.deactivate("sub-a").await.unwrap();
    }

    #[tokio::test]
    async fn deactivate_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();
        let err = store.deactivate("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_unknown_id_fails() {
        let dir = TempDir::new().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn assign_ports_exhausts_at_range_end() {
        let capacity = ((crate::record::PortPair::RANGE_END as u32
            - crate::record::PortPair::RANGE_START as u32)
            / 2) as usize;
        assert!(SubscriptionStore::assign_ports(capacity - 1).is_ok());
        assert!(matches!(
            SubscriptionStore::assign_ports(capacity).unwrap_err(),
            StoreError::Exhausted
        ));
    }

    #[test]
    fn filename_round_trips_through_base32() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path()).unwrap();
        let path = store.record_path("weird id/with:chars");
        let filename = path.file_name().unwrap().to_str().unwrap();
        let decoded = SubscriptionStore::decode_id_from_filename(filename).unwrap();
        assert_eq!(decoded, "weird id/with:chars");
    }
}
