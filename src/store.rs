use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, error};

use crate::models::{Snapshot, SourceGroup};
use crate::snapshot::is_weekly_key;
use crate::utils;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no credentials for the snapshot store")]
    NoCredentials,
    #[error("no snapshot matched")]
    NoMatch,
    #[error("snapshot store error: {0}")]
    Other(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Other(err.to_string())
    }
}

/// Durable home of snapshots, addressed by bucket and key.
///
/// Weekly digests live under `{prefix}/weekly/` and are never returned as a
/// comparison baseline.
pub trait SnapshotStore: Send + Sync {
    fn load_latest(&self, bucket: &str, prefix: &str) -> Result<Snapshot, StoreError>;

    /// Run snapshot whose save time is nearest `target`, older one on a tie.
    ///
    /// Weekly digest keys must not be candidates: a digest holds only the
    /// events new that week, so diffing against one would re-announce the rest.
    fn load_closest_to(
        &self,
        bucket: &str,
        prefix: &str,
        target: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError>;

    fn save(&self, bucket: &str, key: &str, events: &SourceGroup) -> Result<(), StoreError>;

    fn exists(&self, bucket: &str, key: &str) -> bool;
}

/// Picks the candidate saved nearest to `target`; on a tie the older one wins.
pub fn closest_to<'a>(
    candidates: &'a [(String, DateTime<Utc>)],
    target: DateTime<Utc>,
) -> Option<&'a (String, DateTime<Utc>)> {
    candidates.iter().min_by(|a, b| {
        let da = (a.1 - target).num_milliseconds().abs();
        let db = (b.1 - target).num_milliseconds().abs();
        da.cmp(&db).then(a.1.cmp(&b.1))
    })
}

pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(utils::database_path())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots(
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                body TEXT NOT NULL,
                saved_at_utc TEXT NOT NULL,
                PRIMARY KEY (bucket, key)
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("snapshot store mutex poisoned".to_string()))
    }

    /// Writes a snapshot with an explicit timestamp. Re-saving a key replaces it.
    pub fn save_at(
        &self,
        bucket: &str,
        key: &str,
        events: &SourceGroup,
        saved_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        check_bucket(bucket)?;
        let body = serde_json::to_string_pretty(events)
            .map_err(|err| StoreError::Other(format!("snapshot serialization: {err}")))?;
        self.lock()?.execute(
            "INSERT INTO snapshots (bucket, key, body, saved_at_utc)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(bucket, key) DO UPDATE SET
               body = excluded.body,
               saved_at_utc = excluded.saved_at_utc",
            params![bucket, key, body, saved_at],
        )?;
        debug!(bucket, key, "snapshot saved");
        Ok(())
    }

    /// Run snapshots under `prefix`, weekly digests excluded.
    fn run_snapshots(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>, StoreError> {
        check_bucket(bucket)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, saved_at_utc FROM snapshots
             WHERE bucket = ?1 AND substr(key, 1, length(?2)) = ?2
               AND key LIKE '%.json'",
        )?;
        let rows = stmt.query_map(params![bucket, prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, DateTime<Utc>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (key, saved_at) = row?;
            if !is_weekly_key(&key) {
                out.push((key, saved_at));
            }
        }
        Ok(out)
    }

    fn read(&self, bucket: &str, key: &str) -> Result<Snapshot, StoreError> {
        let row: Option<(String, DateTime<Utc>)> = self
            .lock()?
            .query_row(
                "SELECT body, saved_at_utc FROM snapshots WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (body, saved_at) = row.ok_or(StoreError::NoMatch)?;
        let events: SourceGroup = serde_json::from_str(&body)
            .map_err(|err| StoreError::Other(format!("snapshot {key} is not valid JSON: {err}")))?;
        Ok(Snapshot {
            key: key.to_string(),
            saved_at,
            events,
        })
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load_latest(&self, bucket: &str, prefix: &str) -> Result<Snapshot, StoreError> {
        let candidates = self.run_snapshots(bucket, prefix)?;
        let (key, _) = candidates
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .ok_or(StoreError::NoMatch)?;
        debug!(bucket, key = %key, "loading latest snapshot");
        self.read(bucket, key)
    }

    fn load_closest_to(
        &self,
        bucket: &str,
        prefix: &str,
        target: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError> {
        let candidates = self.run_snapshots(bucket, prefix)?;
        let (key, _) = closest_to(&candidates, target).ok_or(StoreError::NoMatch)?;
        debug!(bucket, key = %key, target = %target, "loading snapshot closest to target");
        self.read(bucket, key)
    }

    fn save(&self, bucket: &str, key: &str, events: &SourceGroup) -> Result<(), StoreError> {
        self.save_at(bucket, key, events, Utc::now())
    }

    fn exists(&self, bucket: &str, key: &str) -> bool {
        let lookup = || -> Result<bool, StoreError> {
            check_bucket(bucket)?;
            let found: Option<i64> = self
                .lock()?
                .query_row(
                    "SELECT 1 FROM snapshots WHERE bucket = ?1 AND key = ?2",
                    params![bucket, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        };
        match lookup() {
            Ok(found) => found,
            Err(err) => {
                error!(bucket, key, error = %err, "checking snapshot existence failed");
                false
            }
        }
    }
}

fn check_bucket(bucket: &str) -> Result<(), StoreError> {
    if bucket.trim().is_empty() {
        Err(StoreError::NoCredentials)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventRecord;
    use chrono::{Duration, TimeZone};

    const BUCKET: &str = "jetaa-events";

    fn group(url: &str) -> SourceGroup {
        let mut group = SourceGroup::new();
        group.insert(
            "JETAA".to_string(),
            vec![EventRecord {
                event_source: Some("jetaa".into()),
                event_url: Some(url.to_string()),
                ..Default::default()
            }],
        );
        group
    }

    fn first_url(snapshot: &Snapshot) -> &str {
        snapshot.events["JETAA"][0].event_url.as_deref().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 21, 9, 0, 0).unwrap()
    }

    #[test]
    fn closest_picks_week_old_candidate() {
        let t = now();
        let candidates = vec![
            ("ten".to_string(), t - Duration::days(10)),
            ("seven".to_string(), t - Duration::days(7)),
            ("three".to_string(), t - Duration::days(3)),
        ];
        let picked = closest_to(&candidates, t - Duration::days(7)).unwrap();
        assert_eq!(picked.0, "seven");
    }

    #[test]
    fn closest_breaks_ties_towards_older() {
        let target = now();
        let candidates = vec![
            ("after".to_string(), target + Duration::hours(1)),
            ("before".to_string(), target - Duration::hours(1)),
        ];
        assert_eq!(closest_to(&candidates, target).unwrap().0, "before");
        assert!(closest_to(&[], target).is_none());
    }

    #[test]
    fn latest_skips_weekly_digests_and_other_prefixes() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let t = now();
        store
            .save_at(BUCKET, "as-json/events_a.json", &group("a"), t - Duration::days(2))
            .unwrap();
        store
            .save_at(BUCKET, "as-json/events_b.json", &group("b"), t - Duration::days(1))
            .unwrap();
        store
            .save_at(BUCKET, "as-json/weekly/events_2024-10-21.json", &group("w"), t)
            .unwrap();
        store
            .save_at(BUCKET, "as-csv/events_c.json", &group("c"), t)
            .unwrap();

        let latest = store.load_latest(BUCKET, "as-json").unwrap();
        assert_eq!(latest.key, "as-json/events_b.json");
        assert_eq!(first_url(&latest), "b");
        assert_eq!(latest.saved_at, t - Duration::days(1));
    }

    #[test]
    fn closest_load_selects_week_old_snapshot() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let t = now();
        for (key, days) in [("ten", 10), ("seven", 7), ("three", 3)] {
            store
                .save_at(
                    BUCKET,
                    &format!("as-json/events_{key}.json"),
                    &group(key),
                    t - Duration::days(days),
                )
                .unwrap();
        }

        let snapshot = store
            .load_closest_to(BUCKET, "as-json", t - Duration::days(7))
            .unwrap();
        assert_eq!(first_url(&snapshot), "seven");
    }

    #[test]
    fn closest_load_never_returns_weekly_digest() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let t = now();
        let week_ago = t - Duration::days(7);
        store
            .save_at(BUCKET, "as-json/weekly/events_2024-10-14.json", &group("w"), week_ago)
            .unwrap();
        store
            .save_at(BUCKET, "as-json/events_run.json", &group("run"), t - Duration::days(4))
            .unwrap();

        let snapshot = store.load_closest_to(BUCKET, "as-json", week_ago).unwrap();
        assert_eq!(snapshot.key, "as-json/events_run.json");
    }

    #[test]
    fn empty_store_reports_no_match() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        assert_eq!(
            store.load_latest(BUCKET, "as-json").unwrap_err(),
            StoreError::NoMatch
        );
        assert_eq!(
            store.load_closest_to(BUCKET, "as-json", now()).unwrap_err(),
            StoreError::NoMatch
        );
    }

    #[test]
    fn blank_bucket_reports_no_credentials() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        assert_eq!(
            store.load_latest("", "as-json").unwrap_err(),
            StoreError::NoCredentials
        );
        assert_eq!(
            store.save(" ", "as-json/x.json", &group("x")).unwrap_err(),
            StoreError::NoCredentials
        );
        assert!(!store.exists("", "as-json/x.json"));
    }

    #[test]
    fn resaving_a_key_replaces_it() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        let key = "as-json/events_x.json";
        assert!(!store.exists(BUCKET, key));

        store.save_at(BUCKET, key, &group("first"), now()).unwrap();
        store.save(BUCKET, key, &group("second")).unwrap();

        assert!(store.exists(BUCKET, key));
        assert!(!store.exists("other-bucket", key));
        let latest = store.load_latest(BUCKET, "as-json").unwrap();
        assert_eq!(first_url(&latest), "second");
    }

    #[test]
    fn snapshots_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshots.sqlite");
        {
            let store = SqliteSnapshotStore::open(&path).unwrap();
            store
                .save(BUCKET, "as-json/events_keep.json", &group("keep"))
                .unwrap();
        }

        let reopened = SqliteSnapshotStore::open(&path).unwrap();
        let latest = reopened.load_latest(BUCKET, "as-json").unwrap();
        assert_eq!(first_url(&latest), "keep");
    }

    #[test]
    fn corrupt_body_is_a_store_error() {
        let store = SqliteSnapshotStore::open_in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO snapshots (bucket, key, body, saved_at_utc) VALUES (?1, ?2, ?3, ?4)",
                params![BUCKET, "as-json/events_bad.json", "not json", now()],
            )
            .unwrap();

        match store.load_latest(BUCKET, "as-json") {
            Err(StoreError::Other(message)) => assert!(message.contains("events_bad")),
            other => panic!("expected decode failure, got {other:?}"),
        }
    }
}
