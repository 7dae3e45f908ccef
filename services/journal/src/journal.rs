use crate::error::{RecordError, StoreError};
use crate::metadata_store::MetadataStore;
use crate::models::{EntryRecord, JournalEntry, NewEntry, UploadResult, LISTING_PROJECTION};
use crate::thumbnail_cache::ThumbnailFetcher;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Entries of one listing, newest first. Consumed once; list again to refresh.
pub type EntryFeed = std::vec::IntoIter<JournalEntry>;

/// Persists journal entries and assembles the entry feed
pub struct JournalCoordinator {
    store: Arc<dyn MetadataStore>,
    fetcher: Arc<dyn ThumbnailFetcher>,
    fetch_concurrency: usize,
}

impl JournalCoordinator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        fetcher: Arc<dyn ThumbnailFetcher>,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Persist an entry for a completed upload
    #[instrument(skip(self, upload))]
    pub async fn record_entry(
        &self,
        owner_id: &str,
        upload: &UploadResult,
    ) -> Result<JournalEntry, RecordError> {
        if upload.video_location.is_empty() {
            return Err(RecordError::IncompleteUpload("video"));
        }
        if upload.thumbnail_location.is_empty() {
            return Err(RecordError::IncompleteUpload("thumbnail"));
        }

        let new_entry = NewEntry {
            owner_id: owner_id.to_string(),
            captured_at: upload.captured_at,
            video_location: upload.video_location.clone(),
            thumbnail_location: upload.thumbnail_location.clone(),
        };

        let entry = self
            .store
            .create_entry(&new_entry)
            .await
            .map_err(|e| RecordError::PersistFailed(e.to_string()))?;

        metrics::counter!("journal.entries.recorded").increment(1);
        info!(entry_id = %entry.id, owner_id = %owner_id, "Journal entry recorded");

        Ok(entry)
    }

    /// List an owner's entries with thumbnails prefetched, newest first.
    ///
    /// Records whose thumbnail cannot be fetched are left out of the feed.
    #[instrument(skip(self))]
    pub async fn list_entries(&self, owner_id: &str) -> Result<EntryFeed, StoreError> {
        let records = self
            .store
            .query_entries(owner_id, LISTING_PROJECTION)
            .await?;
        let total = records.len();

        let candidates: Vec<JournalEntry> = records
            .into_iter()
            .filter_map(|record| visible_entry(owner_id, record))
            .collect();

        let fetcher = self.fetcher.clone();
        let mut entries: Vec<JournalEntry> = stream::iter(candidates)
            .map(move |mut entry| {
                let fetcher = fetcher.clone();
                async move {
                    match fetcher.fetch(&entry.thumbnail_location).await {
                        Ok(path) => {
                            entry.cached_thumbnail = Some(path);
                            Some(entry)
                        }
                        Err(e) => {
                            warn!(
                                entry_id = %entry.id,
                                url = %entry.thumbnail_location,
                                error = %e,
                                "Thumbnail fetch failed, omitting entry"
                            );
                            metrics::counter!("journal.thumbnails.fetch_failed").increment(1);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.fetch_concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        entries.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));

        debug!(
            owner_id = %owner_id,
            records = total,
            listed = entries.len(),
            "Entry feed assembled"
        );

        Ok(entries.into_iter())
    }

    pub async fn fetch_entry(&self, id: Uuid) -> Result<Option<JournalEntry>, StoreError> {
        self.store.fetch_entry(id).await
    }

    /// Delete an entry record. Its media objects stay in the bucket.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = self.store.delete_entry(id).await?;
        if deleted {
            info!(entry_id = %id, "Journal entry deleted");
        }
        Ok(deleted)
    }

    /// Days since the owner's first record that have no entry
    pub async fn missing_dates_for(
        &self,
        owner_id: &str,
        entries: &[JournalEntry],
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let since = self
            .store
            .earliest_entry_date(owner_id)
            .await?
            .unwrap_or_else(Utc::now);

        Ok(missing_dates(entries, since))
    }
}

/// Turn a projected record into an entry if it carries everything a visible entry needs
fn visible_entry(owner_id: &str, record: EntryRecord) -> Option<JournalEntry> {
    let captured_at = record.captured_at?;
    let thumbnail_location = record.thumbnail_url.filter(|url| !url.is_empty())?;
    let video_location = record.video_url.filter(|url| !url.is_empty())?;

    Some(JournalEntry {
        id: record.id,
        owner_id: record.owner_id.unwrap_or_else(|| owner_id.to_string()),
        captured_at,
        video_location,
        thumbnail_location,
        cached_thumbnail: None,
    })
}

/// Every UTC day from `since` through today with no entry, oldest first
pub fn missing_dates(entries: &[JournalEntry], since: DateTime<Utc>) -> Vec<NaiveDate> {
    missing_dates_until(entries, since.date_naive(), Utc::now().date_naive())
}

/// Every day from `since` through `today` inclusive with no entry, oldest first
pub fn missing_dates_until(
    entries: &[JournalEntry],
    since: NaiveDate,
    today: NaiveDate,
) -> Vec<NaiveDate> {
    let recorded: HashSet<NaiveDate> = entries
        .iter()
        .map(|entry| entry.captured_at.date_naive())
        .collect();

    since
        .iter_days()
        .take_while(|day| *day <= today)
        .filter(|day| !recorded.contains(day))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::MockMetadataStore;
    use crate::thumbnail_cache::MockThumbnailFetcher;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    fn entry(captured_at: DateTime<Utc>) -> JournalEntry {
        JournalEntry {
            id: Uuid::new_v4(),
            owner_id: "user-42".to_string(),
            captured_at,
            video_location: "https://b.host/v.mp4".to_string(),
            thumbnail_location: "https://b.host/v_thumbnail.jpg".to_string(),
            cached_thumbnail: None,
        }
    }

    fn record(name: &str, captured_at: DateTime<Utc>) -> EntryRecord {
        EntryRecord {
            id: Uuid::new_v4(),
            owner_id: None,
            captured_at: Some(captured_at),
            video_url: Some(format!("https://b.host/{name}.mp4")),
            thumbnail_url: Some(format!("https://b.host/{name}_thumbnail.jpg")),
        }
    }

    fn upload_result() -> UploadResult {
        UploadResult {
            video_location: "https://b.host/user-42_1.000.mp4".to_string(),
            thumbnail_location: "https://b.host/user-42_1.000_thumbnail.jpg".to_string(),
            captured_at: at(2024, 1, 15),
        }
    }

    fn coordinator(store: MockMetadataStore, fetcher: MockThumbnailFetcher) -> JournalCoordinator {
        JournalCoordinator::new(Arc::new(store), Arc::new(fetcher), 4)
    }

    fn caching_fetcher() -> MockThumbnailFetcher {
        let mut fetcher = MockThumbnailFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|url| Ok(PathBuf::from("/cache").join(url.rsplit('/').next().unwrap())));
        fetcher
    }

    #[tokio::test]
    async fn test_record_entry_persists_upload() {
        let mut store = MockMetadataStore::new();
        store
            .expect_create_entry()
            .withf(|e| {
                e.owner_id == "user-42"
                    && e.captured_at == at(2024, 1, 15)
                    && e.video_location.ends_with(".mp4")
                    && e.thumbnail_location.ends_with("_thumbnail.jpg")
            })
            .times(1)
            .returning(|e| {
                Ok(JournalEntry {
                    id: Uuid::new_v4(),
                    owner_id: e.owner_id.clone(),
                    captured_at: e.captured_at,
                    video_location: e.video_location.clone(),
                    thumbnail_location: e.thumbnail_location.clone(),
                    cached_thumbnail: None,
                })
            });

        let coordinator = coordinator(store, MockThumbnailFetcher::new());
        let entry = coordinator
            .record_entry("user-42", &upload_result())
            .await
            .unwrap();

        assert_eq!(entry.owner_id, "user-42");
        assert_eq!(entry.video_location, upload_result().video_location);
    }

    #[tokio::test]
    async fn test_record_entry_store_failure() {
        let mut store = MockMetadataStore::new();
        store
            .expect_create_entry()
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));

        let coordinator = coordinator(store, MockThumbnailFetcher::new());
        let err = coordinator
            .record_entry("user-42", &upload_result())
            .await
            .unwrap_err();

        assert!(matches!(err, RecordError::PersistFailed(_)));
    }

    #[tokio::test]
    async fn test_record_entry_rejects_incomplete_upload() {
        let mut store = MockMetadataStore::new();
        store.expect_create_entry().never();

        let mut upload = upload_result();
        upload.thumbnail_location.clear();

        let coordinator = coordinator(store, MockThumbnailFetcher::new());
        let err = coordinator.record_entry("user-42", &upload).await.unwrap_err();

        assert!(matches!(err, RecordError::IncompleteUpload("thumbnail")));
    }

    #[tokio::test]
    async fn test_list_entries_sorted_newest_first() {
        let mut store = MockMetadataStore::new();
        store
            .expect_query_entries()
            .withf(|owner, projection| owner == "user-42" && projection == LISTING_PROJECTION)
            .returning(|_, _| {
                Ok(vec![
                    record("jan2", at(2024, 1, 2)),
                    record("jan5", at(2024, 1, 5)),
                    record("jan1", at(2024, 1, 1)),
                ])
            });

        let coordinator = coordinator(store, caching_fetcher());
        let entries: Vec<_> = coordinator.list_entries("user-42").await.unwrap().collect();

        let dates: Vec<_> = entries.iter().map(|e| e.captured_at).collect();
        assert_eq!(dates, vec![at(2024, 1, 5), at(2024, 1, 2), at(2024, 1, 1)]);
        assert_eq!(
            entries[0].cached_thumbnail,
            Some(PathBuf::from("/cache/jan5_thumbnail.jpg"))
        );
        assert!(entries.iter().all(|e| e.owner_id == "user-42"));
    }

    #[tokio::test]
    async fn test_list_entries_omits_failed_thumbnail() {
        let mut store = MockMetadataStore::new();
        store.expect_query_entries().returning(|_, _| {
            Ok(vec![
                record("jan1", at(2024, 1, 1)),
                record("jan2", at(2024, 1, 2)),
                record("jan3", at(2024, 1, 3)),
            ])
        });

        let mut fetcher = MockThumbnailFetcher::new();
        fetcher.expect_fetch().returning(|url| {
            if url.contains("jan2") {
                Err(anyhow!("404 Not Found"))
            } else {
                Ok(PathBuf::from("/cache/thumb.jpg"))
            }
        });

        let coordinator = coordinator(store, fetcher);
        let entries: Vec<_> = coordinator.list_entries("user-42").await.unwrap().collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].captured_at, at(2024, 1, 3));
        assert_eq!(entries[1].captured_at, at(2024, 1, 1));
    }

    #[tokio::test]
    async fn test_list_entries_skips_records_without_thumbnail() {
        let mut store = MockMetadataStore::new();
        store.expect_query_entries().returning(|_, _| {
            let mut incomplete = record("jan2", at(2024, 1, 2));
            incomplete.thumbnail_url = None;
            Ok(vec![record("jan1", at(2024, 1, 1)), incomplete])
        });

        let mut fetcher = MockThumbnailFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(PathBuf::from("/cache/jan1_thumbnail.jpg")));

        let coordinator = coordinator(store, fetcher);
        let entries: Vec<_> = coordinator.list_entries("user-42").await.unwrap().collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].captured_at, at(2024, 1, 1));
    }

    #[tokio::test]
    async fn test_list_entries_query_failure() {
        let mut store = MockMetadataStore::new();
        store
            .expect_query_entries()
            .returning(|_, _| Err(StoreError::Unavailable("timeout".to_string())));

        let coordinator = coordinator(store, MockThumbnailFetcher::new());
        assert!(matches!(
            coordinator.list_entries("user-42").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_missing_dates_single_gap() {
        let entries = vec![entry(at(2024, 1, 1)), entry(at(2024, 1, 3))];
        assert_eq!(
            missing_dates_until(&entries, day(2024, 1, 1), day(2024, 1, 3)),
            vec![day(2024, 1, 2)]
        );
    }

    #[test]
    fn test_missing_dates_includes_today() {
        let entries = vec![entry(at(2024, 1, 1))];
        assert_eq!(
            missing_dates_until(&entries, day(2024, 1, 1), day(2024, 1, 3)),
            vec![day(2024, 1, 2), day(2024, 1, 3)]
        );
    }

    #[test]
    fn test_missing_dates_since_after_today_is_empty() {
        assert!(missing_dates_until(&[], day(2024, 2, 1), day(2024, 1, 1)).is_empty());
    }

    #[test]
    fn test_missing_dates_multiple_entries_same_day() {
        let entries = vec![
            entry(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap()),
            entry(Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap()),
            entry(at(2024, 1, 2)),
        ];
        assert!(missing_dates_until(&entries, day(2024, 1, 1), day(2024, 1, 2)).is_empty());
    }

    #[tokio::test]
    async fn test_missing_dates_for_new_user_is_only_today() {
        let mut store = MockMetadataStore::new();
        store.expect_earliest_entry_date().returning(|_| Ok(None));

        let coordinator = coordinator(store, MockThumbnailFetcher::new());
        let missing = coordinator.missing_dates_for("user-42", &[]).await.unwrap();

        assert_eq!(missing, vec![Utc::now().date_naive()]);
    }

    #[tokio::test]
    async fn test_missing_dates_for_starts_at_earliest_record() {
        let three_days_ago = Utc::now() - chrono::Duration::days(3);
        let mut store = MockMetadataStore::new();
        store
            .expect_earliest_entry_date()
            .returning(move |_| Ok(Some(three_days_ago)));

        let coordinator = coordinator(store, MockThumbnailFetcher::new());
        let entries = vec![entry(three_days_ago)];
        let missing = coordinator
            .missing_dates_for("user-42", &entries)
            .await
            .unwrap();

        assert_eq!(missing.len(), 3);
        assert_eq!(missing.first(), Some(&(three_days_ago.date_naive() + chrono::Duration::days(1))));
    }
}
