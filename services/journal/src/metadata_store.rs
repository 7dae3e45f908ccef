use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{EntryField, EntryRecord, JournalEntry, NewEntry, NewProfile, UserProfile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Durable store for journal entry and profile records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Atomically create an entry; the store assigns its id
    async fn create_entry(&self, entry: &NewEntry) -> Result<JournalEntry, StoreError>;

    /// All entries owned by `owner_id`, limited to `projection`
    async fn query_entries(
        &self,
        owner_id: &str,
        projection: &[EntryField],
    ) -> Result<Vec<EntryRecord>, StoreError>;

    async fn fetch_entry(&self, id: Uuid) -> Result<Option<JournalEntry>, StoreError>;

    /// Returns whether a record was deleted
    async fn delete_entry(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Creation time of the owner's oldest entry record
    async fn earliest_entry_date(
        &self,
        owner_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, StoreError>;

    async fn fetch_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Overwrite a profile; `StoreError::NotFound` if it does not exist
    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError>;

    /// Connectivity check for the readiness endpoint
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Entry row as read from PostgreSQL; columns outside the projection default to `None`
#[derive(Debug, FromRow)]
struct EntryRow {
    id: Uuid,
    #[sqlx(default)]
    owner_id: Option<String>,
    #[sqlx(default)]
    captured_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    video_url: Option<String>,
    #[sqlx(default)]
    thumbnail_url: Option<String>,
}

impl From<EntryRow> for EntryRecord {
    fn from(row: EntryRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            captured_at: row.captured_at,
            video_url: row.video_url,
            thumbnail_url: row.thumbnail_url,
        }
    }
}

/// Full entry row
#[derive(Debug, FromRow)]
struct FullEntryRow {
    id: Uuid,
    owner_id: String,
    captured_at: DateTime<Utc>,
    video_url: String,
    thumbnail_url: String,
}

impl From<FullEntryRow> for JournalEntry {
    fn from(row: FullEntryRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            captured_at: row.captured_at,
            video_location: row.video_url,
            thumbnail_location: row.thumbnail_url,
            cached_thumbnail: None,
        }
    }
}

const PROFILE_COLUMNS: &str =
    "id, display_name, email, journal_settings, preferences, last_sign_in, created_at";

/// Build the SELECT for an owner-filtered entry query. The id is always selected.
fn entry_query_sql(projection: &[EntryField]) -> String {
    let mut columns = vec![EntryField::Id.column()];
    for field in projection {
        let column = field.column();
        // created_at is not part of EntryRecord
        if !columns.contains(&column) && *field != EntryField::CreatedAt {
            columns.push(column);
        }
    }

    format!(
        "SELECT {} FROM entries WHERE owner_id = $1",
        columns.join(", ")
    )
}

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(skip(self, entry), fields(owner_id = %entry.owner_id))]
    async fn create_entry(&self, entry: &NewEntry) -> Result<JournalEntry, StoreError> {
        let row = sqlx::query_as::<_, FullEntryRow>(
            r#"
            INSERT INTO entries (owner_id, captured_at, video_url, thumbnail_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, owner_id, captured_at, video_url, thumbnail_url
            "#,
        )
        .bind(&entry.owner_id)
        .bind(entry.captured_at)
        .bind(&entry.video_location)
        .bind(&entry.thumbnail_location)
        .fetch_one(&self.pool)
        .await?;

        debug!(entry_id = %row.id, "Entry record created");

        Ok(row.into())
    }

    #[instrument(skip(self, projection))]
    async fn query_entries(
        &self,
        owner_id: &str,
        projection: &[EntryField],
    ) -> Result<Vec<EntryRecord>, StoreError> {
        let sql = entry_query_sql(projection);

        let rows = sqlx::query_as::<_, EntryRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(EntryRecord::from).collect())
    }

    async fn fetch_entry(&self, id: Uuid) -> Result<Option<JournalEntry>, StoreError> {
        let row = sqlx::query_as::<_, FullEntryRow>(
            r#"
            SELECT id, owner_id, captured_at, video_url, thumbnail_url
            FROM entries
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(JournalEntry::from))
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM entries WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn earliest_entry_date(
        &self,
        owner_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let earliest: (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT MIN(created_at) FROM entries WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(earliest.0)
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, display_name, email, journal_settings, preferences)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PROFILE_COLUMNS}
            "#
        );

        let created = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(&profile.id)
            .bind(&profile.display_name)
            .bind(&profile.email)
            .bind(&profile.journal_settings)
            .bind(&profile.preferences)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn fetch_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1");

        let profile = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET display_name = $2, email = $3, journal_settings = $4,
                preferences = $5, last_sign_in = $6
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, UserProfile>(&sql)
            .bind(&profile.id)
            .bind(&profile.display_name)
            .bind(&profile.email)
            .bind(&profile.journal_settings)
            .bind(&profile.preferences)
            .bind(profile.last_sign_in)
            .fetch_optional(&self.pool)
            .await?;

        updated.ok_or_else(|| StoreError::NotFound(format!("user {}", profile.id)))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_query_always_selects_id() {
        assert_eq!(
            entry_query_sql(&[EntryField::CapturedAt]),
            "SELECT id, captured_at FROM entries WHERE owner_id = $1"
        );
    }

    #[test]
    fn test_entry_query_listing_projection() {
        assert_eq!(
            entry_query_sql(crate::models::LISTING_PROJECTION),
            "SELECT id, captured_at, thumbnail_url, video_url FROM entries WHERE owner_id = $1"
        );
    }

    #[test]
    fn test_entry_query_skips_duplicates_and_created_at() {
        assert_eq!(
            entry_query_sql(&[EntryField::Id, EntryField::CreatedAt, EntryField::OwnerId]),
            "SELECT id, owner_id FROM entries WHERE owner_id = $1"
        );
    }

    #[test]
    fn test_full_row_into_entry() {
        let row = FullEntryRow {
            id: Uuid::nil(),
            owner_id: "u1".to_string(),
            captured_at: Utc::now(),
            video_url: "https://b.h/u1_1.000.mp4".to_string(),
            thumbnail_url: "https://b.h/u1_1.000_thumbnail.jpg".to_string(),
        };

        let entry: JournalEntry = row.into();
        assert_eq!(entry.video_location, "https://b.h/u1_1.000.mp4");
        assert!(entry.cached_thumbnail.is_none());
    }
}
