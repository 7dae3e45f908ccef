use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use uuid::Uuid;

/// A persisted journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Identifier assigned by the metadata store
    pub id: Uuid,
    /// Owning user profile
    pub owner_id: String,
    /// When the video was recorded
    pub captured_at: DateTime<Utc>,
    /// Public URL of the uploaded video
    pub video_location: String,
    /// Public URL of the uploaded thumbnail
    pub thumbnail_location: String,
    /// Local copy of the thumbnail, set by listings only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_thumbnail: Option<PathBuf>,
}

/// Locations of a fully uploaded video and its thumbnail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub video_location: String,
    pub thumbnail_location: String,
    /// Timestamp the object keys were derived from
    pub captured_at: DateTime<Utc>,
}

/// Entry fields as submitted to the store, before an id is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub owner_id: String,
    pub captured_at: DateTime<Utc>,
    pub video_location: String,
    pub thumbnail_location: String,
}

/// Named fields of the entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryField {
    Id,
    OwnerId,
    CapturedAt,
    VideoUrl,
    ThumbnailUrl,
    CreatedAt,
}

impl EntryField {
    /// Column name in the metadata store
    pub fn column(&self) -> &'static str {
        match self {
            EntryField::Id => "id",
            EntryField::OwnerId => "owner_id",
            EntryField::CapturedAt => "captured_at",
            EntryField::VideoUrl => "video_url",
            EntryField::ThumbnailUrl => "thumbnail_url",
            EntryField::CreatedAt => "created_at",
        }
    }
}

/// Fields requested when building the entry feed
pub const LISTING_PROJECTION: &[EntryField] = &[
    EntryField::Id,
    EntryField::CapturedAt,
    EntryField::ThumbnailUrl,
    EntryField::VideoUrl,
];

/// A projected entry record; fields outside the projection are `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryRecord {
    pub id: Uuid,
    pub owner_id: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// A user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    /// Stable identifier issued by the identity provider
    pub id: String,
    /// Name the user would like to be called
    pub display_name: String,
    pub email: Option<String>,
    /// Free-text settings used to tune journal prompts
    pub journal_settings: String,
    pub preferences: Vec<String>,
    pub last_sign_in: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a profile
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub journal_settings: String,
    #[serde(default)]
    pub preferences: Vec<String>,
}

/// Partial update applied by settings screens
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub journal_settings: Option<String>,
    pub preferences: Option<Vec<String>>,
}

impl ProfileUpdate {
    /// Apply the set fields onto a profile
    pub fn apply(self, profile: &mut UserProfile) {
        if let Some(name) = self.display_name {
            profile.display_name = name;
        }
        if let Some(settings) = self.journal_settings {
            profile.journal_settings = settings;
        }
        if let Some(preferences) = self.preferences {
            profile.preferences = preferences;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            id: "001234.abcd".to_string(),
            display_name: "Sam".to_string(),
            email: None,
            journal_settings: "gratitude".to_string(),
            preferences: vec!["morning".to_string()],
            last_sign_in: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_update_applies_only_set_fields() {
        let mut p = profile();
        ProfileUpdate {
            journal_settings: Some("reflection".to_string()),
            ..Default::default()
        }
        .apply(&mut p);

        assert_eq!(p.display_name, "Sam");
        assert_eq!(p.journal_settings, "reflection");
        assert_eq!(p.preferences, vec!["morning".to_string()]);
    }

    #[test]
    fn test_listing_projection_columns() {
        let columns: Vec<_> = LISTING_PROJECTION.iter().map(EntryField::column).collect();
        assert_eq!(columns, vec!["id", "captured_at", "thumbnail_url", "video_url"]);
    }

    #[test]
    fn test_cached_thumbnail_not_serialized_when_absent() {
        let entry = JournalEntry {
            id: Uuid::nil(),
            owner_id: "u1".to_string(),
            captured_at: Utc::now(),
            video_location: "https://b.host/u1_1.mp4".to_string(),
            thumbnail_location: "https://b.host/u1_1_thumbnail.jpg".to_string(),
            cached_thumbnail: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("cached_thumbnail").is_none());
    }
}
