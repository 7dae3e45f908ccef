use crate::error::StoreError;
use crate::metadata_store::MetadataStore;
use crate::models::{NewProfile, ProfileUpdate, UserProfile};
use std::sync::Arc;
use tracing::{info, instrument};

/// User profile operations on top of the metadata store
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn MetadataStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    pub async fn create_profile(&self, profile: &NewProfile) -> Result<UserProfile, StoreError> {
        let created = self.store.create_profile(profile).await?;
        info!("Profile created");
        Ok(created)
    }

    pub async fn fetch_profile(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.store.fetch_profile(id).await
    }

    /// Apply a settings update; `StoreError::NotFound` if the profile is missing
    #[instrument(skip(self, update))]
    pub async fn update_settings(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<UserProfile, StoreError> {
        let mut profile = self
            .store
            .fetch_profile(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;

        update.apply(&mut profile);
        self.store.update_profile(&profile).await
    }
}
