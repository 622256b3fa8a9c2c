//! Public user profiles
//!
//! Profiles belong to the identity provider; this directory only mirrors
//! the fields the relationship and conversation views display.

use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{validate_id, UserProfile};
use crate::store::UserStore;

const MAX_DISPLAY_NAME_CHARS: usize = 80;

pub struct UserDirectory {
    store: Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Profile for `user_id`, or `NotFound`
    pub async fn require(&self, user_id: &str) -> Result<UserProfile> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", user_id)))
    }

    /// Profile for display; users unknown to the directory show their id
    pub async fn profile_or_placeholder(&self, user_id: &str) -> Result<UserProfile> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .unwrap_or_else(|| UserProfile {
                id: user_id.to_string(),
                display_name: user_id.to_string(),
                email: String::new(),
            }))
    }

    pub async fn search(&self, query: &str, exclude_user_id: &str, limit: u32) -> Result<Vec<UserProfile>> {
        self.store.search_users(query, exclude_user_id, limit).await
    }

    /// Create or refresh the caller's own profile
    pub async fn upsert(&self, user_id: &str, display_name: &str, email: &str) -> Result<UserProfile> {
        validate_id("user id", user_id)?;

        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::Validation("Display name must not be empty".into()));
        }
        if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(Error::Validation("Display name too long".into()));
        }

        let email = email.trim().to_lowercase();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(Error::Validation("Malformed email".into())),
        }

        let profile = UserProfile {
            id: user_id.to_string(),
            display_name: display_name.to_string(),
            email,
        };
        self.store.upsert_user(&profile).await?;

        info!("[Users] Profile stored for {}", user_id);
        Ok(profile)
    }
}
