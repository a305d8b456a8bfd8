//! User directory: profiles used to snapshot party names.

use chrono::Utc;
use common::UserId;
use domain::{Actor, PartySnapshot, UserProfile};
use serde::{Deserialize, Serialize};
use store::{MarketStore, MarketStoreExt, UnitOfWork};

use crate::error::{Result, SagaError};

/// Editable part of a profile. Role and email come from the caller identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Clone)]
pub struct DirectoryService<S> {
    store: S,
}

impl<S: MarketStore + Clone> DirectoryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, input), fields(user_id = %actor.user_id))]
    pub async fn upsert_profile(&self, actor: &Actor, input: ProfileInput) -> Result<UserProfile> {
        if input.name.trim().is_empty() {
            return Err(SagaError::Validation("name is required".to_string()));
        }
        let profile = UserProfile {
            id: actor.user_id,
            name: input.name.trim().to_string(),
            email: actor.email.clone(),
            role: actor.role,
            company: input.company.filter(|c| !c.trim().is_empty()),
            updated_at: Utc::now(),
        };

        let mut uow = self.store.begin().await?;
        uow.upsert_user(&profile).await?;
        uow.commit().await?;
        Ok(profile)
    }

    pub async fn profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| SagaError::not_found("user", user_id))
    }
}

/// Snapshot of the caller, falling back to the asserted email when no
/// profile has been saved yet.
pub(crate) async fn party_for_actor(uow: &mut dyn UnitOfWork, actor: &Actor) -> Result<PartySnapshot> {
    Ok(match uow.get_user(actor.user_id).await? {
        Some(profile) => PartySnapshot::from(&profile),
        None => PartySnapshot {
            id: actor.user_id,
            name: actor.email.clone(),
            email: actor.email.clone(),
        },
    })
}

/// Snapshot of another party, falling back to a known display name.
pub(crate) async fn party_for_user(
    uow: &mut dyn UnitOfWork,
    user_id: UserId,
    fallback_name: &str,
) -> Result<PartySnapshot> {
    Ok(match uow.get_user(user_id).await? {
        Some(profile) => PartySnapshot::from(&profile),
        None => PartySnapshot {
            id: user_id,
            name: fallback_name.to_string(),
            email: String::new(),
        },
    })
}
