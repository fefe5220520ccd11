//! crates/medi_core/src/profile.rs
//!
//! Loading and saving the patient profile, and the avatar upload that feeds it.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{DocumentFile, Profile, ProfileUpdate, Session};
use crate::error::{Operation, WorkflowError};
use crate::ports::Services;

const AVATAR_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// The stored profile, or an empty one when there is none or the read fails.
pub async fn load_profile(services: &Services, user_id: Uuid) -> Profile {
    match services.db.get_profile(user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => Profile::empty(user_id),
        Err(e) => {
            Operation::LoadProfile.log(&e);
            Profile::empty(user_id)
        }
    }
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_measure(name: &str, value: Option<f64>) -> Result<Option<f64>, WorkflowError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(WorkflowError::Validation(format!(
            "{name} must be a non-negative number"
        ))),
        other => Ok(other),
    }
}

/// Validates the form input and turns it into the row to upsert.
pub fn build_profile(user_id: Uuid, update: ProfileUpdate) -> Result<Profile, WorkflowError> {
    Ok(Profile {
        id: user_id,
        name: clean_text(update.name),
        birthday: update.birthday,
        height: check_measure("Height", update.height)?,
        weight: check_measure("Weight", update.weight)?,
        country: clean_text(update.country),
        avatar_url: clean_text(update.avatar_url),
        updated_at: Some(Utc::now()),
    })
}

pub async fn save_profile(
    services: &Services,
    user_id: Uuid,
    update: ProfileUpdate,
) -> Result<Profile, WorkflowError> {
    let profile = build_profile(user_id, update)?;
    let saved = services
        .db
        .upsert_profile(&profile)
        .await
        .map_err(|e| Operation::SaveProfile.fail(e))?;
    info!(user_id = %user_id, "profile saved");
    Ok(saved)
}

fn is_image(file: &DocumentFile) -> bool {
    let by_type = file
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    let by_ext = file
        .extension()
        .is_some_and(|ext| AVATAR_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext)));
    by_type || by_ext
}

/// Stores a new avatar image and points the profile at it. The uploaded image is
/// removed again if the profile cannot be saved.
pub async fn upload_avatar(
    services: &Services,
    session: &Session,
    file: DocumentFile,
) -> Result<Profile, WorkflowError> {
    if file.bytes.is_empty() || !is_image(&file) {
        return Err(WorkflowError::Validation(
            "You must select an image to upload.".to_string(),
        ));
    }

    let bucket = &services.buckets.avatars;
    let path = crate::ingestion::object_name(&file);
    services
        .storage
        .upload(session, bucket, &path, file.bytes, file.content_type.as_deref())
        .await
        .map_err(|e| Operation::UploadObject.fail(e))?;

    let current = load_profile(services, session.user_id).await;
    let update = ProfileUpdate {
        name: current.name,
        birthday: current.birthday,
        height: current.height,
        weight: current.weight,
        country: current.country,
        avatar_url: Some(path.clone()),
    };

    match save_profile(services, session.user_id, update).await {
        Ok(profile) => Ok(profile),
        Err(err) => {
            if let Err(undo) = services.storage.remove(session, bucket, &path).await {
                error!(path = %path, error = %undo, "avatar image is orphaned");
            } else {
                warn!(path = %path, "removed avatar after failed profile save");
            }
            Err(err)
        }
    }
}

//=========================================================================================
// Stale-load guard
//=========================================================================================

/// Hands out a ticket per load; only the newest ticket may store its result.
#[derive(Debug, Default)]
pub struct ProfileSlot {
    generation: u64,
    profile: Option<Profile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

impl ProfileSlot {
    pub fn begin(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket(self.generation)
    }

    /// Stores the result unless a newer load started meanwhile.
    pub fn apply(&mut self, ticket: LoadTicket, profile: Profile) -> bool {
        if ticket.0 != self.generation {
            return false;
        }
        self.profile = Some(profile);
        true
    }

    /// A save always wins and invalidates loads still in flight.
    pub fn store(&mut self, profile: Profile) {
        self.generation += 1;
        self.profile = Some(profile);
    }

    pub fn current(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.profile = None;
    }
}
