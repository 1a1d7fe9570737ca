//! JSON-file profile storage

use super::profile::{PlayerProfile, ProfileStore};
use crate::error::{ProfileError, ProfileResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs as tokio_fs, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// Stores each profile as `<player_id>.profile.json` in one directory.
///
/// Player ids come from clients, so only ids made of ASCII letters, digits,
/// `_` and `-` map to a file; anything else is rejected with
/// [`ProfileError::InvalidId`]. Writes go to a temporary file that is synced and renamed over the target,
/// so a crash never leaves a half-written profile behind.
#[derive(Debug)]
pub struct JsonProfileStore {
    profile_dir: PathBuf,
}

impl JsonProfileStore {
    /// Opens the store, creating `profile_dir` when missing.
    pub async fn open(profile_dir: impl Into<PathBuf>) -> ProfileResult<Self> {
        let profile_dir = profile_dir.into();
        tokio_fs::create_dir_all(&profile_dir)
            .await
            .map_err(|e| ProfileError::FileWrite(profile_dir.clone(), e))?;
        Ok(Self { profile_dir })
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    fn profile_path(&self, player_id: &str) -> ProfileResult<PathBuf> {
        let valid = !player_id.is_empty()
            && player_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            warn!(player_id, "Rejected profile id that does not map to a file name");
            return Err(ProfileError::InvalidId(player_id.to_string()));
        }
        Ok(self.profile_dir.join(format!("{player_id}.profile.json")))
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    #[instrument(skip(self))]
    async fn load(&self, player_id: &str) -> ProfileResult<PlayerProfile> {
        let path = self.profile_path(player_id)?;
        let contents = match tokio_fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProfileError::NotFound(player_id.to_string()));
            }
            Err(e) => return Err(ProfileError::FileRead(path, e)),
        };

        serde_json::from_str(&contents).map_err(|e| ProfileError::Deserialization(path, e))
    }

    #[instrument(skip(self, profile), fields(player_id = %profile.id))]
    async fn save(&self, profile: &PlayerProfile) -> ProfileResult<()> {
        let path = self.profile_path(&profile.id)?;
        let temp_path = path.with_extension("tmp");

        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| ProfileError::Serialization(profile.id.clone(), e))?;

        let mut file = tokio_fs::File::create(&temp_path)
            .await
            .map_err(|e| ProfileError::FileWrite(temp_path.clone(), e))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| ProfileError::FileWrite(temp_path.clone(), e))?;
        file.sync_all()
            .await
            .map_err(|e| ProfileError::FileWrite(temp_path.clone(), e))?;

        tokio_fs::rename(&temp_path, &path)
            .await
            .map_err(|e| ProfileError::FileRename(temp_path, path.clone(), e))?;

        debug!("Saved profile to {}", path.display());
        Ok(())
    }
}
