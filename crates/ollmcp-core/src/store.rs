//! Saved settings on disk.
//!
//! Profiles live as JSON files in one directory: the default profile is
//! `config.json`, a named one is `<name>.json`.

use crate::error::{ConfigError, CoreError, CoreResult};
use crate::snapshot::ConfigSnapshot;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name of the default profile.
pub const DEFAULT_FILE: &str = "config.json";

/// Name used for the default profile.
pub const DEFAULT_PROFILE: &str = "default";

/// Stem of [`DEFAULT_FILE`]. A named profile that sanitizes to it gets
/// [`RESERVED_SUFFIX`] appended so it cannot replace the default profile.
const RESERVED_STEM: &str = "config";
const RESERVED_SUFFIX: &str = "_profile";

/// Reduce a profile name to a safe file stem.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        DEFAULT_PROFILE.to_string()
    } else {
        cleaned
    }
}

/// Directory of saved profiles.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.config/ollmcp`.
    pub fn default_location() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::InvalidPath("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".config").join("ollmcp")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing profile `name`, or the default profile for `None`.
    pub fn path_for(&self, name: Option<&str>) -> PathBuf {
        match name.map(sanitize) {
            Some(stem) if stem == RESERVED_STEM => {
                self.dir.join(format!("{stem}{RESERVED_SUFFIX}.json"))
            }
            Some(stem) if stem != DEFAULT_PROFILE => self.dir.join(format!("{stem}.json")),
            _ => self.dir.join(DEFAULT_FILE),
        }
    }

    /// Write `snapshot` atomically and return the file written.
    pub async fn save(&self, name: Option<&str>, snapshot: &ConfigSnapshot) -> CoreResult<PathBuf> {
        let path = self.path_for(name);
        debug!(path = %path.display(), "Saving config");

        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(snapshot)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        info!(path = %path.display(), "Config saved");
        Ok(path)
    }

    /// Read profile `name`. A missing file is `Ok(None)`.
    pub async fn load(&self, name: Option<&str>) -> CoreResult<Option<ConfigSnapshot>> {
        let path = self.path_for(name);
        debug!(path = %path.display(), "Loading config");

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::Io(e)),
        };

        let snapshot: ConfigSnapshot =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidJson {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    /// Names of saved profiles, sorted. The default profile is listed as
    /// `default`.
    pub async fn list_profiles(&self) -> CoreResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if format!("{stem}.json") == DEFAULT_FILE {
                names.push(DEFAULT_PROFILE.to_string());
            } else {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("My Profile!"), "myprofile");
        assert_eq!(sanitize("dev_box-2"), "dev_box-2");
        assert_eq!(sanitize("../../etc"), "etc");
        assert_eq!(sanitize("???"), "default");
    }

    #[test]
    fn test_paths() {
        let store = ConfigStore::new("/tmp/ollmcp");
        assert_eq!(store.path_for(None), PathBuf::from("/tmp/ollmcp/config.json"));
        assert_eq!(
            store.path_for(Some("default")),
            PathBuf::from("/tmp/ollmcp/config.json")
        );
        assert_eq!(
            store.path_for(Some("Work")),
            PathBuf::from("/tmp/ollmcp/work.json")
        );
    }

    #[test]
    fn test_profile_named_config_keeps_default_intact() {
        let store = ConfigStore::new("/tmp/ollmcp");
        assert_eq!(
            store.path_for(Some("Config")),
            PathBuf::from("/tmp/ollmcp/config_profile.json")
        );
        assert_ne!(store.path_for(Some("config")), store.path_for(None));
    }
}
