use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{ActionConfig, ConfigError, JobRequest, NamingConfig};

pub const DEFAULT_ENCODER: &str = "ffmpeg";
pub const DEFAULT_PROBER: &str = "ffprobe";

/// The last submitted form, restored as the defaults of the next run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDefaults {
    pub action:     ActionConfig,
    pub naming:     NamingConfig,
    pub extra_args: Option<String>,
}

impl FieldDefaults {
    #[inline]
    pub fn from_request(request: &JobRequest) -> Self {
        Self {
            action:     request.action.clone(),
            naming:     request.naming.clone(),
            extra_args: request.extra_args.clone(),
        }
    }

    #[inline]
    pub fn into_request(self, files: Vec<PathBuf>) -> (JobRequest, Vec<ConfigError>) {
        JobRequest::new(files, self.action, self.naming, self.extra_args)
    }

    /// JSON with four-space indentation, the format of the settings file.
    #[inline]
    pub fn to_json(&self) -> Result<Vec<u8>, SettingsError> {
        let mut buffer = vec![];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer).map_err(SettingsError::Serialize)?;
        Ok(buffer)
    }

    #[inline]
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let buffer = self.to_json()?;
        if let Some(directory) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(directory).map_err(SettingsError::Save)?;
        }
        fs::write(path, buffer).map_err(SettingsError::Save)?;
        debug!("Saved field defaults to {}", path.display());
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet.
    #[inline]
    pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
        if !path.exists() {
            return Ok(None);
        }
        let data =
            fs::read_to_string(path).map_err(|_| SettingsError::Load(path.to_path_buf()))?;
        let defaults =
            serde_json::from_str(&data).map_err(|_| SettingsError::Load(path.to_path_buf()))?;

        Ok(Some(defaults))
    }

    /// Returns whether there was anything to remove.
    #[inline]
    pub fn clear(path: &Path) -> Result<bool, SettingsError> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).map_err(SettingsError::Save)?;
        Ok(true)
    }
}

/// External programs the batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub encoder: PathBuf,
    pub prober:  PathBuf,
}

impl Default for ToolPaths {
    #[inline]
    fn default() -> Self {
        Self {
            encoder: PathBuf::from(DEFAULT_ENCODER),
            prober:  PathBuf::from(DEFAULT_PROBER),
        }
    }
}

impl ToolPaths {
    /// Looks both programs up on `PATH` (or checks them directly when given
    /// as paths) and returns their full locations.
    #[inline]
    pub fn resolve(&self) -> Result<Self, SettingsError> {
        let find = |program: &Path| {
            which::which(program).map_err(|source| SettingsError::ToolNotFound {
                program: program.to_path_buf(),
                source,
            })
        };

        Ok(Self {
            encoder: find(&self.encoder)?,
            prober:  find(&self.prober)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings file: {0}")]
    Load(PathBuf),
    #[error("Failed to serialize settings file: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to save settings file: {0}")]
    Save(#[source] std::io::Error),
    #[error("{program:?} was not found, is it installed and on PATH?")]
    ToolNotFound {
        program: PathBuf,
        #[source]
        source:  which::Error,
    },
}
