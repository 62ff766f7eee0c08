use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::authz::store::{RoleCounts, RoleSnapshot};
use crate::authz::AuthorizationStrategy;
use crate::config::AuthzConfig;
use crate::errors::PersistenceError;

/// What to install when the persisted configuration cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadFallback {
    /// Start from an empty, deny-everything configuration.
    Empty,
    /// Leave the in-memory configuration as it is.
    #[default]
    Keep,
}

impl std::str::FromStr for LoadFallback {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "empty" => Ok(LoadFallback::Empty),
            "keep" => Ok(LoadFallback::Keep),
            other => Err(format!("unknown load fallback `{other}`, expected `empty` or `keep`")),
        }
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(RoleCounts),
    /// Nothing persisted yet; the in-memory configuration is untouched.
    Missing,
    /// The stored document could not be read. The file and the in-memory
    /// configuration are both left as they are.
    Unreadable(PersistenceError),
    /// The persisted document was unusable and the fallback was applied.
    Recovered {
        error: PersistenceError,
        quarantined: Option<PathBuf>,
    },
}

/// Durable home of the encoded configuration.
#[async_trait]
pub trait ConfigStorage: Send + Sync {
    /// `None` when nothing has been stored yet.
    async fn read(&self) -> Result<Option<Vec<u8>>, PersistenceError>;

    async fn write(&self, bytes: &[u8]) -> Result<(), PersistenceError>;

    /// Moves an unusable document aside so the next save does not overwrite it.
    async fn quarantine(&self) -> Result<Option<PathBuf>, PersistenceError>;

    /// Exports one snapshot of `strategy` and writes it. Saves of the same
    /// strategy run one at a time, each taking its snapshot under the lock,
    /// so an older snapshot never lands after a newer one.
    async fn save(&self, strategy: &AuthorizationStrategy) -> Result<RoleCounts, PersistenceError> {
        let _saving = strategy.save_lock().lock().await;
        let snapshot = strategy.store().snapshot();
        let bytes = crate::persistence::codec::export(&snapshot)?;
        self.write(&bytes).await?;
        let counts = snapshot.counts();
        tracing::info!(
            global = counts.global,
            namespace = counts.namespace,
            agent = counts.agent,
            "role configuration saved"
        );
        Ok(counts)
    }

    /// Loads the stored document into `strategy` as one swap. Never fails:
    /// problems are reported in the outcome. A document that does not
    /// decode is quarantined and `fallback` decides what stays installed.
    async fn load_into(&self, strategy: &AuthorizationStrategy, fallback: LoadFallback) -> LoadOutcome {
        let bytes = match self.read().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::info!("no persisted role configuration, keeping defaults");
                return LoadOutcome::Missing;
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to read role configuration");
                return LoadOutcome::Unreadable(error);
            }
        };

        match strategy.load_configuration(&bytes) {
            Ok(counts) => {
                tracing::info!(
                    global = counts.global,
                    namespace = counts.namespace,
                    agent = counts.agent,
                    "role configuration loaded"
                );
                LoadOutcome::Loaded(counts)
            }
            Err(error) => {
                tracing::error!(error = %error, fallback = ?fallback, "failed to load role configuration");
                if fallback == LoadFallback::Empty {
                    strategy.store().replace_all(RoleSnapshot::new());
                }
                let quarantined = match self.quarantine().await {
                    Ok(path) => path,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to quarantine role configuration");
                        None
                    }
                };
                LoadOutcome::Recovered { error, quarantined }
            }
        }
    }

    /// [`load_into`](Self::load_into) with the fallback from `AUTHZ_LOAD_FALLBACK`.
    async fn load_configured(&self, strategy: &AuthorizationStrategy, config: &AuthzConfig) -> LoadOutcome {
        self.load_into(strategy, config.load_fallback).await
    }
}

/// Configuration stored as a JSON file. Writes go to a sibling temp file
/// that is renamed over the target.
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    io: Mutex<()>,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn from_config(config: &AuthzConfig) -> Self {
        Self::new(config.config_file.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigStorage for ConfigFile {
    async fn read(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        let _io = self.io.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistenceError::io(&self.path, err)),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), PersistenceError> {
        let _io = self.io.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| PersistenceError::io(parent, err))?;
        }

        let tmp = self.sibling(".tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|err| PersistenceError::io(&tmp, err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| PersistenceError::io(&self.path, err))
    }

    async fn quarantine(&self) -> Result<Option<PathBuf>, PersistenceError> {
        let _io = self.io.lock().await;
        let target = self.sibling(&format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%SZ")));
        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => {
                tracing::warn!(path = %target.display(), "quarantined unusable role configuration");
                Ok(Some(target))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistenceError::io(&self.path, err)),
        }
    }
}
