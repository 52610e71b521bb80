use std::env::current_exe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to blueiot-viewer.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to blueiot-viewer.json in an os dependent standard directory, such as %AppData% on
// windows.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("de", "hdmstuttgart", "blueiot-viewer").map(|dirs| {
        dirs.config_dir().join("blueiot-viewer.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if std::fs::metadata(&path).map(|attr| attr.is_file()).unwrap_or(false) {
            return Ok(path);
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    /// Holds an exclusive lock on the config file for as long as the guard lives, so that only
    /// one instance talks to the peripheral.
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        let path = get_config_path()?;
        Self::open_sync(path)
    }

    pub fn open_sync(path: PathBuf) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let file = self.try_clone_file()?;

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(file),
        })
    }

    fn try_clone_file(&self) -> Result<std::fs::File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        Ok(inner.file.try_clone()?)
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        Ok(File::from_std(self.try_clone_file()?))
    }

    /// Reads the config; an empty file (first start) yields the defaults.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        info!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("blueiot-viewer-test-{}-{}", std::process::id(), name))
            .join("blueiot-viewer.json")
    }

    #[tokio::test]
    async fn empty_file_reads_as_defaults() {
        let path = temp_config_path("empty");
        let config_io = ConfigIO::open_sync(path.clone()).unwrap();

        assert_eq!(config_io.read().await.unwrap(), Config::default());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn saved_config_reads_back() {
        let path = temp_config_path("save");
        let config_io = ConfigIO::open_sync(path.clone()).unwrap();

        let mut config = Config::default();
        config.setup_timeout_ms = 1234;
        config.peripheral.name_contains = None;
        config_io.save(&config).await.unwrap();

        assert_eq!(config_io.read().await.unwrap(), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
