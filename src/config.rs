use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Space that must stay free after a download (OS headroom)
pub const DEFAULT_SPACE_BUFFER_BYTES: u64 = 500 * MIB;
/// Below this much free space the device is flagged as low on storage
pub const DEFAULT_MIN_RESERVE_BYTES: u64 = 2 * GIB;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory holding downloaded media, platform default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_directory: Option<PathBuf>,

    /// SQLite file for the job and media stores, platform default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    #[serde(default = "default_min_reserve")]
    pub min_reserve_bytes: u64,

    #[serde(default = "default_space_buffer")]
    pub space_buffer_bytes: u64,

    /// Attempts allowed before a transfer failure becomes terminal
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,

    /// Minimum progress advance between two persisted checkpoints
    #[serde(default = "default_progress_step")]
    pub progress_step_percent: u8,

    /// From this progress on every chunk is checkpointed
    #[serde(default = "default_progress_finish")]
    pub progress_finish_percent: u8,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle time allowed between two body reads
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: u32,

    /// Delay before a retryable failure is enqueued again
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_directory: None,
            database_path: None,
            min_reserve_bytes: default_min_reserve(),
            space_buffer_bytes: default_space_buffer(),
            max_retries: default_max_retries(),
            chunk_size_bytes: default_chunk_size(),
            progress_step_percent: default_progress_step(),
            progress_finish_percent: default_progress_finish(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_concurrent_downloads: default_max_concurrent(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl DownloadConfig {
    /// Load from the platform config file, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("reel").join("downloads.toml"))
    }

    /// Get the download directory, using the platform default if not set
    pub fn download_directory(&self) -> Result<PathBuf> {
        match self.download_directory {
            Some(ref dir) => Ok(dir.clone()),
            None => Self::default_download_directory(),
        }
    }

    /// `~/.local/share/reel/downloads` on Linux, the platform data dir elsewhere
    pub fn default_download_directory() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Failed to get data directory")?;
        Ok(data_dir.join("reel").join("downloads"))
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database_path {
            Some(ref path) => Ok(path.clone()),
            None => {
                let data_dir = dirs::data_dir().context("Failed to get data directory")?;
                Ok(data_dir.join("reel").join("downloads.db"))
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("chunk_size_bytes must be greater than 0"));
        }

        if self.progress_step_percent == 0 || self.progress_step_percent > 100 {
            return Err(anyhow::anyhow!(
                "progress_step_percent must be between 1 and 100"
            ));
        }

        if self.progress_finish_percent > 100 {
            return Err(anyhow::anyhow!(
                "progress_finish_percent must be between 0 and 100"
            ));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(anyhow::anyhow!(
                "max_concurrent_downloads must be greater than 0"
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn progress_step(&self) -> f64 {
        self.progress_step_percent as f64 / 100.0
    }

    pub fn progress_finish(&self) -> f64 {
        self.progress_finish_percent as f64 / 100.0
    }
}

fn default_min_reserve() -> u64 {
    DEFAULT_MIN_RESERVE_BYTES
}
fn default_space_buffer() -> u64 {
    DEFAULT_SPACE_BUFFER_BYTES
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE_BYTES
}
fn default_progress_step() -> u8 {
    5
}
fn default_progress_finish() -> u8 {
    99
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_read_timeout() -> u64 {
    60
}
fn default_max_concurrent() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    30
}
