//! Configuration module
//!
//! Env-var driven configuration for binaries. Library crates receive these
//! values explicitly; nothing in this workspace reads the environment after
//! startup.

use std::env;
use std::path::PathBuf;

// Defaults
const DEFAULT_MEDIA_ROOT: &str = "media";
const DEFAULT_BACKUP_ROOT: &str = "media_backups";
const DEFAULT_THUMBNAIL_MAX_DIM: u32 = 320;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    /// Root of the canonical media tree (`stores/...` lives under here).
    pub media_root: PathBuf,
    /// Root of the timestamped backup area used by the reconciler.
    pub backup_root: PathBuf,
    /// Bounding box (pixels) for derived thumbnails.
    pub thumbnail_max_dim: u32,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let media_root = PathBuf::from(
            env::var("SHOPMEDIA_MEDIA_ROOT").unwrap_or_else(|_| DEFAULT_MEDIA_ROOT.to_string()),
        );

        let backup_root = PathBuf::from(
            env::var("SHOPMEDIA_BACKUP_ROOT").unwrap_or_else(|_| DEFAULT_BACKUP_ROOT.to_string()),
        );

        let thumbnail_max_dim = env::var("SHOPMEDIA_THUMBNAIL_MAX_DIM")
            .unwrap_or_else(|_| DEFAULT_THUMBNAIL_MAX_DIM.to_string())
            .parse::<u32>()
            .unwrap_or(DEFAULT_THUMBNAIL_MAX_DIM);

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| DEFAULT_DB_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

        Ok(Config {
            database_url,
            media_root,
            backup_root,
            thumbnail_max_dim,
            db_max_connections,
        })
    }
}
