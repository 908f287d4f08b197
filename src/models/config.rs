//! Configuration model loaded from external sources.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
/// Server configuration shared across handlers and background jobs.
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub database_url: String,
    /// Root directory that folder processing is confined to.
    pub upload_dir: PathBuf,
    pub backup_dir: PathBuf,
    /// Lower-case file extensions, with or without the leading dot.
    pub image_exts: Vec<String>,
    pub batch_size: usize,
    pub embedding_dim: usize,
    pub embedding_model: String,
    pub model_cache_dir: PathBuf,
    /// Index augmented variants alongside the original image.
    pub augment: bool,
    pub embed_attempts: usize,
    pub embed_retry_delay_ms: u64,
    pub pool_min_idle: u32,
    pub pool_max_size: u32,
}

impl ServerConfig {
    /// Returns `true` when `path` carries one of the configured image extensions.
    pub fn is_image(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.image_exts
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    pub fn embed_retry_delay(&self) -> Duration {
        Duration::from_millis(self.embed_retry_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8000,
            database_url: "postgres://pushkind:pushkind@db:5432/images".to_string(),
            upload_dir: PathBuf::from("/app/uploads"),
            backup_dir: PathBuf::from("/app/backups"),
            image_exts: [".jpg", ".jpeg", ".png", ".webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            batch_size: 32,
            embedding_dim: 512,
            embedding_model: "clip-vit-b-32".to_string(),
            model_cache_dir: PathBuf::from(".fastembed_cache"),
            augment: true,
            embed_attempts: 3,
            embed_retry_delay_ms: 1000,
            pool_min_idle: 5,
            pool_max_size: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_image_matches_configured_extensions_case_insensitively() {
        let config = ServerConfig::default();
        assert!(config.is_image(Path::new("a/b/photo.JPG")));
        assert!(config.is_image(Path::new("photo.webp")));
        assert!(!config.is_image(Path::new("notes.txt")));
        assert!(!config.is_image(Path::new("no_extension")));
    }

    #[test]
    fn extensions_without_leading_dot_are_accepted() {
        let config = ServerConfig {
            image_exts: vec!["png".to_string()],
            ..ServerConfig::default()
        };
        assert!(config.is_image(Path::new("x.png")));
        assert!(!config.is_image(Path::new("x.jpg")));
    }
}
