use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Maximum number of capture devices wired into the compositor.
pub const MAX_SOURCES: usize = 4;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub video: VideoConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VideoConfig {
    pub devices: Vec<String>,
    pub source_width: i32,
    pub source_height: i32,
    pub output_width: i32,
    pub output_height: i32,
    pub framerate: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub idle_timeout_seconds: f64,
    pub font_desc: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Multicam Viewer".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 5,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            devices: vec![
                "/dev/video0".to_string(),
                "/dev/video1".to_string(),
                "/dev/video2".to_string(),
                "/dev/video3".to_string(),
            ],
            source_width: 1920,
            source_height: 1080,
            output_width: 3840,
            output_height: 2160,
            framerate: 30,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 3.0,
            font_desc: "Sans 24".to_string(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.video.devices.is_empty() {
            return Err("at least one capture device must be configured".to_string());
        }

        if self.video.source_width <= 0 || self.video.source_height <= 0 {
            return Err("source dimensions must be greater than 0".to_string());
        }

        if self.video.framerate <= 0 {
            return Err("framerate must be greater than 0".to_string());
        }

        // The composited canvas is a fixed 2x2 grid of source-sized cells.
        if self.video.output_width != self.video.source_width * 2
            || self.video.output_height != self.video.source_height * 2
        {
            return Err(format!(
                "output dimensions must be 2x the source dimensions ({}x{} expected, {}x{} configured)",
                self.video.source_width * 2,
                self.video.source_height * 2,
                self.video.output_width,
                self.video.output_height
            ));
        }

        if self.overlay.idle_timeout_seconds <= 0.0 {
            return Err("overlay idle_timeout_seconds must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Devices actually wired into the graph: the first MAX_SOURCES entries.
    pub fn effective_devices(&self) -> &[String] {
        if self.video.devices.len() > MAX_SOURCES {
            warn!(
                "{} capture devices configured, only the first {} are used",
                self.video.devices.len(),
                MAX_SOURCES
            );
        }
        let count = self.video.devices.len().min(MAX_SOURCES);
        &self.video.devices[..count]
    }

    pub async fn from_file(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(crate::ViewerError::Config(format!(
                "Configuration file not found: {:?}\n\
                Please create a config.toml file or specify the path with --config",
                path
            )));
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::ViewerError::Config(format!(
                "Failed to read configuration file {:?}: {}",
                path, e
            ))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            crate::ViewerError::Config(format!(
                "Failed to parse configuration file {:?}: {}",
                path, e
            ))
        })?;

        config.validate().map_err(crate::ViewerError::Config)?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub async fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::from_file(path).await
        } else {
            warn!("Configuration file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.video.devices.len(), 4);
        assert_eq!(config.video.output_width, config.video.source_width * 2);
    }

    #[test]
    fn test_validation_rejects_empty_devices() {
        let mut config = Config::default();
        config.video.devices.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_mismatched_output() {
        let mut config = Config::default();
        config.video.output_width = config.video.source_width;
        let err = config.validate().unwrap_err();
        assert!(err.contains("output dimensions"));
    }

    #[test]
    fn test_validation_rejects_zero_idle_timeout() {
        let mut config = Config::default();
        config.overlay.idle_timeout_seconds = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_devices_caps_at_four() {
        let mut config = Config::default();
        config.video.devices = (0..6).map(|i| format!("/dev/video{}", i)).collect();
        assert_eq!(config.effective_devices().len(), MAX_SOURCES);
        assert_eq!(config.effective_devices()[0], "/dev/video0");
    }

    #[tokio::test]
    async fn test_from_file_parses_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [app]
            log_level = "debug"

            [video]
            devices = ["/dev/video0", "/dev/video2"]
            source_width = 1280
            source_height = 720
            output_width = 2560
            output_height = 1440

            [overlay]
            idle_timeout_seconds = 1.5
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).await.unwrap();
        assert_eq!(config.app.log_level, "debug");
        assert_eq!(config.video.devices.len(), 2);
        assert_eq!(config.video.source_width, 1280);
        assert_eq!(config.overlay.idle_timeout_seconds, 1.5);
    }

    #[tokio::test]
    async fn test_from_file_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [video]
            devices = []
            "#
        )
        .unwrap();

        let result = Config::from_file(file.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let path = std::path::Path::new("/nonexistent/multicam-viewer/config.toml");
        let config = Config::load_or_default(path).await.unwrap();
        assert_eq!(config.video.source_width, 1920);
    }
}
