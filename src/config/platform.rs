use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Include platform configs at compile time
#[cfg(feature = "embed_config")]
use include_dir::{include_dir, Dir};

#[cfg(feature = "embed_config")]
static CONFIG_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/config");

/// Environment variable naming an explicit platform config file.
pub const CONFIG_ENV_VAR: &str = "FLEET_UPLOADER_CONFIG";

/// Platform-side settings for one data-type code.
///
/// `app_ids` maps a source type to the application id registered on
/// the platform; every other key is an opaque tag value that overlays
/// the task info.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PlatformEntry {
    #[serde(default)]
    pub app_ids: HashMap<String, String>,
    #[serde(flatten)]
    pub values: HashMap<String, String>,
}

/// Deployment-wide platform configuration, keyed by data-type code.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PlatformConfig {
    #[serde(flatten)]
    pub entries: HashMap<String, PlatformEntry>,
}

impl PlatformConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read platform config: {}", path.display()))?;

        let config: PlatformConfig =
            serde_yaml::from_str(&content).context("Failed to parse platform config YAML")?;

        debug!("Loaded platform config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml =
            serde_yaml::to_string(self).context("Failed to serialize platform config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write platform config to {}", path.display()))?;

        info!("Saved platform config to {}", path.display());
        Ok(())
    }

    /// Resolve the config for `mode`, trying in order: the
    /// `FLEET_UPLOADER_CONFIG` environment variable, a `config/`
    /// directory next to the executable, the embedded copy when built
    /// with `embed_config`. An absent config is not fatal: the task
    /// info may already carry every tag the run needs.
    pub fn load(mode: &str) -> Result<Self> {
        if let Ok(custom) = env::var(CONFIG_ENV_VAR) {
            return Self::from_yaml_file(Path::new(&custom));
        }

        if let Some(candidate) = Self::executable_config_path(mode) {
            if candidate.exists() {
                return Self::from_yaml_file(&candidate);
            }
        }

        #[cfg(feature = "embed_config")]
        {
            if let Some(config) = Self::get_embedded_config(mode)? {
                return Ok(config);
            }
        }

        warn!(
            "No platform config found for mode '{}', continuing with task info tags only",
            mode
        );
        Ok(Self::default())
    }

    fn executable_config_path(mode: &str) -> Option<PathBuf> {
        let exe = env::current_exe().ok()?;
        let dir = exe.parent()?;
        Some(dir.join("config").join(format!("platform_{}.yaml", mode)))
    }

    /// Get the embedded configuration for `mode`, if one was built in.
    #[cfg(feature = "embed_config")]
    pub fn get_embedded_config(mode: &str) -> Result<Option<Self>> {
        let name = format!("platform_{}.yaml", mode);

        if let Some(file) = CONFIG_DIR.get_file(&name) {
            let content = file
                .contents_utf8()
                .ok_or_else(|| anyhow::anyhow!("Failed to read embedded config as UTF-8"))?;

            let config: PlatformConfig =
                serde_yaml::from_str(content).context("Failed to parse embedded platform config")?;

            info!("Using embedded platform config for mode '{}'", mode);
            return Ok(Some(config));
        }

        Ok(None)
    }

    /// Tag overlay for one data-type code. The resolved `app_id` for
    /// `source_type` is folded in when the entry declares one.
    pub fn overlay(&self, data_type: &str, source_type: &str) -> HashMap<String, String> {
        let entry = match self.entries.get(data_type) {
            Some(entry) => entry,
            None => {
                debug!("Platform config has no entry for data type '{}'", data_type);
                return HashMap::new();
            }
        };

        let mut overlay = entry.values.clone();
        if let Some(app_id) = entry.app_ids.get(source_type) {
            overlay.insert("app_id".to_string(), app_id.clone());
        }
        overlay
    }

    /// A starter config with one filled-in section per strategy.
    pub fn template() -> Self {
        let mut entries = HashMap::new();

        let mut trip = PlatformEntry::default();
        trip.values
            .insert("cloud_type".to_string(), "minio".to_string());
        trip.values
            .insert("endpoint".to_string(), "10.0.0.1:9000,10.0.0.2:9000".to_string());
        trip.values
            .insert("bucket_name".to_string(), "fleet-raw".to_string());
        trip.values.insert(
            "cs_task_manager_url".to_string(),
            "http://platform.internal/api/task".to_string(),
        );
        trip.values.insert(
            "upload_log_topic".to_string(),
            "http://platform.internal/api/log".to_string(),
        );
        trip.app_ids
            .insert("agb".to_string(), "ap-trip-001".to_string());
        entries.insert("trip".to_string(), trip);

        let mut batch = PlatformEntry::default();
        batch
            .values
            .insert("cloud_type".to_string(), "oss".to_string());
        batch.values.insert(
            "endpoint".to_string(),
            "https://oss-cn-shanghai.aliyuncs.com".to_string(),
        );
        batch
            .values
            .insert("bucket_name".to_string(), "fleet-archive".to_string());
        batch.values.insert(
            "cs_gac_data_record_url".to_string(),
            "http://platform.internal/api/record".to_string(),
        );
        batch
            .app_ids
            .insert("ags".to_string(), "ap-batch-001".to_string());
        entries.insert("batch".to_string(), batch);

        PlatformConfig { entries }
    }

    /// Write the starter config, refusing to clobber an existing file.
    pub fn write_template(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(anyhow::anyhow!(
                "Refusing to overwrite existing config at {}",
                path.display()
            ));
        }
        Self::template().save_to_yaml_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
trip:
  cloud_type: minio
  endpoint: "10.1.1.1:9000"
  bucket_name: fleet-raw
  app_ids:
    trip: ap-77
    clip: ap-78
batch:
  cloud_type: oss
  bucket_name: fleet-archive
"#;

    #[test]
    fn test_parse_and_overlay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("platform_test.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let config = PlatformConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.entries.len(), 2);

        let overlay = config.overlay("trip", "trip");
        assert_eq!(overlay.get("cloud_type").map(String::as_str), Some("minio"));
        assert_eq!(overlay.get("bucket_name").map(String::as_str), Some("fleet-raw"));
        assert_eq!(overlay.get("app_id").map(String::as_str), Some("ap-77"));
        // app_ids itself never leaks into the overlay
        assert!(!overlay.contains_key("app_ids"));

        let overlay = config.overlay("trip", "clip");
        assert_eq!(overlay.get("app_id").map(String::as_str), Some("ap-78"));

        // No app id registered for this source type
        let overlay = config.overlay("batch", "trip");
        assert!(!overlay.contains_key("app_id"));
        assert_eq!(overlay.get("cloud_type").map(String::as_str), Some("oss"));
    }

    #[test]
    fn test_overlay_unknown_data_type_is_empty() {
        let config: PlatformConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.overlay("unknown", "trip").is_empty());
    }

    #[test]
    fn test_template_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("platform_prod.yaml");

        PlatformConfig::write_template(&path).unwrap();
        let config = PlatformConfig::from_yaml_file(&path).unwrap();
        assert!(config.entries.contains_key("trip"));
        assert!(config.entries.contains_key("batch"));

        // Second write must not clobber
        assert!(PlatformConfig::write_template(&path).is_err());
    }
}
