//! Runtime configuration
//!
//! Both the app config and the identity table are plain JSON files read once
//! at process start; neither hot-reloads. Unusable values fall back to
//! defaults rather than failing startup.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::Value;

use faultdesk_common::IdentityMap;

pub const DEFAULT_ARCHIVE_BACKUP_DIR: &str = "archive_backups";
pub const DEFAULT_MAX_UPLOAD_SIZE_MB: u64 = 500;
pub const DEFAULT_ALARM_WARNING_THRESHOLD: u64 = 100;

/// Recognized tunables.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub archive_backup_enabled: bool,
    /// Relative paths resolve against the deployment root.
    pub archive_backup_dir: String,
    pub max_upload_size_mb: u64,
    /// UI hint only; carried through but unused by the core.
    pub alarm_warning_threshold: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            archive_backup_enabled: true,
            archive_backup_dir: DEFAULT_ARCHIVE_BACKUP_DIR.to_string(),
            max_upload_size_mb: DEFAULT_MAX_UPLOAD_SIZE_MB,
            alarm_warning_threshold: DEFAULT_ALARM_WARNING_THRESHOLD,
        }
    }
}

impl AppConfig {
    /// Build a config from a parsed JSON object, substituting defaults for
    /// missing, non-positive, or non-numeric values.
    pub fn from_json(value: &Value) -> Self {
        let defaults = AppConfig::default();
        let Some(object) = value.as_object() else {
            return defaults;
        };
        AppConfig {
            archive_backup_enabled: object
                .get("archive_backup_enabled")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.archive_backup_enabled),
            archive_backup_dir: object
                .get("archive_backup_dir")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(str::to_string)
                .unwrap_or(defaults.archive_backup_dir),
            max_upload_size_mb: positive_int(
                object.get("max_upload_size_mb"),
                DEFAULT_MAX_UPLOAD_SIZE_MB,
            ),
            alarm_warning_threshold: positive_int(
                object.get("alarm_warning_threshold"),
                DEFAULT_ALARM_WARNING_THRESHOLD,
            ),
        }
    }

    /// Load from a JSON file. A missing file yields the defaults; a file
    /// that exists but does not parse as a JSON object is a startup error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        anyhow::ensure!(
            value.is_object(),
            "invalid format in {}: root must be an object",
            path.display()
        );
        Ok(AppConfig::from_json(&value))
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    pub fn backup_dir(&self, deployment_root: &Path) -> PathBuf {
        let dir = Path::new(&self.archive_backup_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            deployment_root.join(dir)
        }
    }
}

fn positive_int(value: Option<&Value>, default: u64) -> u64 {
    let Some(value) = value else {
        return default;
    };
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v >= 1 => v as u64,
        _ => default,
    }
}

/// Load the static address-to-user table. A missing file is an empty table;
/// a file that exists must at least be a JSON list.
pub fn load_identity_map(path: &Path) -> anyhow::Result<IdentityMap> {
    if !path.exists() {
        return Ok(IdentityMap::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let Value::Array(entries) = value else {
        anyhow::bail!("invalid format in {}: root must be a list", path.display());
    };
    Ok(IdentityMap::from_entries(&entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.archive_backup_enabled);
        assert_eq!(config.archive_backup_dir, "archive_backups");
        assert_eq!(config.max_upload_size_mb, 500);
        assert_eq!(config.max_upload_size_bytes(), 500 * 1024 * 1024);
        assert_eq!(config.alarm_warning_threshold, 100);
    }

    #[test]
    fn test_from_json_overrides() {
        let config = AppConfig::from_json(&json!({
            "archive_backup_enabled": false,
            "archive_backup_dir": "/var/backups",
            "max_upload_size_mb": 32,
            "alarm_warning_threshold": 5,
        }));
        assert!(!config.archive_backup_enabled);
        assert_eq!(config.archive_backup_dir, "/var/backups");
        assert_eq!(config.max_upload_size_mb, 32);
        assert_eq!(config.alarm_warning_threshold, 5);
    }

    #[test]
    fn test_from_json_bad_values_fall_back() {
        let config = AppConfig::from_json(&json!({
            "archive_backup_dir": "   ",
            "max_upload_size_mb": -3,
            "alarm_warning_threshold": "lots",
        }));
        assert_eq!(config.archive_backup_dir, "archive_backups");
        assert_eq!(config.max_upload_size_mb, 500);
        assert_eq!(config.alarm_warning_threshold, 100);
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let config = AppConfig::from_json(&json!({"max_upload_size_mb": "64"}));
        assert_eq!(config.max_upload_size_mb, 64);
    }

    #[test]
    fn test_backup_dir_resolution() {
        let config = AppConfig::default();
        assert_eq!(
            config.backup_dir(Path::new("/srv/faultdesk")),
            PathBuf::from("/srv/faultdesk/archive_backups")
        );

        let absolute = AppConfig {
            archive_backup_dir: "/var/backups".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(
            absolute.backup_dir(Path::new("/srv/faultdesk")),
            PathBuf::from("/var/backups")
        );
    }
}
