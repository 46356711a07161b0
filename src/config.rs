use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::RefsError;
use crate::integrity::DEFAULT_MIN_FOLDER_BYTES;
use crate::staleness::DEFAULT_STALENESS_DAYS;

pub const SETTINGS_FILE: &str = "typing-refs.json";
pub const REGISTRY_FILE: &str = "update_sets.json";
pub const DEFAULT_CATALOG_URL: &str = "https://pubmlst.org/data/dbases.xml";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub auth_script: Option<String>,
    #[serde(default)]
    pub secret_file: Option<String>,
    #[serde(default)]
    pub access_token_file: Option<String>,
    #[serde(default)]
    pub perl: Option<String>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub staleness_days: Option<i64>,
    #[serde(default)]
    pub min_folder_bytes: Option<u64>,
    #[serde(default)]
    pub registry_path: Option<String>,
}

/// Files handed to the rMLST authentication script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub auth_script: Utf8PathBuf,
    pub secret_file: Utf8PathBuf,
    pub access_token_file: Utf8PathBuf,
    pub perl: String,
}

/// Loaded once per run and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub reference_root: Utf8PathBuf,
    pub credentials: Credentials,
    pub catalog_url: String,
    pub staleness_days: i64,
    pub min_folder_bytes: u64,
    pub registry_path: Utf8PathBuf,
}

impl Settings {
    pub fn with_defaults(reference_root: Utf8PathBuf) -> Self {
        let credentials_dir = default_credentials_dir(&reference_root);
        Self {
            credentials: Credentials {
                auth_script: credentials_dir.join("rest_auth.pl"),
                secret_file: credentials_dir.join("secret.txt"),
                access_token_file: credentials_dir.join("access_token"),
                perl: "perl".to_string(),
            },
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            staleness_days: DEFAULT_STALENESS_DAYS,
            min_folder_bytes: DEFAULT_MIN_FOLDER_BYTES,
            registry_path: reference_root.join(REGISTRY_FILE),
            reference_root,
        }
    }
}

pub struct SettingsLoader;

impl SettingsLoader {
    /// An explicit path must exist. Without one, `<reference_root>/typing-refs.json`
    /// is read when present and defaults are used otherwise.
    pub fn resolve(path: Option<&str>, reference_root: &Utf8Path) -> Result<Settings, RefsError> {
        let settings_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => reference_root.join(SETTINGS_FILE),
        };

        if path.is_none() && !settings_path.as_std_path().exists() {
            tracing::debug!(path = %settings_path, "no settings file, using defaults");
            return Self::resolve_file(SettingsFile::default(), reference_root);
        }

        let content = fs::read_to_string(settings_path.as_std_path())
            .map_err(|_| RefsError::ConfigRead(settings_path.clone().into_std_path_buf()))?;
        let file: SettingsFile = serde_json::from_str(&content)
            .map_err(|err| RefsError::ConfigParse(format!("{settings_path}: {err}")))?;

        Self::resolve_file(file, reference_root)
    }

    pub fn resolve_file(file: SettingsFile, reference_root: &Utf8Path) -> Result<Settings, RefsError> {
        let defaults = Settings::with_defaults(reference_root.to_path_buf());
        let resolve_path = |value: Option<String>, default: Utf8PathBuf| {
            value
                .map(|value| absolutize(reference_root, &value))
                .unwrap_or(default)
        };

        let staleness_days = file.staleness_days.unwrap_or(defaults.staleness_days);
        if staleness_days < 0 {
            return Err(RefsError::ConfigParse(format!(
                "staleness_days must not be negative, got {staleness_days}"
            )));
        }

        Ok(Settings {
            credentials: Credentials {
                auth_script: resolve_path(file.auth_script, defaults.credentials.auth_script),
                secret_file: resolve_path(file.secret_file, defaults.credentials.secret_file),
                access_token_file: resolve_path(
                    file.access_token_file,
                    defaults.credentials.access_token_file,
                ),
                perl: file.perl.unwrap_or(defaults.credentials.perl),
            },
            catalog_url: file.catalog_url.unwrap_or(defaults.catalog_url),
            staleness_days,
            min_folder_bytes: file.min_folder_bytes.unwrap_or(defaults.min_folder_bytes),
            registry_path: resolve_path(file.registry_path, defaults.registry_path),
            reference_root: defaults.reference_root,
        })
    }
}

fn absolutize(base: &Utf8Path, value: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// `<config dir>/typing-refs`, or `<reference_root>/auth` when no home
/// directory can be resolved.
pub fn default_credentials_dir(reference_root: &Utf8Path) -> Utf8PathBuf {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().join("typing-refs")).ok())
        .unwrap_or_else(|| reference_root.join("auth"))
}
