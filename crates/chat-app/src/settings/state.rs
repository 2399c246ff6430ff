use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use gatito_llm::{DEFAULT_ENDPOINT, ModelOptions, ProviderConfig, RIG_OPENAI_PROVIDER_ID};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::DEFAULT_HISTORY_KEY;

pub const SETTINGS_DIRECTORY_NAME: &str = "gatito";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DATABASE_FILE_NAME: &str = "gatito.db";
pub const ENV_PREFIX: &str = "GATITO_";

/// Checked in order when no API key is configured.
const API_KEY_FALLBACK_VARS: [&str; 2] = ["OPENROUTER_API_KEY", "OPENAI_API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub model: ModelOptions,
    /// Sqlite file or URL. Blank means `gatito.db` next to the settings file.
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_history_key")]
    pub history_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: ModelOptions::default(),
            database: String::new(),
            history_key: default_history_key(),
        }
    }
}

impl Settings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
        ))
    }

    /// Resolves the database location against `config_dir` when left blank.
    pub fn database_location(&self, config_dir: &Path) -> String {
        if self.database.is_empty() {
            config_dir.join(DATABASE_FILE_NAME).display().to_string()
        } else {
            self.database.clone()
        }
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = non_blank_or(self.provider_id, default_provider_id);
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = non_blank_or(self.endpoint, default_endpoint);
        self.model = self.model.normalized();
        self.database = self.database.trim().to_string();
        self.history_key = non_blank_or(self.history_key, default_history_key);
        self
    }

    fn with_api_key_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.api_key.is_empty()
            && let Some(api_key) = API_KEY_FALLBACK_VARS
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        {
            self.api_key = api_key;
        }
        self
    }
}

/// Layered settings: defaults, then the JSON file, then `GATITO_*` variables.
pub struct SettingsStore {
    settings: Arc<Settings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".gatito"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    /// Loads settings from `config_path`, writing a default file first if none exists.
    pub fn load(config_path: PathBuf) -> SettingsResult<Self> {
        if !config_path.exists() {
            tracing::info!(path = ?config_path, "settings file not found, writing defaults");
            persist(&config_path, &Settings::default())?;
        }

        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let settings =
            extract(figment)?.with_api_key_fallback(|name| std::env::var(name).ok());

        Ok(Self {
            settings: Arc::new(settings),
            config_path,
        })
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn extract(figment: Figment) -> SettingsResult<Settings> {
    let settings = figment.extract::<Settings>().map_err(Box::new).context(ExtractSnafu {
        stage: "extract-layered-settings",
    })?;
    Ok(settings.normalized())
}

fn persist(config_path: &Path, settings: &Settings) -> SettingsResult<()> {
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateDirSnafu {
            stage: "create-settings-directory",
            path: parent.to_path_buf(),
        })?;
    }

    let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
        stage: "serialize-settings-json",
    })?;

    let temp_path = config_path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).context(WriteFileSnafu {
        stage: "write-temporary-settings-file",
        path: temp_path.clone(),
    })?;

    std::fs::rename(&temp_path, config_path).context(RenameTempFileSnafu {
        stage: "rename-temporary-settings-file",
        from: temp_path,
        to: config_path.to_path_buf(),
    })?;

    tracing::info!(path = ?config_path, "saved settings");
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("invalid settings on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        source: Box<figment::Error>,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

fn non_blank_or(value: String, default: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default()
    } else {
        trimmed.to_string()
    }
}

fn default_provider_id() -> String {
    RIG_OPENAI_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_history_key() -> String {
    DEFAULT_HISTORY_KEY.to_string()
}
