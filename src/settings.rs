use serde::Deserialize;
use std::path::Path;

/// Remote inference endpoint, `{}` is replaced by the model id.
pub const DEFAULT_RELAY_URL: &str = "https://model-{}.api.baseten.co/development/predict";

pub const DEFAULT_MAX_UPLOAD_MB: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Optional settings file, every key may also come from the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    storage_bucket: Option<String>,
    storage_project_id: Option<String>,
    storage_credentials_json: Option<String>,
    relay_api_key: Option<String>,
    relay_model_id: Option<String>,
    relay_url: Option<String>,
    max_upload_mb: Option<usize>,
}

/// Settings of the upload gateway.
#[derive(Clone)]
pub struct Settings {
    pub storage_bucket: String,
    pub storage_project_id: Option<String>,
    /// Service account key as JSON.
    pub storage_credentials_json: Option<String>,
    pub relay_api_key: String,
    pub relay_model_id: String,
    pub relay_url: String,
    pub max_upload_bytes: usize,
}

impl Settings {
    /// Loads settings from the process environment, on top of the TOML file
    /// at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let contents = path.map(std::fs::read_to_string).transpose()?;
        Self::from_sources(contents.as_deref(), |name| std::env::var(name).ok())
    }

    /// Builds settings from TOML `contents` overridden by `lookup`.
    ///
    /// Variables are looked up by their upper case name first, then lower case.
    /// Empty values count as unset.
    pub fn from_sources<F>(contents: Option<&str>, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: SettingsFile = match contents {
            Some(contents) => toml::from_str(contents)?,
            None => SettingsFile::default(),
        };

        let var = |name: &str, fallback: Option<String>| {
            lookup(&name.to_ascii_uppercase())
                .or_else(|| lookup(&name.to_ascii_lowercase()))
                .or(fallback)
                .filter(|value| !value.trim().is_empty())
        };

        let storage_bucket =
            var("storage_bucket", file.storage_bucket).ok_or(SettingsError::Missing("STORAGE_BUCKET"))?;
        let relay_api_key =
            var("relay_api_key", file.relay_api_key).ok_or(SettingsError::Missing("RELAY_API_KEY"))?;
        let relay_model_id = var("relay_model_id", file.relay_model_id)
            .ok_or(SettingsError::Missing("RELAY_MODEL_ID"))?;

        let storage_credentials_json =
            var("storage_credentials_json", file.storage_credentials_json);
        if let Some(credentials) = &storage_credentials_json {
            let parsed: serde_json::Value =
                serde_json::from_str(credentials).map_err(|e| SettingsError::Invalid {
                    name: "STORAGE_CREDENTIALS_JSON",
                    reason: e.to_string(),
                })?;
            if !parsed.is_object() {
                return Err(SettingsError::Invalid {
                    name: "STORAGE_CREDENTIALS_JSON",
                    reason: "expected a JSON object".to_string(),
                });
            }
        }

        let max_upload_mb: usize = match var("max_upload_mb", None) {
            Some(value) => value.trim().parse().map_err(|_| SettingsError::Invalid {
                name: "MAX_UPLOAD_MB",
                reason: format!("{value:?} is not a number"),
            })?,
            None => file.max_upload_mb.unwrap_or(DEFAULT_MAX_UPLOAD_MB),
        };
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            SettingsError::Invalid {
                name: "MAX_UPLOAD_MB",
                reason: format!("{max_upload_mb} MB does not fit in memory"),
            }
        })?;

        let relay_url = var("relay_url", file.relay_url)
            .unwrap_or_else(|| DEFAULT_RELAY_URL.replace("{}", &relay_model_id));

        Ok(Self {
            storage_bucket,
            storage_project_id: var("storage_project_id", file.storage_project_id),
            storage_credentials_json,
            relay_api_key,
            relay_model_id,
            relay_url,
            max_upload_bytes,
        })
    }

    /// Project of the storage bucket: the explicit setting, else the one named
    /// in the service account credentials.
    pub fn project_id(&self) -> Option<String> {
        self.storage_project_id.clone().or_else(|| {
            let credentials = self.storage_credentials_json.as_deref()?;
            let parsed: serde_json::Value = serde_json::from_str(credentials).ok()?;
            parsed.get("project_id")?.as_str().map(str::to_string)
        })
    }
}

// keeps secrets out of the logs
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("storage_bucket", &self.storage_bucket)
            .field("storage_project_id", &self.storage_project_id)
            .field(
                "storage_credentials_json",
                &self.storage_credentials_json.as_ref().map(|_| "<redacted>"),
            )
            .field("relay_api_key", &"<redacted>")
            .field("relay_model_id", &self.relay_model_id)
            .field("relay_url", &self.relay_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}
