use std::time::Duration;

use envconfig::Envconfig;
use url::Url;

use crate::dedup::FieldPath;
use crate::error::ConfigError;

/// Raw environment configuration. `job_config` turns it into the typed
/// settings the pipeline consumes, validating as it goes.
#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "INDEX_URL")]
    pub index_url: String,

    #[envconfig(from = "INDEX_USER")]
    pub index_user: Option<String>,

    #[envconfig(from = "INDEX_PASSWORD")]
    pub index_password: Option<String>,

    #[envconfig(from = "INDEX")]
    pub index: String,

    #[envconfig(from = "DOCUMENT_COMPARISON_FIELD")]
    pub document_comparison_field: String,

    // Textual boolean, see `parse_bool_flag` for the accepted forms
    #[envconfig(from = "DRY_RUN", default = "false")]
    pub dry_run: String,

    #[envconfig(from = "SCROLL_BATCH_SIZE", default = "500")]
    pub scroll_batch_size: u32,

    #[envconfig(from = "SCROLL_KEEP_ALIVE", default = "1m")]
    pub scroll_keep_alive: String,

    #[envconfig(from = "REQUEST_TIMEOUT_SECONDS", default = "30")]
    pub request_timeout_seconds: u64,
}

pub struct JobConfig {
    pub index: IndexConfig,
    pub settings: DedupSettings,
}

/// Everything the cluster client needs.
pub struct IndexConfig {
    pub base_url: Url,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub batch_size: u32,
    pub keep_alive: String,
}

#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Everything the pipeline needs for one run.
pub struct DedupSettings {
    pub index: String,
    pub comparison_field: FieldPath,
    pub dry_run: bool,
}

impl Config {
    pub fn job_config(&self) -> Result<JobConfig, ConfigError> {
        let index = self.index.trim();
        if index.is_empty() {
            return Err(ConfigError::EmptySetting { name: "INDEX" });
        }

        let base_url = Url::parse(self.index_url.trim())?;

        let credentials = match (&self.index_user, &self.index_password) {
            (Some(user), Some(password)) => Some(Credentials {
                user: user.clone(),
                password: password.clone(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialCredentials),
        };

        let comparison_field = FieldPath::parse(&self.document_comparison_field)?;
        let dry_run = parse_bool_flag(&self.dry_run)?;

        Ok(JobConfig {
            index: IndexConfig {
                base_url,
                credentials,
                timeout: Duration::from_secs(self.request_timeout_seconds),
                batch_size: self.scroll_batch_size,
                keep_alive: self.scroll_keep_alive.clone(),
            },
            settings: DedupSettings {
                index: index.to_string(),
                comparison_field,
                dry_run,
            },
        })
    }
}

/// Parse the textual boolean forms accepted for `DRY_RUN`.
///
/// True: `true`, `yes`, `y`, `1`, `t`. False: `false`, `no`, `n`, `0`, `f`.
/// Case-insensitive, surrounding whitespace ignored. Anything else is a
/// configuration error.
pub fn parse_bool_flag(raw: &str) -> Result<bool, ConfigError> {
    const TRUE_VALUES: [&str; 5] = ["true", "yes", "y", "1", "t"];
    const FALSE_VALUES: [&str; 5] = ["false", "no", "n", "0", "f"];

    let normalized = raw.trim().to_lowercase();

    if TRUE_VALUES.contains(&normalized.as_str()) {
        Ok(true)
    } else if FALSE_VALUES.contains(&normalized.as_str()) {
        Ok(false)
    } else {
        Err(ConfigError::InvalidBool {
            value: raw.to_string(),
        })
    }
}
