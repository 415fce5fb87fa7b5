use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG: &str = "examcrawler";
const ENV_PREFIX: &str = "EXAM_CRAWLER";

/// Settings read once at startup from `examcrawler.json` and `EXAM_CRAWLER_*`
/// environment variables (the latter win).
///
/// PascalCase keys (`StartExamUrl`) written for the older crawler are
/// accepted too; the lowercase aliases cover sources that fold key case.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(alias = "BaseUrl", alias = "baseurl")]
    pub base_url: String,
    #[serde(alias = "LoginUrl", alias = "loginurl")]
    pub login_url: String,
    #[serde(alias = "StartExamUrl", alias = "startexamurl")]
    pub start_exam_url: String,
    #[serde(alias = "SettingExamUrl", alias = "settingexamurl")]
    pub setting_exam_url: String,
    #[serde(alias = "Email")]
    pub email: String,
    #[serde(alias = "Password")]
    pub password: String,
    #[serde(alias = "DelayBetweenRequestsMs", alias = "delaybetweenrequestsms")]
    pub delay_between_requests_ms: u64,
    #[serde(alias = "OutputFolder", alias = "outputfolder")]
    pub output_folder: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            base_url: crate::normalize::DEFAULT_BASE_URL.to_string(),
            login_url: String::new(),
            start_exam_url: String::new(),
            setting_exam_url: String::new(),
            email: String::new(),
            password: String::new(),
            delay_between_requests_ms: 1000,
            output_folder: PathBuf::from("output"),
        }
    }
}

impl AppConfig {
    /// Load from `path` (must exist) or from `examcrawler.{json,toml,...}` in
    /// the working directory when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_between_requests_ms)
    }

    pub fn has_credentials(&self) -> bool {
        !self.email.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("base_url", &self.base_url)
            .field("login_url", &self.login_url)
            .field("start_exam_url", &self.start_exam_url)
            .field("setting_exam_url", &self.setting_exam_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("delay_between_requests_ms", &self.delay_between_requests_ms)
            .field("output_folder", &self.output_folder)
            .finish()
    }
}
