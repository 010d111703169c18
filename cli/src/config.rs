use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use reqwest::Url;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

const CONFIG_FILE_NAME: &str = "config.toml";
const LOG_FILE_NAME: &str = "studio.log";
const ENV_CONFIG_PATH: &str = "STUDIO_CONFIG_PATH";
const ENV_PROFILE: &str = "STUDIO_PROFILE";
const ENV_SERVICE_URL: &str = "STUDIO_SERVICE_URL";
const ENV_SAMPLE_DIR: &str = "STUDIO_SAMPLE_DIR";
const ENV_DOWNLOAD_DIR: &str = "STUDIO_DOWNLOAD_DIR";

pub const LOCAL_SERVICE_URL: &str = "http://localhost:8000";
pub const REMOTE_SERVICE_URL: &str = "https://e24d-97-93-224-68.ngrok-free.app";

/// Which fixed generation service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProfile {
    #[default]
    Local,
    Remote,
}

impl ServiceProfile {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Local => LOCAL_SERVICE_URL,
            Self::Remote => REMOTE_SERVICE_URL,
        }
    }
}

impl FromStr for ServiceProfile {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(anyhow!("unknown service profile '{other}' (expected local or remote)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    profile: ServiceProfile,
    service_url: Option<String>,
    sample_dir: PathBuf,
    download_dir: PathBuf,
}

impl AppConfig {
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        let path = match path_override.map(normalize_config_path) {
            Some(path) => Some(path),
            None => match config_file_override() {
                Some(path) => Some(path),
                None => Self::default_config_path().ok(),
            },
        };
        if let Some(path) = path.filter(|path| path.exists()) {
            let partial = read_partial(&path)?;
            config.apply_partial(partial)?;
        }

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile(&self) -> ServiceProfile {
        self.profile
    }

    /// The base every request and display URL is built from.
    pub fn service_base(&self) -> &str {
        self.service_url.as_deref().unwrap_or(self.profile.base_url())
    }

    pub fn sample_dir(&self) -> &PathBuf {
        &self.sample_dir
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    /// Selects a fixed service and drops any explicit `service_url`.
    pub fn set_profile(&mut self, profile: ServiceProfile) {
        self.profile = profile;
        self.service_url = None;
    }

    pub fn set_service_url(&mut self, url: String) -> Result<()> {
        self.service_url = Some(url);
        self.validate()
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn log_path() -> Result<PathBuf> {
        let dir = project_dirs()?.data_dir().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        Ok(dir.join(LOG_FILE_NAME))
    }

    fn apply_partial(&mut self, partial: PartialConfig) -> Result<()> {
        if let Some(profile) = partial.profile {
            self.profile = profile;
        }
        if let Some(url) = partial.service_url {
            self.service_url = Some(url);
        }
        if let Some(dir) = partial.sample_dir {
            self.sample_dir = dir;
        }
        if let Some(dir) = partial.download_dir {
            self.download_dir = dir;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(ENV_PROFILE) {
            if !value.trim().is_empty() {
                self.profile = value.parse().context("STUDIO_PROFILE is invalid")?;
            }
        }
        if let Some(value) = lookup(ENV_SERVICE_URL) {
            if value.trim().is_empty() {
                self.service_url = None;
            } else {
                self.service_url = Some(value);
            }
        }
        if let Some(value) = lookup(ENV_SAMPLE_DIR) {
            if !value.trim().is_empty() {
                self.sample_dir = PathBuf::from(value);
            }
        }
        if let Some(value) = lookup(ENV_DOWNLOAD_DIR) {
            if !value.trim().is_empty() {
                self.download_dir = PathBuf::from(value);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.service_url {
            let parsed = Url::parse(url).with_context(|| format!("invalid service URL '{url}'"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("invalid service URL '{url}': scheme must be http or https");
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: ServiceProfile::Local,
            service_url: None,
            sample_dir: PathBuf::from("./samples"),
            download_dir: default_download_dir(),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "GenerativeStudio", "Studio")
        .ok_or_else(|| anyhow!("unable to determine config directory"))
}

fn config_file_override() -> Option<PathBuf> {
    let value = env::var_os(ENV_CONFIG_PATH)?;
    if value.is_empty() {
        return None;
    }
    Some(normalize_config_path(PathBuf::from(value)))
}

fn normalize_config_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILE_NAME)
    } else {
        path
    }
}

fn read_partial(path: &Path) -> Result<PartialConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let partial: PartialConfig =
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(partial)
}

fn default_download_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PartialConfig {
    profile: Option<ServiceProfile>,
    service_url: Option<String>,
    sample_dir: Option<PathBuf>,
    download_dir: Option<PathBuf>,
}
