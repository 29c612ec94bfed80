//! Layered configuration loading with figment.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults, or a base supplied with [`ConfigLoader::defaults`]
//! 2. The profile file, e.g. `skiff.production.toml`
//! 3. The main file, e.g. `skiff.toml`
//! 4. `SKIFF_*` environment variables, `__` separating nested keys
//!    (`SKIFF_POLLING__RETRY__MAX_DELAY_MS=10000`)
//! 5. Single keys set with [`ConfigLoader::set`]
//!
//! Files are looked up as `skiff.*` then `config.*` in each search directory;
//! the first directory holding either a main or a profile file wins. TOML
//! needs the `toml-config` feature (default), YAML the `yaml-config` feature.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .set("bot.token", token)
//!     .load_validated()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::SkiffConfig;
use super::validation::validate_config;

/// Variable naming the active profile. Never read as a config key.
pub const PROFILE_ENV: &str = "SKIFF_PROFILE";

const ENV_PREFIX: &str = "SKIFF_";
const FILE_STEMS: [&str; 2] = ["skiff", "config"];

/// Deployment profile selecting an extra config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting `dev` and `prod` as short forms.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" | "" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads [`PROFILE_ENV`], defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Toml,
    Yaml,
}

impl FileFormat {
    fn enabled() -> Vec<Self> {
        [Self::Toml, Self::Yaml]
            .into_iter()
            .filter(|format| format.is_enabled())
            .collect()
    }

    fn is_enabled(self) -> bool {
        match self {
            Self::Toml => cfg!(feature = "toml-config"),
            Self::Yaml => cfg!(feature = "yaml-config"),
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Toml => &["toml"],
            Self::Yaml => &["yaml", "yml"],
        }
    }

    fn of(path: &Path) -> ConfigResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let format = match ext {
            "toml" => Self::Toml,
            "yaml" | "yml" => Self::Yaml,
            _ => {
                return Err(ConfigError::ParseError(format!(
                    "Unsupported configuration file format: .{ext}"
                )));
            }
        };
        if !format.is_enabled() {
            return Err(ConfigError::ParseError(format!(
                "Support for .{ext} configuration files is not enabled"
            )));
        }
        Ok(format)
    }

    #[cfg_attr(
        not(any(feature = "toml-config", feature = "yaml-config")),
        allow(unused_variables)
    )]
    fn merge(self, figment: Figment, path: &Path) -> Figment {
        match self {
            #[cfg(feature = "toml-config")]
            Self::Toml => figment.merge(Toml::file(path)),
            #[cfg(feature = "yaml-config")]
            Self::Yaml => figment.merge(Yaml::file(path)),
            #[allow(unreachable_patterns)]
            _ => figment,
        }
    }
}

/// A config file picked for loading.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigFile {
    path: PathBuf,
    format: FileFormat,
}

/// Builds a [`SkiffConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    base: SkiffConfig,
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Searches the working directory and the user config directory, with
    /// the profile from [`PROFILE_ENV`].
    pub fn new() -> Self {
        Self {
            base: SkiffConfig::default(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            file: None,
            load_env: true,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Searches `path` instead of the default locations. May be repeated.
    pub fn search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds `<user config dir>/skiff` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("skiff")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching. Its profile variant is
    /// still merged when present.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Replaces the built-in defaults; every other source still overrides it.
    pub fn defaults(mut self, config: SkiffConfig) -> Self {
        self.base = config;
        self
    }

    /// Overrides a single dotted key, e.g. `("bot.token", token)`, above all
    /// other sources.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads the configuration without validating it.
    pub fn load(self) -> ConfigResult<SkiffConfig> {
        let files = self.config_files()?;
        if files.is_empty() {
            warn!(profile = %self.profile, "No configuration file found, using defaults");
        }

        let mut figment = Figment::from(Serialized::defaults(&self.base));
        for file in &files {
            info!(path = %file.path.display(), "Loading configuration file");
            figment = file.format.merge(figment, &file.path);
        }
        if self.load_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }
        figment = figment.merge(self.overrides);

        let config: SkiffConfig = figment.extract()?;
        debug!(
            profile = %self.profile,
            api_url = %config.bot.api_url,
            files = files.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads the configuration and runs [`validate_config`] on it.
    pub fn load_validated(self) -> ConfigResult<SkiffConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Files to merge, profile variant first.
    fn config_files(&self) -> ConfigResult<Vec<ConfigFile>> {
        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            let format = FileFormat::of(path)?;
            let mut files: Vec<_> = self.profile_variant(path).into_iter().collect();
            files.push(ConfigFile {
                path: path.clone(),
                format,
            });
            return Ok(files);
        }

        for dir in self.search_dirs() {
            for format in FileFormat::enabled() {
                for stem in FILE_STEMS {
                    for ext in format.extensions() {
                        let main = dir.join(format!("{stem}.{ext}"));
                        let mut files: Vec<_> =
                            self.profile_variant(&main).into_iter().collect();
                        if main.exists() {
                            files.push(ConfigFile { path: main, format });
                        }
                        if !files.is_empty() {
                            return Ok(files);
                        }
                    }
                }
            }
        }
        Ok(Vec::new())
    }

    /// `dir/skiff.toml` → `dir/skiff.{profile}.toml`, if that exists.
    fn profile_variant(&self, main: &Path) -> Option<ConfigFile> {
        let stem = main.file_stem()?.to_str()?;
        let ext = main.extension()?.to_str()?;
        let path = main.with_file_name(format!("{stem}.{}.{ext}", self.profile));
        if !path.exists() {
            return None;
        }
        let format = FileFormat::of(&path).ok()?;
        Some(ConfigFile { path, format })
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("skiff")))
            .collect()
    }
}

/// Loads configuration from the default locations and validates it.
pub fn load_config() -> ConfigResult<SkiffConfig> {
    ConfigLoader::new().load_validated()
}
