//! Layered loading of [`IrcbusConfig`] with figment.
//!
//! Layers, lowest first:
//!
//! 1. [`IrcbusConfig::default`]
//! 2. configs passed to [`ConfigLoader::merge`]
//! 3. `ircbus.{profile}.toml`, when a profile is set
//! 4. `ircbus.toml`
//! 5. `IRCBUS_*` environment variables, `__` separating sections
//!    (`IRCBUS_EVENT_LOOP__FETCH_TIMEOUT_MS=100`)
//!
//! Files are looked up in the current directory, then in
//! `<config dir>/ircbus`; only the first directory holding any of them is
//! read. With the `yaml-config` feature `.yaml` and `.yml` files are read as
//! well, after the TOML ones.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new().profile("staging").load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
use figment::providers::{Env, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::IrcbusConfig;
use super::validation::validate_config;

/// Names the profile whose file is layered under `ircbus.toml`.
pub const PROFILE_ENV: &str = "IRCBUS_PROFILE";

const ENV_PREFIX: &str = "IRCBUS_";
const FILE_STEM: &str = "ircbus";

/// File extensions searched for, in merge order.
const EXTENSIONS: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "toml",
    #[cfg(feature = "yaml-config")]
    "yaml",
    #[cfg(feature = "yaml-config")]
    "yml",
];

/// Builds an [`IrcbusConfig`] from defaults, files and the environment.
#[derive(Debug)]
pub struct ConfigLoader {
    overrides: Figment,
    profile: Option<String>,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    use_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Reads the profile from `IRCBUS_PROFILE`, if set.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: std::env::var(PROFILE_ENV).ok().and_then(normalize_profile),
            search_paths: Vec::new(),
            file: None,
            use_env: true,
        }
    }

    /// Selects `ircbus.{profile}.toml`. Names are case-insensitive.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = normalize_profile(profile.as_ref().to_string());
        self
    }

    /// The profile in effect, lowercased.
    pub fn profile_name(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Replaces the default directories with `path` and any others added.
    pub fn search_path(mut self, path: impl AsRef<Path>) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Reads only `path` instead of searching; it must exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skips the `IRCBUS_*` environment layer.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// Layers `config` above the defaults. Files and the environment still
    /// override it.
    pub fn merge(mut self, config: IrcbusConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<IrcbusConfig> {
        let mut figment = Figment::from(Serialized::defaults(IrcbusConfig::default()))
            .merge(self.overrides.clone());

        for path in self.config_files()? {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, &path)?;
        }

        if self.use_env {
            let env = Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__");
            figment = figment.merge(env);
        }

        let config: IrcbusConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = self.profile_name().unwrap_or("none"),
            level = %config.logging.level,
            connection = config.connection.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Files to merge, lowest priority first.
    fn config_files(&self) -> ConfigResult<Vec<PathBuf>> {
        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            return Ok(vec![path.clone()]);
        }

        let names = self.file_names();
        let directories = if self.search_paths.is_empty() {
            default_search_paths()
        } else {
            self.search_paths.clone()
        };
        let found = directories.iter().find_map(|directory| {
            let files: Vec<_> = names
                .iter()
                .map(|name| directory.join(name))
                .filter(|path| path.is_file())
                .collect();
            (!files.is_empty()).then_some(files)
        });

        Ok(found.unwrap_or_else(|| {
            debug!("No configuration file found");
            Vec::new()
        }))
    }

    /// Profile files of every format come before the main files.
    fn file_names(&self) -> Vec<String> {
        let profile_files = self.profile.iter().flat_map(|profile| {
            EXTENSIONS
                .iter()
                .map(move |ext| format!("{FILE_STEM}.{profile}.{ext}"))
        });
        let main_files = EXTENSIONS.iter().map(|ext| format!("{FILE_STEM}.{ext}"));
        profile_files.chain(main_files).collect()
    }
}

fn normalize_profile(name: String) -> Option<String> {
    let name = name.trim().to_lowercase();
    (!name.is_empty()).then_some(name)
}

fn default_search_paths() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
        .collect()
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<IrcbusConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from `path`, with environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<IrcbusConfig> {
    ConfigLoader::new().file(path).load()
}
