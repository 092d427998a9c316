//! # System Configuration
//!
//! Resolves the running mode and loads the layered JSON configuration files
//! with `more-config`. Files are looked up in a config directory, later files
//! overriding earlier ones:
//!
//! 1. `config.global.json`
//! 2. `{basename}.common.json`
//! 3. `{basename}.{mode}.json`
//! 4. `{basename}.{mode}.{os}.json`
//!
//! Missing files are skipped. Keys are flattened with `:` and lowercased.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fmt};

use config::{ext::*, *};
use serde::{Deserialize, Serialize};

use super::ConfigError;

const CONFIG_GLOBAL_NAME: &str = "config.global.json";
const DEFAULT_RUNNING_MODE: &str = "development";

/// The loaded configuration and where it came from.
#[derive(Default, Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all(deserialize = "PascalCase"))]
#[serde(rename_all(serialize = "PascalCase"))]
pub struct RuntimeConfig {
    /// Running mode used to pick the mode and platform files.
    pub config_running_mode: String,
    /// Directory the files were looked up in.
    pub config_dir: String,
    /// Global file, or empty if absent.
    pub config_global_file: String,
    /// Common file, or empty if absent.
    pub config_common_file: String,
    /// Mode file, or empty if absent.
    pub config_mode_file: String,
    /// Platform file, or empty if absent.
    pub config_platform_file: String,
    /// Flattened, lowercased options.
    pub config_options: BTreeMap<String, String>,
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuntimeConfig
    Running mode: {},
    Config dir: {},
    Global file: {},
    Common file: {},
    Mode file: {},
    Platform file: {},
    Options: {} keys
",
            self.config_running_mode,
            self.config_dir,
            self.config_global_file,
            self.config_common_file,
            self.config_mode_file,
            self.config_platform_file,
            self.config_options.len()
        )
    }
}

/// Loads the configuration of the running executable.
///
/// The directory is `config_dir` if given, else `CONFIGS_LOCATION`, else the
/// executable's directory.
pub fn get_runtime_config(config_dir: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
    let current_exe = env::current_exe()?;
    let basename = process_basename(&current_exe)?;
    let running_mode = get_running_mode(&basename);

    let config_dir = match config_dir {
        Some(dir) => dir.to_path_buf(),
        None => match env::var("CONFIGS_LOCATION") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => process_location(&current_exe)?,
        },
    };

    load_runtime_config(&config_dir, &basename, &running_mode)
}

/// Loads the configuration files for `basename` in `running_mode` from `config_dir`.
pub fn load_runtime_config(
    config_dir: &Path,
    basename: &str,
    running_mode: &str,
) -> Result<RuntimeConfig, ConfigError> {
    let config_global_file = existing_file(config_dir.join(CONFIG_GLOBAL_NAME));
    let config_common_file = existing_file(config_dir.join(format!("{basename}.common.json")));
    let config_mode_file = existing_file(config_dir.join(format!("{basename}.{running_mode}.json")));
    let config_platform_file = existing_file(config_dir.join(format!(
        "{basename}.{running_mode}.{}.json",
        env::consts::OS
    )));

    let config_data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
        .add_json_file(&config_global_file.is().optional())
        .add_json_file(&config_common_file.is().optional())
        .add_json_file(&config_mode_file.is().optional())
        .add_json_file(&config_platform_file.is().optional())
        .build()
        .map_err(|e| ConfigError::Load(format!("{:?}", e)))?;

    let config_options: BTreeMap<String, String> = config_data
        .iter(None)
        .map(|(key, value)| (key.to_lowercase(), value.to_string()))
        .collect();

    Ok(RuntimeConfig {
        config_running_mode: running_mode.to_string(),
        config_dir: config_dir.to_string_lossy().to_string(),
        config_global_file,
        config_common_file,
        config_mode_file,
        config_platform_file,
        config_options,
    })
}

/// `RUNNING_MODE_{BASENAME}`, else `RUNNING_MODE`, else `development`.
pub fn get_running_mode(basename: &str) -> String {
    running_mode_from(basename, |name| env::var(name).ok())
}

fn running_mode_from(basename: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let specific = format!("RUNNING_MODE_{}", basename.to_uppercase());
    lookup(&specific)
        .or_else(|| lookup("RUNNING_MODE"))
        .map(|mode| mode.trim().to_string())
        .filter(|mode| !mode.is_empty())
        .unwrap_or_else(|| DEFAULT_RUNNING_MODE.to_string())
}

/// The path as a string if it is a file, otherwise an empty string.
fn existing_file(path: PathBuf) -> String {
    if path.is_file() {
        path.to_string_lossy().to_string()
    } else {
        String::new()
    }
}

fn process_basename(exe_path: &Path) -> Result<String, ConfigError> {
    exe_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Failed to get the process basename",
            ))
        })
}

fn process_location(exe_path: &Path) -> Result<PathBuf, ConfigError> {
    exe_path.parent().map(Path::to_path_buf).ok_or_else(|| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "Failed to get the process location",
        ))
    })
}
