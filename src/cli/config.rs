//! Command-line interface configuration
//!
//! Configuration is read from a `scootflash.toml` in the current working
//! directory, or else from the user's configuration directory. A missing
//! file yields the default configuration.

use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::debug;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::{connection::DeviceHandle, targets::Model};

const CONFIG_FILE_NAME: &str = "scootflash.toml";

/// A configured, known debug probe
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID
    #[serde(
        serialize_with = "serialize_u16_to_hex",
        deserialize_with = "deserialize_hex_to_u16"
    )]
    pub vid: u16,
    /// USB Product ID
    #[serde(
        serialize_with = "serialize_u16_to_hex",
        deserialize_with = "deserialize_hex_to_u16"
    )]
    pub pid: u16,
    /// Serial number of the probe
    #[serde(default)]
    pub serial: Option<String>,
}

fn deserialize_hex_to_u16<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let hex = String::deserialize(deserializer)?.to_lowercase();
    let hex = hex.trim_start_matches("0x");

    let int = u16::from_str_radix(hex, 16).map_err(serde::de::Error::custom)?;

    Ok(int)
}

fn serialize_u16_to_hex<S>(decimal: &u16, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let hex_string = format!("{decimal:04x}");
    serializer.serialize_str(&hex_string)
}

impl From<&UsbDevice> for DeviceHandle {
    fn from(device: &UsbDevice) -> Self {
        DeviceHandle {
            vid: device.vid,
            pid: device.pid,
            serial_number: device.serial.clone(),
        }
    }
}

/// Deployed configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Origin site-relative asset paths are fetched from
    #[serde(default)]
    pub asset_base_url: Option<String>,
    /// Directory site-relative asset paths are read from when no base URL is
    /// configured
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,
    /// Verify the flash content after writing
    #[serde(default)]
    pub verify: bool,
    /// Model to flash when none is given on the command line
    #[serde(default)]
    pub model: Option<Model>,
    /// Preferred debug probe
    #[serde(default)]
    pub probe: Option<UsbDevice>,
    /// Path the configuration was loaded from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("assets")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            asset_base_url: None,
            asset_dir: default_asset_dir(),
            verify: false,
            model: None,
            probe: None,
            source: None,
        }
    }
}

impl Config {
    /// Load the configuration from the first configuration file found
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Config::default()),
        }
    }

    /// Load the configuration from `path`
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read configuration file {}", path.display()))?;

        let mut config: Config = toml::from_str(&raw)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to parse configuration file {}", path.display()))?;

        // Relative asset directories are relative to the configuration file
        if config.asset_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.asset_dir = parent.join(&config.asset_dir);
            }
        }
        config.source = Some(path.to_path_buf());

        debug!("Config: {:#?}", &config);

        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }

        let global = ProjectDirs::from("rs", "scootflash", "scootflash")?
            .config_dir()
            .join(CONFIG_FILE_NAME);

        global.exists().then_some(global)
    }
}
