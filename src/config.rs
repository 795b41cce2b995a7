use crate::accessories::CapabilityKind;
use crate::bridge::BridgeSettings;
use crate::error::{BridgeError, Result};
use crate::hap::setup;
use clap::Parser;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BRIDGE_NAME: &str = "CarConnectivity";
pub const DEFAULT_PORT: u16 = 51234;
const ACCESSORY_CONFIG_FILE: &str = "homekit-accessory.config";

/// Load environment variables from `.env` in the working directory.
///
/// Values may contain spaces without quotes. Variables already set in the
/// environment win.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

pub fn load_dotenv_from(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            // SAFETY: called from main before the runtime starts any threads.
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = [('"', '"'), ('\'', '\'')]
                .iter()
                .find_map(|(open, close)| {
                    value
                        .strip_prefix(*open)
                        .and_then(|inner| inner.strip_suffix(*close))
                })
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Command line flags; each overrides the matching environment setting.
#[derive(Debug, Default, Parser)]
#[command(name = "carconnectivity-homekit-bridge")]
#[command(about = "Expose vehicle telemetry and remote controls as HomeKit accessories")]
pub struct Args {
    /// Identity store document
    #[arg(long = "accessory-config")]
    pub accessory_config_file: Option<PathBuf>,

    /// Name of the bridge accessory
    #[arg(long)]
    pub bridge_name: Option<String>,

    /// Port the accessory host listens on
    #[arg(long)]
    pub port: Option<u16>,

    /// Setup code (DDD-DD-DDD); generated if omitted
    #[arg(long)]
    pub pincode: Option<String>,

    /// Vehicle to leave out (repeatable)
    #[arg(long = "ignore-vin")]
    pub ignore_vins: Vec<String>,

    /// Capability to leave out, e.g. `Flashing` (repeatable)
    #[arg(long = "ignore-accessory-type")]
    pub ignore_accessory_types: Vec<String>,

    /// error, warn, info, debug, trace or off
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run a simulated demo vehicle
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub accessory_config_file: PathBuf,
    pub bridge_name: String,
    pub port: u16,
    pub pincode: Option<String>,
    pub ignore_vins: Vec<String>,
    pub ignore_accessory_types: Vec<String>,
    pub log_level: Option<String>,
    pub simulate: bool,
    /// Raw `HOMEKIT_PORT` value that did not parse as a port.
    #[serde(skip)]
    pub invalid_port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accessory_config_file: default_accessory_config_file(),
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
            port: DEFAULT_PORT,
            pincode: None,
            ignore_vins: Vec::new(),
            ignore_accessory_types: Vec::new(),
            log_level: None,
            simulate: false,
            invalid_port: None,
        }
    }
}

fn default_accessory_config_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".carconnectivity")
        .join(ACCESSORY_CONFIG_FILE)
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("HOMEKIT_ACCESSORY_CONFIG") {
            config.accessory_config_file = PathBuf::from(path);
        }
        if let Ok(name) = std::env::var("HOMEKIT_BRIDGE_NAME") {
            config.bridge_name = name;
        }
        if let Ok(port) = std::env::var("HOMEKIT_PORT") {
            match port.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => config.invalid_port = Some(port),
            }
        }
        if let Ok(pincode) = std::env::var("HOMEKIT_PINCODE") {
            config.pincode = Some(pincode);
        }
        if let Ok(vins) = std::env::var("HOMEKIT_IGNORE_VINS") {
            config.ignore_vins = list(&vins);
        }
        if let Ok(types) = std::env::var("HOMEKIT_IGNORE_ACCESSORY_TYPES") {
            config.ignore_accessory_types = list(&types);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = Some(level);
        }
        if let Ok(simulate) = std::env::var("HOMEKIT_SIMULATE") {
            config.simulate = matches!(
                simulate.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        config
    }

    /// Apply command line overrides.
    pub fn with_args(mut self, args: Args) -> Self {
        if let Some(path) = args.accessory_config_file {
            self.accessory_config_file = path;
        }
        if let Some(name) = args.bridge_name {
            self.bridge_name = name;
        }
        if let Some(port) = args.port {
            self.port = port;
            self.invalid_port = None;
        }
        if args.pincode.is_some() {
            self.pincode = args.pincode;
        }
        if !args.ignore_vins.is_empty() {
            self.ignore_vins = args.ignore_vins;
        }
        if !args.ignore_accessory_types.is_empty() {
            self.ignore_accessory_types = args.ignore_accessory_types;
        }
        if args.log_level.is_some() {
            self.log_level = args.log_level;
        }
        self.simulate |= args.simulate;
        self
    }

    /// Check every setting; the first violation is returned.
    pub fn validate(&self) -> Result<()> {
        if self.bridge_name.trim().is_empty() {
            return Err(BridgeError::Config("bridge name must not be empty".into()));
        }
        if let Some(port) = &self.invalid_port {
            return Err(BridgeError::Config(format!(
                "HOMEKIT_PORT {port:?} must be a port in 1024..=65535"
            )));
        }
        if self.port < 1024 {
            return Err(BridgeError::Config(format!(
                "port {} must be in 1024..=65535",
                self.port
            )));
        }
        if let Some(pincode) = &self.pincode {
            setup::validate_pincode(pincode)?;
        }
        self.log_filter()?;
        self.ignore_capabilities()?;
        Ok(())
    }

    /// The configured log level, if any.
    pub fn log_filter(&self) -> Result<Option<LevelFilter>> {
        self.log_level
            .as_deref()
            .map(|level| {
                LevelFilter::from_str(level.trim()).map_err(|_| {
                    BridgeError::Config(format!(
                        "log level {level:?} must be one of error, warn, info, debug, trace, off"
                    ))
                })
            })
            .transpose()
    }

    pub fn ignore_capabilities(&self) -> Result<BTreeSet<CapabilityKind>> {
        self.ignore_accessory_types
            .iter()
            .map(|name| {
                CapabilityKind::from_str(name)
                    .map_err(|_| BridgeError::Config(format!("unknown accessory type {name:?}")))
            })
            .collect()
    }

    pub fn bridge_settings(&self) -> Result<BridgeSettings> {
        Ok(BridgeSettings {
            name: self.bridge_name.clone(),
            ignore_vins: self.ignore_vins.iter().cloned().collect(),
            ignore_capabilities: self.ignore_capabilities()?,
        })
    }

    /// The configured pincode, or a freshly generated one.
    pub fn pincode_or_generate(&self) -> String {
        self.pincode.clone().unwrap_or_else(setup::generate_pincode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            accessory_config_file: PathBuf::from("/tmp/homekit-accessory.config"),
            ..Config::default()
        }
    }

    #[test]
    fn test_parse_dotenv() {
        let parsed = parse_dotenv(
            "# comment\n\nHOMEKIT_BRIDGE_NAME=My Garage\nHOMEKIT_PINCODE=\"031-45-154\"\nLOG_LEVEL='debug'\nbroken line\n",
        );
        assert_eq!(
            parsed,
            [
                ("HOMEKIT_BRIDGE_NAME".to_string(), "My Garage".to_string()),
                ("HOMEKIT_PINCODE".to_string(), "031-45-154".to_string()),
                ("LOG_LEVEL".to_string(), "debug".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_env() {
        // SAFETY: only this test touches these variables.
        unsafe {
            std::env::set_var("HOMEKIT_IGNORE_VINS", "WVW123, WVW456,");
            std::env::set_var("HOMEKIT_IGNORE_ACCESSORY_TYPES", "Flashing");
            std::env::set_var("HOMEKIT_SIMULATE", "true");
        }
        let config = Config::from_env();
        unsafe {
            std::env::remove_var("HOMEKIT_IGNORE_VINS");
            std::env::remove_var("HOMEKIT_IGNORE_ACCESSORY_TYPES");
            std::env::remove_var("HOMEKIT_SIMULATE");
        }
        assert_eq!(config.ignore_vins, ["WVW123", "WVW456"]);
        assert_eq!(config.ignore_accessory_types, ["Flashing"]);
        assert!(config.simulate);
    }

    #[test]
    fn test_invalid_env_port_is_rejected() {
        // SAFETY: only this test touches HOMEKIT_PORT.
        unsafe { std::env::set_var("HOMEKIT_PORT", "70000") };
        let config = Config {
            accessory_config_file: PathBuf::from("/tmp/homekit-accessory.config"),
            ..Config::from_env()
        };
        unsafe { std::env::remove_var("HOMEKIT_PORT") };

        assert_eq!(config.invalid_port.as_deref(), Some("70000"));
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

        let overridden = config.with_args(Args::parse_from([
            "carconnectivity-homekit-bridge",
            "--port",
            "51000",
        ]));
        assert!(overridden.validate().is_ok());
    }

    #[test]
    fn test_args_override() {
        let args = Args::parse_from([
            "carconnectivity-homekit-bridge",
            "--bridge-name",
            "Garage",
            "--port",
            "51000",
            "--ignore-vin",
            "WVW123",
            "--ignore-accessory-type",
            "Charging",
            "--ignore-accessory-type",
            "Locking",
        ]);
        let config = config().with_args(args);
        assert_eq!(config.bridge_name, "Garage");
        assert_eq!(config.port, 51000);
        let settings = config.bridge_settings().unwrap();
        assert!(settings.ignore_vins.contains("WVW123"));
        assert_eq!(
            settings.ignore_capabilities,
            BTreeSet::from([CapabilityKind::Charging, CapabilityKind::Locking])
        );
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let low_port = Config { port: 80, ..config() };
        assert!(matches!(low_port.validate(), Err(BridgeError::Config(_))));

        let trivial = Config {
            pincode: Some("123-45-678".into()),
            ..config()
        };
        assert!(trivial.validate().is_err());

        let malformed = Config {
            pincode: Some("12345678".into()),
            ..config()
        };
        assert!(malformed.validate().is_err());

        let unknown_type = Config {
            ignore_accessory_types: vec!["Sunroof".into()],
            ..config()
        };
        assert!(unknown_type.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let debug = Config {
            log_level: Some("DEBUG".into()),
            ..config()
        };
        assert_eq!(debug.log_filter().unwrap(), Some(LevelFilter::Debug));

        let off = Config {
            log_level: Some("off".into()),
            ..config()
        };
        assert_eq!(off.log_filter().unwrap(), Some(LevelFilter::Off));

        let verbose = Config {
            log_level: Some("verbose".into()),
            ..config()
        };
        assert!(verbose.validate().is_err());
        assert_eq!(config().log_filter().unwrap(), None);
    }

    #[test]
    fn test_generated_pincode_is_valid() {
        let pincode = config().pincode_or_generate();
        assert!(setup::validate_pincode(&pincode).is_ok());

        let fixed = Config {
            pincode: Some("031-45-154".into()),
            ..config()
        };
        assert_eq!(fixed.pincode_or_generate(), "031-45-154");
    }
}
