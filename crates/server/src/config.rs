//! Server configuration management

use anyhow::{Context, Result, anyhow};
use protocol::{
    Orientation, PeripheralConfig, PeripheralIdentity, PrinterConfig, ScaleConfig, WeightUnit,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SYSTEM_CONFIG_PATH: &str = "/etc/peripheral-usb/server.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    /// Printer bound at startup
    #[serde(default)]
    pub printer: PrinterSettings,
    /// Scale bound at startup
    #[serde(default)]
    pub scale: ScaleSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// HTTP listen address
    #[serde(default = "ServerSettings::default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
    /// Deadline for one peripheral request, including waiting for the device
    #[serde(default = "ServerSettings::default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout of a single USB transfer
    #[serde(default = "ServerSettings::default_transfer_timeout")]
    pub transfer_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: Self::default_bind_addr(),
            log_level: Self::default_log_level(),
            request_timeout_secs: Self::default_request_timeout(),
            transfer_timeout_ms: Self::default_transfer_timeout(),
        }
    }
}

impl ServerSettings {
    fn default_bind_addr() -> String {
        "0.0.0.0:8000".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_request_timeout() -> u64 {
        30
    }

    fn default_transfer_timeout() -> u64 {
        5000 // 5 seconds
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

/// Printer binding
///
/// # Example Configuration
/// ```toml
/// [printer]
/// vendor_id = "0x04b8"   # Epson
/// product_id = "0x0e15"
/// type = "80mm"
/// copies = 1
/// orientation = "portrait"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterSettings {
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    /// Paper/printer type label
    #[serde(rename = "type", default = "PrinterSettings::default_type")]
    pub printer_type: String,
    #[serde(default = "PrinterSettings::default_copies")]
    pub copies: u32,
    #[serde(default)]
    pub orientation: Orientation,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            vendor_id: None,
            product_id: None,
            printer_type: Self::default_type(),
            copies: Self::default_copies(),
            orientation: Orientation::default(),
        }
    }
}

impl PrinterSettings {
    fn default_type() -> String {
        "80mm".to_string()
    }

    fn default_copies() -> u32 {
        1
    }
}

/// Scale binding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaleSettings {
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub unit: WeightUnit,
}

impl ServerConfig {
    /// Load configuration from `path`, or from the first existing default location
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path,
            None => Self::search_paths()
                .into_iter()
                .find(|candidate| candidate.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Default locations, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        vec![Self::default_path(), PathBuf::from(SYSTEM_CONFIG_PATH)]
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("peripheral-usb").join("server.toml")
        } else {
            PathBuf::from(".config/peripheral-usb/server.toml")
        }
    }

    /// Peripheral configuration the server starts with
    pub fn peripheral_config(&self) -> Result<PeripheralConfig> {
        let printer = PrinterConfig {
            identity: identity_of(
                self.printer.vendor_id.as_deref(),
                self.printer.product_id.as_deref(),
            )
            .context("Invalid [printer] identity")?,
            paper: self.printer.printer_type.clone(),
            copies: self.printer.copies,
            orientation: self.printer.orientation,
        };

        let scale = ScaleConfig {
            identity: identity_of(
                self.scale.vendor_id.as_deref(),
                self.scale.product_id.as_deref(),
            )
            .context("Invalid [scale] identity")?,
            unit: self.scale.unit,
        };

        Ok(PeripheralConfig { printer, scale })
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }

        if self.server.transfer_timeout_ms == 0 {
            return Err(anyhow!("transfer_timeout_ms must be greater than 0"));
        }

        if self.printer.copies == 0 {
            return Err(anyhow!("Invalid printer copies 0, must be at least 1"));
        }

        // Identities must parse and come in pairs
        self.peripheral_config()?;

        Ok(())
    }
}

fn identity_of(
    vendor_id: Option<&str>,
    product_id: Option<&str>,
) -> Result<Option<PeripheralIdentity>> {
    Ok(PeripheralIdentity::from_optional_hex(vendor_id, product_id)?)
}

/// Expand `~` in a user supplied config path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
