//! JSON request and response bodies

use crate::service::{PrintJob, PrinterStatus};
use protocol::{
    Orientation, PeripheralConfig, PeripheralIdentity, PrinterConfig, ScaleConfig,
    StatusCondition, ValidationError, validate_copies,
};
use serde::{Deserialize, Serialize};

/// `POST /configure`
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigureRequest {
    pub printer: PrinterSection,
    pub scale: ScaleSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSection {
    #[serde(rename = "type")]
    pub printer_type: Option<String>,
    pub copies: Option<u32>,
    pub orientation: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSection {
    pub vendor_id: String,
    pub product_id: String,
    pub unit: Option<String>,
}

impl ConfigureRequest {
    /// Build the complete record that replaces the current configuration
    ///
    /// Omitted fields take their defaults, not the currently configured values.
    pub fn into_config(self) -> Result<PeripheralConfig, ValidationError> {
        let defaults = PrinterConfig::default();

        let printer = PrinterConfig {
            identity: PeripheralIdentity::from_optional_hex(
                self.printer.vendor_id.as_deref(),
                self.printer.product_id.as_deref(),
            )?,
            paper: self.printer.printer_type.unwrap_or(defaults.paper),
            copies: validate_copies(self.printer.copies.unwrap_or(defaults.copies))?,
            orientation: match self.printer.orientation {
                Some(orientation) => orientation.parse()?,
                None => defaults.orientation,
            },
        };

        let scale = ScaleConfig {
            identity: Some(PeripheralIdentity::from_hex(
                &self.scale.vendor_id,
                &self.scale.product_id,
            )?),
            unit: match self.scale.unit {
                Some(unit) => unit.parse()?,
                None => Default::default(),
            },
        };

        Ok(PeripheralConfig { printer, scale })
    }
}

/// `POST /print`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    #[serde(default)]
    pub printer_type: Option<String>,
    pub content: String,
    #[serde(default)]
    pub options: PrintOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrintOptions {
    pub copies: Option<u32>,
    pub orientation: Option<String>,
}

impl PrintRequest {
    pub fn into_job(self) -> Result<PrintJob, ValidationError> {
        let orientation = self
            .options
            .orientation
            .map(|o| o.parse::<Orientation>())
            .transpose()?;

        Ok(PrintJob {
            content: self.content,
            copies: self.options.copies,
            orientation,
            // An empty type falls back like a missing one
            printer_type: self.printer_type.filter(|t| !t.is_empty()),
        })
    }
}

/// `POST /scale`
#[derive(Debug, Clone, Deserialize)]
pub struct ScaleRequest {
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    #[serde(rename = "jobID")]
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightResponse {
    pub weight: f64,
}

/// `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub printers: Vec<PrinterStatusBody>,
    pub scale: ScaleStatusBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterStatusBody {
    #[serde(rename = "type")]
    pub printer_type: String,
    pub status: StatusCondition,
    pub error_message: Option<String>,
}

impl From<PrinterStatus> for PrinterStatusBody {
    fn from(status: PrinterStatus) -> Self {
        Self {
            printer_type: status.printer_type,
            status: status.condition,
            error_message: status.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleStatusBody {
    pub status: String,
    pub error_message: Option<String>,
    pub weight: f64,
}

impl Default for ScaleStatusBody {
    fn default() -> Self {
        Self {
            status: "ready".to_string(),
            error_message: None,
            weight: 0.0,
        }
    }
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}
