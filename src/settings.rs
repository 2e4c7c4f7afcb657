use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowbookError, Result};
use crate::models::FlowType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Categorizations below this confidence are flagged for review.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minimum similarity score (0-100) for approximate merchant matches.
    #[serde(default = "default_fuzzy_match_threshold")]
    pub fuzzy_match_threshold: f64,
    /// Standard-deviation multiplier for expense anomaly detection.
    #[serde(default = "default_anomaly_sensitivity")]
    pub anomaly_sensitivity: f64,
    #[serde(default)]
    pub custom_rules: Vec<CustomRule>,
    /// Raw description substring -> canonical merchant name.
    #[serde(default)]
    pub merchant_aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    pub description_contains: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_type: Option<FlowType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

fn default_confidence_threshold() -> f64 {
    0.8
}

fn default_fuzzy_match_threshold() -> f64 {
    85.0
}

fn default_anomaly_sensitivity() -> f64 {
    2.5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            fuzzy_match_threshold: default_fuzzy_match_threshold(),
            anomaly_sensitivity: default_anomaly_sensitivity(),
            custom_rules: Vec::new(),
            merchant_aliases: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(FlowbookError::Settings(format!(
                "confidence_threshold must be between 0 and 1, got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.fuzzy_match_threshold) {
            return Err(FlowbookError::Settings(format!(
                "fuzzy_match_threshold must be between 0 and 100, got {}",
                self.fuzzy_match_threshold
            )));
        }
        if !(self.anomaly_sensitivity > 0.0) {
            return Err(FlowbookError::Settings(format!(
                "anomaly_sensitivity must be positive, got {}",
                self.anomaly_sensitivity
            )));
        }
        for (i, rule) in self.custom_rules.iter().enumerate() {
            if rule.description_contains.trim().is_empty() {
                return Err(FlowbookError::Settings(format!(
                    "custom_rules[{i}]: description_contains is empty"
                )));
            }
            if rule.category.is_none() && rule.flow_type.is_none() {
                return Err(FlowbookError::Settings(format!(
                    "custom_rules[{i}] ('{}') needs a category or a flow_type",
                    rule.description_contains
                )));
            }
        }
        for (alias, canonical) in &self.merchant_aliases {
            if alias.trim().is_empty() || canonical.trim().is_empty() {
                return Err(FlowbookError::Settings(
                    "merchant_aliases entries must be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("flowbook")
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Load settings from `path`, or from the default location when `path` is
/// `None`. A missing default file yields defaults; a missing explicit file is
/// an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(p) => read_settings(p)?,
        None => {
            let p = default_settings_path();
            if p.exists() {
                read_settings(&p)?
            } else {
                Settings::default()
            }
        }
    };
    settings.validate()?;
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_json::from_str(&content)
        .map_err(|e| FlowbookError::Settings(format!("{}: {e}", path.display())))
}

pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}
