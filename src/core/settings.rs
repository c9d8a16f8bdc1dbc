//! Deployment settings: backend location, demo mode and view defaults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ViewDefaults;
use crate::edges::ScaleMode;
use crate::tokens::SPECIAL_TOKENS;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Prefix for live endpoints; empty means same origin.
    pub api_base: String,
    /// Prefix for precomputed demo responses.
    pub demo_base: String,
    pub demo_enabled: bool,
    /// Demo hash → file table, relative to `demo_base`.
    pub demo_table: String,
    pub special_tokens: Vec<String>,
    pub search_k: usize,
    pub default_sentence: String,
    pub default_layer: u32,
    /// Layers offered by the layer picker, `0..n_layers`.
    pub n_layers: u32,
    pub default_threshold: f32,
    pub n_heads: usize,
    pub scale_mode: ScaleMode,
}

impl Default for AppSettings {
    fn default() -> Self {
        let view = ViewDefaults::default();
        Self {
            api_base: "api".to_string(),
            demo_base: "demo".to_string(),
            demo_enabled: false,
            demo_table: "table.json".to_string(),
            special_tokens: SPECIAL_TOKENS.iter().map(|s| s.to_string()).collect(),
            search_k: 50,
            default_sentence: view.sentence,
            default_layer: view.layer,
            n_layers: 12,
            default_threshold: view.threshold,
            n_heads: view.n_heads,
            scale_mode: ScaleMode::Global,
        }
    }
}

impl AppSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.n_heads == 0 {
            return Err(SettingsError::Invalid {
                field: "n_heads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.search_k == 0 {
            return Err(SettingsError::Invalid {
                field: "search_k",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_layer >= self.n_layers {
            return Err(SettingsError::Invalid {
                field: "default_layer",
                reason: format!("{} is not below n_layers ({})", self.default_layer, self.n_layers),
            });
        }
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(SettingsError::Invalid {
                field: "default_threshold",
                reason: format!(
                    "{} is outside [0, 1]",
                    crate::float_fmt::fmt_f32_fixed(self.default_threshold, 3)
                ),
            });
        }
        Ok(())
    }

    /// Fallbacks for [`crate::config::ConfigStore::from_query`].
    pub fn view_defaults(&self) -> ViewDefaults {
        ViewDefaults {
            sentence: self.default_sentence.clone(),
            layer: self.default_layer,
            n_heads: self.n_heads,
            threshold: self.default_threshold,
            ..ViewDefaults::default()
        }
    }
}
