//! Persistable picture of the session settings.

use crate::config::GenerationConfig;
use crate::error::ConfigError;
use crate::session::ModelSession;
use ollmcp_provider::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every persisted setting. Missing sections load as their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigSnapshot {
    pub model: String,
    /// Enabled flag per tool, keyed by `server.tool`.
    pub enabled_tools: BTreeMap<String, bool>,
    pub context_settings: ContextSettings,
    pub model_settings: ModelSettings,
    pub model_config: GenerationConfig,
    pub display_settings: DisplaySettings,
    pub hil_settings: HilSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    pub retain_context: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub thinking_mode: bool,
    pub show_thinking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    pub show_tool_execution: bool,
    pub show_metrics: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HilSettings {
    pub enabled: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            enabled_tools: BTreeMap::new(),
            context_settings: ContextSettings::default(),
            model_settings: ModelSettings::default(),
            model_config: GenerationConfig::default(),
            display_settings: DisplaySettings::default(),
            hil_settings: HilSettings::default(),
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            retain_context: true,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            thinking_mode: true,
            show_thinking: false,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_tool_execution: true,
            show_metrics: false,
        }
    }
}

impl Default for HilSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ConfigSnapshot {
    /// Record the current settings of `session`.
    pub fn capture(session: &ModelSession) -> Self {
        let flags = session.flags();
        Self {
            model: session.model_name().to_string(),
            enabled_tools: session.visibility().to_wire_map(),
            context_settings: ContextSettings {
                retain_context: flags.retain_context,
            },
            model_settings: ModelSettings {
                thinking_mode: flags.thinking_mode,
                show_thinking: flags.show_thinking,
            },
            model_config: session.generation().clone(),
            display_settings: DisplaySettings {
                show_tool_execution: flags.show_tool_execution,
                show_metrics: flags.show_metrics,
            },
            hil_settings: HilSettings {
                enabled: session.gate().enabled(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::validation("model name is empty"));
        }
        self.model_config.validate()
    }

    /// Overwrite the settings of `session`.
    ///
    /// Nothing changes if the snapshot is invalid. Tool flags apply to live
    /// tools only: saved entries for tools that are gone are ignored and live
    /// tools without an entry become enabled.
    pub fn apply_to(&self, session: &mut ModelSession) -> Result<(), ConfigError> {
        self.validate()?;

        session.set_model(self.model.clone());
        *session.generation_mut() = self.model_config.clone();

        let flags = session.flags_mut();
        flags.retain_context = self.context_settings.retain_context;
        flags.thinking_mode = self.model_settings.thinking_mode;
        flags.show_thinking = self.model_settings.show_thinking;
        flags.show_tool_execution = self.display_settings.show_tool_execution;
        flags.show_metrics = self.display_settings.show_metrics;

        session.gate_mut().set_enabled(self.hil_settings.enabled);
        session.visibility_mut().apply_wire_map(&self.enabled_tools);
        Ok(())
    }
}
