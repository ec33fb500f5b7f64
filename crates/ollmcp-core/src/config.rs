//! Generation parameters.

use crate::error::ConfigError;
use ollmcp_provider::ModelOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Most stop sequences a request may carry.
pub const MAX_STOP_SEQUENCES: usize = 8;

const MAX_STOP_LEN: usize = 255;

/// Every settable field, in display order.
pub const FIELDS: &[&str] = &[
    "system_prompt",
    "num_keep",
    "seed",
    "num_predict",
    "top_k",
    "top_p",
    "min_p",
    "typical_p",
    "repeat_last_n",
    "temperature",
    "repeat_penalty",
    "presence_penalty",
    "frequency_penalty",
    "stop",
];

/// System prompt plus sampling options.
///
/// Each field is either unset or holds a value; unset fields never reach
/// the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(flatten)]
    pub options: ModelOptions,
}

fn parse<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::validation(format!("{field}: cannot parse `{value}`")))
}

fn check_range(field: &str, value: Option<f64>, min: f64, max: f64) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(ConfigError::validation(format!(
            "{field} must be between {min} and {max}, got {v}"
        ))),
        _ => Ok(()),
    }
}

fn check_min(field: &str, value: Option<i64>, min: i64) -> Result<(), ConfigError> {
    match value {
        Some(v) if v < min => Err(ConfigError::validation(format!(
            "{field} must be at least {min}, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Parse a stop list: a JSON array of strings or comma separated text.
fn parse_stop(value: &str) -> Result<Vec<String>, ConfigError> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ConfigError::validation(format!("stop: {e}")));
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

impl GenerationConfig {
    /// Set `field` from user text, validating the result. On error the
    /// config is left unchanged.
    pub fn set(&mut self, field: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        let o = &mut next.options;
        match field {
            "system_prompt" => next.system_prompt = Some(value.to_string()),
            "num_keep" => o.num_keep = Some(parse(field, value)?),
            "seed" => o.seed = Some(parse(field, value)?),
            "num_predict" => o.num_predict = Some(parse(field, value)?),
            "top_k" => o.top_k = Some(parse(field, value)?),
            "top_p" => o.top_p = Some(parse(field, value)?),
            "min_p" => o.min_p = Some(parse(field, value)?),
            "typical_p" => o.typical_p = Some(parse(field, value)?),
            "repeat_last_n" => o.repeat_last_n = Some(parse(field, value)?),
            "temperature" => o.temperature = Some(parse(field, value)?),
            "repeat_penalty" => o.repeat_penalty = Some(parse(field, value)?),
            "presence_penalty" => o.presence_penalty = Some(parse(field, value)?),
            "frequency_penalty" => o.frequency_penalty = Some(parse(field, value)?),
            "stop" => o.stop = Some(parse_stop(value)?),
            other => return Err(ConfigError::validation(format!("unknown field `{other}`"))),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Clear `field`.
    pub fn unset(&mut self, field: &str) -> Result<(), ConfigError> {
        let o = &mut self.options;
        match field {
            "system_prompt" => self.system_prompt = None,
            "num_keep" => o.num_keep = None,
            "seed" => o.seed = None,
            "num_predict" => o.num_predict = None,
            "top_k" => o.top_k = None,
            "top_p" => o.top_p = None,
            "min_p" => o.min_p = None,
            "typical_p" => o.typical_p = None,
            "repeat_last_n" => o.repeat_last_n = None,
            "temperature" => o.temperature = None,
            "repeat_penalty" => o.repeat_penalty = None,
            "presence_penalty" => o.presence_penalty = None,
            "frequency_penalty" => o.frequency_penalty = None,
            "stop" => o.stop = None,
            other => return Err(ConfigError::validation(format!("unknown field `{other}`"))),
        }
        Ok(())
    }

    /// Current value of `field` for display, `None` when unset.
    pub fn get(&self, field: &str) -> Option<String> {
        let o = &self.options;
        fn show<T: fmt::Display>(v: Option<T>) -> Option<String> {
            v.map(|v| v.to_string())
        }
        match field {
            "system_prompt" => self.system_prompt.clone(),
            "num_keep" => show(o.num_keep),
            "seed" => show(o.seed),
            "num_predict" => show(o.num_predict),
            "top_k" => show(o.top_k),
            "top_p" => show(o.top_p),
            "min_p" => show(o.min_p),
            "typical_p" => show(o.typical_p),
            "repeat_last_n" => show(o.repeat_last_n),
            "temperature" => show(o.temperature),
            "repeat_penalty" => show(o.repeat_penalty),
            "presence_penalty" => show(o.presence_penalty),
            "frequency_penalty" => show(o.frequency_penalty),
            "stop" => o.stop.as_ref().map(|s| format!("{s:?}")),
            _ => None,
        }
    }

    /// Check every set value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.options;
        check_min("num_keep", o.num_keep, -1)?;
        check_min("seed", o.seed, -1)?;
        check_min("num_predict", o.num_predict, -2)?;
        check_min("top_k", o.top_k, 0)?;
        check_range("top_p", o.top_p, 0.0, 1.0)?;
        check_range("min_p", o.min_p, 0.0, 1.0)?;
        check_range("typical_p", o.typical_p, 0.0, 1.0)?;
        check_min("repeat_last_n", o.repeat_last_n, -1)?;
        check_range("temperature", o.temperature, 0.0, f64::MAX)?;
        check_range("repeat_penalty", o.repeat_penalty, 0.0, f64::MAX)?;
        check_range("presence_penalty", o.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", o.frequency_penalty, -2.0, 2.0)?;

        if let Some(stop) = &o.stop {
            if stop.len() > MAX_STOP_SEQUENCES {
                return Err(ConfigError::validation(format!(
                    "at most {MAX_STOP_SEQUENCES} stop sequences are allowed, got {}",
                    stop.len()
                )));
            }
            if let Some(bad) = stop.iter().find(|s| s.is_empty() || s.len() > MAX_STOP_LEN) {
                return Err(ConfigError::validation(format!(
                    "stop sequences must be 1-{MAX_STOP_LEN} characters, got {:?}",
                    bad
                )));
            }
        }
        Ok(())
    }

    /// The system prompt, if set and non-empty.
    pub fn system(&self) -> Option<&str> {
        self.system_prompt.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}
