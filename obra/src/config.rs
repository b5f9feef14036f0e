//! Configuration loading: a layered fallback chain (explicit path → project
//! `.obra.yml` → user `~/.config/obra/obra.yml` → built-in defaults), with
//! named profiles and `--set key=value` overrides. Grounded in the
//! teacher's own `Config::load()` fallback chain and its liberal use of
//! `#[serde(default)]` on every nested struct.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ObraError, ObraResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub api_url: String,
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { kind: "ollama".to_string(), api_url: "http://localhost:11434".to_string(), model: "llama3.1".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    pub response_timeout: u64,
    pub bypass_interactive_permissions: bool,
    pub use_session_persistence: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            kind: "local-subprocess".to_string(),
            command: "implementer".to_string(),
            response_timeout: 7_200,
            bypass_interactive_permissions: true,
            use_session_persistence: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindowSettings {
    pub limit: u64,
    pub warning_threshold: f64,
    pub refresh_threshold: f64,
    pub critical_threshold: f64,
}

impl Default for ContextWindowSettings {
    fn default() -> Self {
        Self { limit: 200_000, warning_threshold: 0.70, refresh_threshold: 0.80, critical_threshold: 0.95 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub context_window: ContextWindowSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxTurnsSettings {
    pub adaptive: bool,
    pub default: u32,
    pub min: u32,
    pub max: u32,
    pub by_task_type: HashMap<String, u32>,
    pub auto_retry: bool,
    pub retry_multiplier: f64,
}

impl Default for MaxTurnsSettings {
    fn default() -> Self {
        Self {
            adaptive: true,
            default: 30,
            min: 5,
            max: 100,
            by_task_type: HashMap::new(),
            auto_retry: true,
            retry_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    pub max_turns: MaxTurnsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay: f64,
    pub max_delay: f64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub retryable_errors: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: 1.0,
            max_delay: 60.0,
            backoff_factor: 2.0,
            jitter: true,
            retryable_errors: vec!["TransportError".into(), "AgentMaxTurnsError".into(), "ValidatorParseError".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionEngineSettings {
    pub quality_proceed_threshold: f64,
    pub quality_critical_threshold: f64,
}

impl Default for DecisionEngineSettings {
    fn default() -> Self {
        Self { quality_proceed_threshold: 0.70, quality_critical_threshold: 0.50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    pub enabled: bool,
    pub auto_commit: bool,
    pub commit_strategy: String,
    pub branch_per_task: bool,
    pub branch_prefix: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_commit: true,
            commit_strategy: "per-iteration".to_string(),
            branch_per_task: true,
            branch_prefix: "obra/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDependencySettings {
    pub enabled: bool,
    pub max_depth: u32,
    pub allow_cycles: bool,
    pub cascade_failures: bool,
}

impl Default for TaskDependencySettings {
    fn default() -> Self {
        Self { enabled: true, max_depth: 32, allow_cycles: false, cascade_failures: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub agent: AgentSettings,
    pub session: SessionSettings,
    pub orchestration: OrchestrationSettings,
    pub retry: RetrySettings,
    pub decision_engine: DecisionEngineSettings,
    pub git: GitSettings,
    pub task_dependencies: TaskDependencySettings,
}

impl Config {
    /// Loads configuration following the fallback chain: an explicit path if
    /// given, else a project-local `.obra.yml`, else the user config, else
    /// built-in defaults — then applies a named profile's overrides, then
    /// `--set key=value` overrides, in that order.
    pub fn load(
        explicit_path: Option<&Path>,
        project_dir: &Path,
        profile: Option<&str>,
        overrides: &[(String, String)],
    ) -> ObraResult<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Some(config) = Self::try_from_file(&project_dir.join(".obra.yml"))? {
            config
        } else if let Some(dir) = dirs::config_dir() {
            Self::try_from_file(&dir.join("obra").join("obra.yml"))?.unwrap_or_default()
        } else {
            Self::default()
        };

        if let Some(profile_name) = profile {
            config.apply_profile(&project_dir.join(".obra.yml"), profile_name)?;
        }

        for (key, value) in overrides {
            config.apply_override(key, value)?;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> ObraResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ObraError::Configuration(format!("reading {}: {e}", path.display())))?;
        serde_yaml::from_str(&text).map_err(|e| ObraError::Configuration(format!("parsing {}: {e}", path.display())))
    }

    fn try_from_file(path: &Path) -> ObraResult<Option<Self>> {
        if path.exists() {
            Ok(Some(Self::from_file(path)?))
        } else {
            Ok(None)
        }
    }

    /// Looks up `profiles.<name>` in the same YAML document and layers its
    /// keys onto `self` via the same dotted-path override mechanism.
    fn apply_profile(&mut self, path: &Path, profile_name: &str) -> ObraResult<()> {
        let Some(text) = (if path.exists() { std::fs::read_to_string(path).ok() } else { None }) else {
            return Ok(());
        };
        let doc: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|e| ObraError::Configuration(e.to_string()))?;
        let Some(profile) = doc.get("profiles").and_then(|p| p.get(profile_name)) else {
            return Ok(());
        };
        let mut base = serde_yaml::to_value(&*self).map_err(|e| ObraError::Configuration(e.to_string()))?;
        merge_yaml(&mut base, profile);
        *self = serde_yaml::from_value(base).map_err(|e| ObraError::Configuration(e.to_string()))?;
        Ok(())
    }

    /// Applies a single `key=value` override addressed by dotted path, e.g.
    /// `decision_engine.quality_proceed_threshold=0.75`.
    fn apply_override(&mut self, key: &str, value: &str) -> ObraResult<()> {
        let mut doc = serde_yaml::to_value(&*self).map_err(|e| ObraError::Configuration(e.to_string()))?;
        set_dotted(&mut doc, key, value);
        *self = serde_yaml::from_value(doc).map_err(|e| ObraError::Configuration(format!("applying --set {key}={value}: {e}")))?;
        Ok(())
    }
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: &serde_yaml::Value) {
    if let (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) = (&mut *base, overlay) {
        for (k, v) in overlay_map {
            match base_map.get_mut(k) {
                Some(existing) => merge_yaml(existing, v),
                None => {
                    base_map.insert(k.clone(), v.clone());
                }
            }
        }
    } else {
        *base = overlay.clone();
    }
}

fn set_dotted(doc: &mut serde_yaml::Value, key: &str, value: &str) {
    let parts: Vec<&str> = key.split('.').collect();
    let mut cursor = doc;
    for (i, part) in parts.iter().enumerate() {
        if !cursor.is_mapping() {
            *cursor = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        let map = cursor.as_mapping_mut().unwrap();
        let key_value = serde_yaml::Value::String(part.to_string());
        if i == parts.len() - 1 {
            let parsed = parse_scalar(value);
            map.insert(key_value, parsed);
            return;
        }
        cursor = map.entry(key_value).or_insert_with(|| serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
    }
}

fn parse_scalar(value: &str) -> serde_yaml::Value {
    if let Ok(b) = value.parse::<bool>() {
        return serde_yaml::Value::Bool(b);
    }
    if let Ok(i) = value.parse::<i64>() {
        return serde_yaml::Value::Number(i.into());
    }
    if let Ok(f) = value.parse::<f64>() {
        return serde_yaml::Value::Number(serde_yaml::Number::from(f));
    }
    serde_yaml::Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendations() {
        let config = Config::default();
        assert_eq!(config.decision_engine.quality_proceed_threshold, 0.70);
        assert_eq!(config.decision_engine.quality_critical_threshold, 0.50);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn override_applies_dotted_path() {
        let mut config = Config::default();
        config.apply_override("decision_engine.quality_proceed_threshold", "0.8").unwrap();
        assert_eq!(config.decision_engine.quality_proceed_threshold, 0.8);
    }

    #[test]
    fn override_parses_bool_values() {
        let mut config = Config::default();
        config.apply_override("git.enabled", "true").unwrap();
        assert!(config.git.enabled);
    }
}
