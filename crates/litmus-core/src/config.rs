//! `litmus.yaml` loading, plus template files.

use crate::engine::EngineSettings;
use crate::errors::ConfigError;
use crate::judge::JudgeRuntimeConfig;
use crate::mission::DEFAULT_MAX_TURNS;
use crate::model::{Template, DEFAULT_JUDGE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LitmusConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub mission: MissionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedder: Option<EmbedderConfig>,
}

impl Default for LitmusConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            judge: JudgeConfig::default(),
            mission: MissionConfig::default(),
            embedder: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db: PathBuf,
    /// Directory backing `[FILE: name]` references. Without it, files come from the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_dir: Option<PathBuf>,
    pub lease_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from(".litmus/litmus.db"),
            files_dir: None,
            lease_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub request_timeout_secs: u64,
    pub evaluation_timeout_secs: u64,
    pub max_concurrent_runs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            evaluation_timeout_secs: 120,
            max_concurrent_runs: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// `openai`, `fake` or `none`.
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub threshold: f64,
    pub timeout_secs: u64,
    pub cache: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: "none".into(),
            model: "gpt-4o-mini".into(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.0,
            max_tokens: 1000,
            threshold: DEFAULT_JUDGE_THRESHOLD,
            timeout_secs: 60,
            cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub default_max_turns: u32,
    pub guide_timeout_secs: u64,
    /// Judge the whole conversation once a mission ends.
    pub assess: bool,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            default_max_turns: DEFAULT_MAX_TURNS,
            guide_timeout_secs: 60,
            assess: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

impl LitmusConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            request_timeout: Duration::from_secs(self.engine.request_timeout_secs),
            evaluation_timeout: Duration::from_secs(self.engine.evaluation_timeout_secs),
            default_max_turns: self.mission.default_max_turns,
            lease_ttl: Duration::from_secs(self.store.lease_ttl_secs),
            max_concurrent_runs: self.engine.max_concurrent_runs.max(1),
        }
    }

    pub fn judge_runtime(&self) -> JudgeRuntimeConfig {
        JudgeRuntimeConfig {
            provider: self.judge.provider.clone(),
            temperature: self.judge.temperature,
            max_tokens: self.judge.max_tokens,
            timeout: Duration::from_secs(self.judge.timeout_secs),
            cache: self.judge.cache,
            ..JudgeRuntimeConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if !matches!(self.judge.provider.as_str(), "openai" | "fake" | "none") {
            return Err(ConfigError(format!(
                "unknown judge provider '{}' (expected openai, fake or none)",
                self.judge.provider
            )));
        }
        if !(0.0..=1.0).contains(&self.judge.threshold) {
            return Err(ConfigError(format!(
                "judge.threshold must be within [0, 1], got {}",
                self.judge.threshold
            )));
        }
        if self.engine.request_timeout_secs == 0 || self.judge.timeout_secs == 0 {
            return Err(ConfigError("timeouts must be at least one second".into()));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<LitmusConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let cfg: LitmusConfig = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}

/// A missing file yields the defaults; an unreadable or invalid one is still an error.
pub fn load_config_or_default(path: &Path) -> Result<LitmusConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(LitmusConfig::default())
    }
}

/// Reads a template from YAML, or JSON when the extension says so.
pub fn load_template(path: &Path) -> Result<Template, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read template {}: {}", path.display(), e)))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let template: Template = if is_json {
        serde_json::from_str(&raw).map_err(|e| ConfigError(format!("failed to parse JSON: {}", e)))?
    } else {
        serde_yaml::from_str(&raw).map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?
    };
    template
        .validate()
        .map_err(|e| ConfigError(format!("invalid template {}: {}", path.display(), e)))?;
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let p = dir.path().join(name);
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        p
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(
            &dir,
            "litmus.yaml",
            "version: 1\njudge:\n  provider: fake\nmission:\n  default_max_turns: 4\n",
        );
        let cfg = load_config(&p).unwrap();
        assert_eq!(cfg.judge.provider, "fake");
        assert_eq!(cfg.judge.timeout_secs, 60);
        let settings = cfg.engine_settings();
        assert_eq!(settings.default_max_turns, 4);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_version_and_provider() {
        let dir = tempfile::tempdir().unwrap();
        let p = write(&dir, "a.yaml", "version: 2\n");
        assert!(load_config(&p).unwrap_err().0.contains("unsupported config version"));
        let p = write(&dir, "b.yaml", "judge:\n  provider: magic\n");
        assert!(load_config(&p).unwrap_err().0.contains("unknown judge provider"));
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_or_default(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg, LitmusConfig::default());
    }

    #[test]
    fn templates_from_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let y = write(
            &dir,
            "t.yaml",
            "id: t1\nrequest: { url: 'http://svc' }\ncases:\n  - values: { query: hi }\n",
        );
        assert_eq!(load_template(&y).unwrap().id, "t1");
        let j = write(
            &dir,
            "t.json",
            r#"{"id": "t2", "kind": "mission", "request": {"url": "http://svc"}}"#,
        );
        assert_eq!(load_template(&j).unwrap().id, "t2");
        let bad = write(&dir, "bad.yaml", "id: t3\n");
        assert!(load_template(&bad).unwrap_err().0.contains("no test cases"));
    }
}
