use super::super::args::GlobalArgs;
use anyhow::Context;
use litmus_core::config::{load_config_or_default, LitmusConfig};
use litmus_core::engine::Engine;
use litmus_core::evaluator::{CustomPromptEvaluator, EvaluatorSet};
use litmus_core::judge::JudgeService;
use litmus_core::mission::MissionDriver;
use litmus_core::providers::embedder::{fake::FakeEmbedder, openai::OpenAIEmbedder, Embedder};
use litmus_core::providers::http::ReqwestTransport;
use litmus_core::providers::llm::fake::FakeClient;
use litmus_core::providers::llm::openai::OpenAIClient;
use litmus_core::providers::llm::tracing::TracingLlmClient;
use litmus_core::providers::llm::LlmClient;
use litmus_core::report::console::default_progress_sink;
use litmus_core::resolve::DirFileStore;
use litmus_core::Store;
use litmus_metrics::MetricBackends;
use std::sync::Arc;
use std::time::Duration;

/// Config file plus command-line overrides.
pub(crate) fn load(global: &GlobalArgs) -> anyhow::Result<LitmusConfig> {
    let mut cfg = load_config_or_default(&global.config)?;
    if let Some(db) = &global.db {
        cfg.store.db = db.clone();
    }
    if let Some(judge) = &global.judge {
        if !matches!(judge.as_str(), "openai" | "fake" | "none") {
            return Err(litmus_core::errors::ConfigError(format!(
                "unknown judge provider '{judge}' (expected openai, fake or none)"
            ))
            .into());
        }
        cfg.judge.provider = judge.clone();
    }
    Ok(cfg)
}

pub(crate) fn open_store(cfg: &LitmusConfig) -> anyhow::Result<Store> {
    if let Some(parent) = cfg.store.db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = Store::open(&cfg.store.db)?;
    store.init_schema()?;
    Ok(store)
}

fn api_key(env_var: &str, what: &str) -> anyhow::Result<String> {
    std::env::var(env_var).map_err(|_| {
        anyhow::Error::new(litmus_core::errors::ConfigError(format!(
            "{what} uses openai but {env_var} is not set"
        )))
    })
}

fn build_llm(cfg: &LitmusConfig) -> anyhow::Result<Option<Arc<dyn LlmClient>>> {
    let j = &cfg.judge;
    let client: Arc<dyn LlmClient> = match j.provider.as_str() {
        "none" => return Ok(None),
        "fake" => Arc::new(FakeClient::new(j.model.clone())),
        "openai" => {
            let mut client = OpenAIClient::new(
                j.model.clone(),
                api_key(&j.api_key_env, "judge")?,
                j.temperature,
                j.max_tokens,
            );
            if let Some(url) = &j.base_url {
                client = client.with_base_url(url.clone());
            }
            Arc::new(client)
        }
        other => anyhow::bail!("unknown judge provider: {other}"),
    };
    Ok(Some(client))
}

fn build_embedder(cfg: &LitmusConfig) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    let Some(e) = &cfg.embedder else {
        return Ok(None);
    };
    let embedder: Option<Arc<dyn Embedder>> = match e.provider.as_str() {
        "none" => None,
        "fake" => Some(Arc::new(FakeEmbedder::new(&e.model))),
        "openai" => {
            let mut embedder = OpenAIEmbedder::new(e.model.clone(), api_key(&e.api_key_env, "embedder")?);
            if let Some(url) = &e.base_url {
                embedder = embedder.with_base_url(url.clone());
            }
            Some(Arc::new(embedder))
        }
        other => anyhow::bail!("unknown embedder provider: {other}"),
    };
    Ok(embedder)
}

/// Wires store, target transport, evaluators, mission driver and progress output from config.
pub(crate) fn build_engine(cfg: &LitmusConfig) -> anyhow::Result<Engine> {
    let store = open_store(cfg)?;
    let settings = cfg.engine_settings();
    let transport = ReqwestTransport::new(settings.request_timeout)?;

    let llm = build_llm(cfg)?;
    let backends = MetricBackends {
        grader: llm
            .clone()
            .map(|c| Arc::new(TracingLlmClient::new(c, "metric")) as Arc<dyn LlmClient>),
        embedder: build_embedder(cfg)?,
    };

    let mut evaluators = EvaluatorSet::new(settings.evaluation_timeout)
        .with(Arc::new(litmus_metrics::ragas_evaluator(&backends)))
        .with(Arc::new(litmus_metrics::deepeval_evaluator(&backends)));

    let mut engine = Engine::new(store.clone(), Arc::new(transport));
    if let Some(client) = llm {
        let judge_client: Arc<dyn LlmClient> = Arc::new(TracingLlmClient::new(client.clone(), "judge"));
        let mut judge = JudgeService::new(cfg.judge_runtime(), judge_client);
        if cfg.judge.cache {
            judge = judge.with_cache(store.clone());
        }
        evaluators = evaluators.with(Arc::new(
            CustomPromptEvaluator::new(judge.clone()).with_default_threshold(cfg.judge.threshold),
        ));

        let guide: Arc<dyn LlmClient> = Arc::new(TracingLlmClient::new(client, "guide"));
        let mut driver = MissionDriver::new(guide, Duration::from_secs(cfg.mission.guide_timeout_secs));
        if cfg.mission.assess {
            driver = driver.with_assessor(judge);
        }
        engine = engine.with_mission_driver(driver);
    }
    if let Some(dir) = &cfg.store.files_dir {
        engine = engine.with_files(Arc::new(DirFileStore::new(dir.clone())));
    }

    Ok(engine
        .with_settings(settings)
        .with_evaluators(evaluators)
        .with_progress(default_progress_sink()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use serial_test::serial;

    fn global(dir: &tempfile::TempDir, judge: Option<&str>) -> GlobalArgs {
        GlobalArgs {
            config: dir.path().join("litmus.yaml"),
            db: Some(dir.path().join("db/litmus.db")),
            judge: judge.map(str::to_string),
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn overrides_apply_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(&global(&dir, Some("fake"))).unwrap();
        assert_eq!(cfg.judge.provider, "fake");
        assert_eq!(cfg.store.db, dir.path().join("db/litmus.db"));
        assert!(load(&global(&dir, Some("magic"))).is_err());
    }

    #[test]
    fn store_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(&global(&dir, None)).unwrap();
        build_engine(&cfg).unwrap();
        assert!(dir.path().join("db/litmus.db").exists());
    }

    #[test]
    #[serial]
    fn openai_without_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = load(&global(&dir, Some("openai"))).unwrap();
        cfg.judge.api_key_env = "LITMUS_TEST_MISSING_KEY".into();
        std::env::remove_var("LITMUS_TEST_MISSING_KEY");
        let err = build_engine(&cfg).err().unwrap();
        assert_eq!(crate::exit_codes::for_error(&err), crate::exit_codes::CONFIG_ERROR);
    }
}
