#![allow(dead_code)]

use litmus_core::engine::{Engine, EngineSettings};
use litmus_core::evaluator::{CustomPromptEvaluator, EvaluatorSet};
use litmus_core::judge::{JudgeRuntimeConfig, JudgeService};
use litmus_core::model::Template;
use litmus_core::providers::http::fake::FakeTransport;
use litmus_core::providers::llm::LlmClient;
use litmus_core::Store;
use std::sync::Arc;
use std::time::Duration;

pub fn store() -> Store {
    let s = Store::memory().unwrap();
    s.init_schema().unwrap();
    s
}

pub fn put_template(store: &Store, yaml: &str) -> Template {
    let t: Template = serde_yaml::from_str(yaml).unwrap();
    store.put_template(&t).unwrap();
    t
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        request_timeout: Duration::from_secs(2),
        evaluation_timeout: Duration::from_secs(2),
        default_max_turns: 10,
        lease_ttl: Duration::from_secs(30),
        max_concurrent_runs: 2,
    }
}

/// Engine over a fake target, optionally judging with `judge`.
pub fn engine(store: &Store, transport: Arc<FakeTransport>, judge: Option<Arc<dyn LlmClient>>) -> Engine {
    let mut evaluators = EvaluatorSet::new(Duration::from_secs(2));
    if let Some(client) = judge {
        let svc = JudgeService::new(JudgeRuntimeConfig::default(), client).with_cache(store.clone());
        evaluators = evaluators.with(Arc::new(CustomPromptEvaluator::new(svc)));
    }
    Engine::new(store.clone(), transport)
        .with_settings(settings())
        .with_evaluators(evaluators)
}
