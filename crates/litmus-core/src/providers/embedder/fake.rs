use super::Embedder;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word is hashed into one of 64 buckets.
/// Texts sharing words point in similar directions, which is enough for similarity tests.
#[derive(Clone)]
pub struct FakeEmbedder {
    pub model: String,
    calls: Arc<AtomicUsize>,
    fixed: Option<Vec<f32>>,
}

impl FakeEmbedder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            fixed: None,
        }
    }

    pub fn with_fixed(mut self, vec: Vec<f32>) -> Self {
        self.fixed = Some(vec);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn bucket(word: &str) -> usize {
    let digest = md5::compute(word.as_bytes());
    usize::from(digest.0[0]) % DIMS
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(v) = &self.fixed {
            return Ok(v.clone());
        }
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(v)
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }
}
