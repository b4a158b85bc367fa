pub mod embedder;
pub mod http;
pub mod llm;
