pub mod classify;
pub mod config;
pub mod context;
pub mod decode;
pub mod features;
pub mod llm;
pub mod mood;
pub mod pipeline;
pub mod prompt;
pub mod server;
pub mod service;
pub mod transcribe;
pub mod util;
