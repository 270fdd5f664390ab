pub(crate) mod distribution;
pub(crate) mod gemini;
pub(crate) mod ollama;
pub(crate) mod prompts;
pub(crate) mod provider;
pub(crate) mod response_parser;
pub(crate) mod results;
pub(crate) mod statistics;
pub(crate) mod submission_loader;
