pub mod commands;
pub mod config;
pub mod llm;
pub mod logging;
