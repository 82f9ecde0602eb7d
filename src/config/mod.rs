//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, EngineConfig, HttpConfig, LlmConfig, LogFormat, LoggingConfig, ServerConfig,
};
