//! Server and engine configuration.

use std::fs;

use anyhow::Context;

use crate::engine::EngineParams;

#[derive(Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        Self { bind_addr }
    }
}

/// Engine parameters from the JSON file named by `ENGINE_PARAMS`, or the
/// compiled defaults when the variable is unset. The file may override any
/// subset of fields.
pub fn load_engine_params() -> anyhow::Result<EngineParams> {
    match std::env::var("ENGINE_PARAMS") {
        Ok(path) => load_engine_params_from(&path),
        Err(_) => Ok(EngineParams::default()),
    }
}

fn load_engine_params_from(path: &str) -> anyhow::Result<EngineParams> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading engine params from {path}"))?;
    serde_json::from_str(&data).with_context(|| format!("parsing engine params in {path}"))
}
