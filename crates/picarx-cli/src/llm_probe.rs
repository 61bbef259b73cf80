//! Model server discovery.
//!
//! Pings the configured OpenAI-compatible server and lists its models via
//! `GET /v1/models`.  Ollama, vLLM and hosted APIs all answer this route.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

/// Return the models the server offers, or why it could not be reached.
pub fn fetch_models(base_url: &str, api_key: &str) -> Result<Vec<ModelEntry>, String> {
    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| format!("HTTP client init failed: {}", e))?;
    let mut request = client.get(&url);
    if !api_key.is_empty() {
        request = request.bearer_auth(api_key);
    }
    let response = request
        .send()
        .map_err(|e| format!("model server unreachable at {}: {}", url, e))?;
    if !response.status().is_success() {
        return Err(format!("model server returned HTTP {}", response.status()));
    }
    let list: ModelList = response
        .json()
        .map_err(|e| format!("Failed to parse model list: {}", e))?;
    Ok(list.data)
}
