//! Language-model endpoint discovery.
//!
//! Pings the configured OpenAI-compatible server (Ollama by default) and, if
//! it responds, lists the models it serves from `GET /v1/models`.

use std::time::Duration;

use serde::Deserialize;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A single entry of the `/v1/models` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelInfo>,
}

/// Ping the server and return the list of available models.
///
/// Returns `Err(reason)` when the server is offline, answers with an error
/// status, or the body is not a model listing.
pub async fn fetch_models(base_url: &str, api_key: &str) -> Result<Vec<ModelInfo>, String> {
    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| format!("HTTP client unavailable: {e}"))?;
    let mut request = client.get(&url);
    if !api_key.is_empty() {
        request = request.bearer_auth(api_key);
    }
    let response = request
        .send()
        .await
        .map_err(|e| format!("Language model unreachable at {url}: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Language model returned HTTP {}", response.status()));
    }

    let list: ModelList = response
        .json()
        .await
        .map_err(|e| format!("Failed to parse model listing: {e}"))?;
    Ok(list.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_openai_style_listing() {
        let raw = r#"{"object":"list","data":[{"id":"llava","object":"model"},{"id":"llama3"}]}"#;
        let list: ModelList = serde_json::from_str(raw).unwrap();
        let ids: Vec<_> = list.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["llava", "llama3"]);
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let err = fetch_models("http://127.0.0.1:1", "").await.unwrap_err();
        assert!(err.contains("unreachable"));
    }
}
