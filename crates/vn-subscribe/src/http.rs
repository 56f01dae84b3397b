use std::time::Duration;

use crate::model::SubsError;

/// Fetch the raw subscription payload. Non-2xx is a fetch error; the
/// request is bounded by `timeout` end to end.
pub async fn fetch_text(url: &str, timeout: Duration) -> Result<String, SubsError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SubsError::Fetch(e.to_string()))?;
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SubsError::Fetch(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(SubsError::Fetch(format!("http status {}", resp.status())));
    }
    resp.text()
        .await
        .map_err(|e| SubsError::Fetch(e.to_string()))
}
