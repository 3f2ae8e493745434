use serde::Deserialize;
use serde_json::Value;

use crate::caption::JobStatus;

#[derive(Debug, Deserialize)]
pub(crate) struct Prediction {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PredictionUrls {
    pub get: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    completions: Vec<Completion>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    data: CompletionData,
}

#[derive(Debug, Deserialize)]
struct CompletionData {
    #[serde(default)]
    text: String,
}

pub(crate) fn parse_prediction(raw: &str) -> Result<Prediction, String> {
    serde_json::from_str(raw).map_err(|e| format!("{e}"))
}

/// The polling link of a freshly submitted job.
pub(crate) fn status_url(prediction: &Prediction) -> Option<String> {
    prediction
        .urls
        .as_ref()
        .and_then(|u| u.get.clone())
        .filter(|u| !u.is_empty())
}

/// Map the service's status vocabulary onto the three states the poller
/// cares about. Anything unrecognised ("starting", "processing") keeps polling.
pub(crate) fn job_status(prediction: &Prediction) -> JobStatus {
    match prediction.status.as_str() {
        "succeeded" => JobStatus::Succeeded(
            prediction
                .output
                .as_ref()
                .map(caption_text)
                .unwrap_or_default(),
        ),
        "failed" | "canceled" => JobStatus::Failed,
        _ => JobStatus::Running,
    }
}

/// Captioning models answer either with a single string or with a list of
/// streamed chunks.
fn caption_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts.iter().filter_map(|v| v.as_str()).collect(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Text of the first completion in a completion-service response.
pub(crate) fn first_completion(raw: &str) -> Result<String, String> {
    let resp: CompletionResponse = serde_json::from_str(raw).map_err(|e| format!("{e}"))?;
    resp.completions
        .into_iter()
        .next()
        .map(|c| c.data.text)
        .ok_or_else(|| "no completions returned".to_string())
}
