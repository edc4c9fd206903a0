use crate::config::ClassifierConfig;
use crate::types::{ClassificationVerdict, CollectorError, FeedItem, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Attempts per item, including the first call.
const MAX_ATTEMPTS: u32 = 3;
/// Fixed pause between attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Worker pool size for parallel classification.
const CLASSIFY_WORKERS: usize = 2;
/// The classification prompt is capped to this many characters.
const PROMPT_LIMIT: usize = 512;

/// Seam between the orchestrator and the external classification service.
/// `classify` owns its whole retry schedule; an `Err` means retries are
/// exhausted and the caller should fail closed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassifyItem: Send + Sync {
    async fn classify(&self, item: &FeedItem) -> Result<bool>;
}

/// Client for an AI workflow endpoint that returns a binary relevance
/// verdict per item.
pub struct WorkflowClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    user: String,
}

#[derive(Serialize)]
struct WorkflowRequest<'a> {
    inputs: WorkflowInputs<'a>,
    user: &'a str,
}

#[derive(Serialize)]
struct WorkflowInputs<'a> {
    blog: &'a str,
}

#[derive(Deserialize)]
struct WorkflowResponse {
    data: WorkflowResult,
}

#[derive(Deserialize)]
struct WorkflowResult {
    status: String,
    #[serde(default)]
    outputs: Option<WorkflowOutputs>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WorkflowOutputs {
    #[serde(rename = "analysisResult", default)]
    analysis_result: Option<String>,
}

impl WorkflowClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            user: config.user.clone(),
        }
    }

    /// Title and summary combined, capped to the prompt limit.
    fn prompt_for(item: &FeedItem) -> String {
        let combined = format!(
            "{}\n{}",
            item.title.as_deref().unwrap_or(""),
            item.description.as_deref().unwrap_or("")
        );
        combined.chars().take(PROMPT_LIMIT).collect()
    }

    /// One call to the workflow endpoint. Any failure comes back as a plain
    /// reason string; the retry loop in `classify` decides what to do.
    async fn request_verdict(&self, text: &str) -> std::result::Result<String, String> {
        let request = WorkflowRequest {
            inputs: WorkflowInputs { blog: text },
            user: &self.user,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("transport error: {}", e))?;

        let decoded: WorkflowResponse = response
            .json()
            .await
            .map_err(|e| format!("undecodable response: {}", e))?;

        decode_verdict(decoded.data)
    }
}

fn decode_verdict(result: WorkflowResult) -> std::result::Result<String, String> {
    if result.status != "succeeded" {
        let detail = result
            .error
            .map(|e| format!(": {}", e))
            .unwrap_or_default();
        return Err(format!("workflow status \"{}\"{}", result.status, detail));
    }

    result
        .outputs
        .and_then(|outputs| outputs.analysis_result)
        .ok_or_else(|| "workflow succeeded but analysisResult is missing".to_string())
}

#[async_trait]
impl ClassifyItem for WorkflowClassifier {
    async fn classify(&self, item: &FeedItem) -> Result<bool> {
        let text = Self::prompt_for(item);
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_verdict(&text).await {
                Ok(verdict) => {
                    let relevant = verdict.trim() == "1";
                    if !relevant {
                        info!(
                            "filtering out *{}* ({}), verdict: {}",
                            item.title.as_deref().unwrap_or("untitled"),
                            item.link,
                            verdict.trim()
                        );
                    }
                    return Ok(relevant);
                }
                Err(reason) => {
                    warn!(
                        "classification attempt {}/{} failed for {}: {}",
                        attempt, MAX_ATTEMPTS, item.link, reason
                    );
                    last_error = reason;
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(CollectorError::Classification {
            link: item.link.clone(),
            reason: last_error,
        })
    }
}

/// Classify the whole accumulated set, either in order one at a time or with
/// a fixed pool of workers. Ordering of the results does not matter: each
/// verdict carries its own item, and persistence re-batches independently.
///
/// A classifier that gives up on an item fails closed: the item is marked
/// not relevant, logged, and the run carries on.
pub async fn classify_all<C: ClassifyItem>(
    classifier: &C,
    items: Vec<FeedItem>,
    parallel: bool,
) -> Vec<ClassificationVerdict> {
    if parallel {
        stream::iter(items.into_iter().map(|item| verdict_for(classifier, item)))
            .buffer_unordered(CLASSIFY_WORKERS)
            .collect()
            .await
    } else {
        let mut verdicts = Vec::with_capacity(items.len());
        for item in items {
            verdicts.push(verdict_for(classifier, item).await);
        }
        verdicts
    }
}

async fn verdict_for<C: ClassifyItem>(classifier: &C, item: FeedItem) -> ClassificationVerdict {
    match classifier.classify(&item).await {
        Ok(relevant) => ClassificationVerdict { item, relevant },
        Err(e) => {
            error!("excluding item after exhausted retries: {}", e);
            ClassificationVerdict {
                item,
                relevant: false,
            }
        }
    }
}
