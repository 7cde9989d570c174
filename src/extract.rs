//! Profile text → structured people, optionally written through.
//!
//! Pipeline: [`clean_profile_text`] → extractor prompt → completion →
//! [`recover_json`]. Without write-through the recovered JSON is returned
//! untouched; with it the JSON is read as [`ExtractedData`] and handed to
//! [`FamilyService::import`].

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use family_tree_core::error::FamilyError;
use family_tree_core::import::{ExtractedData, ImportOutcome};
use family_tree_core::json::recover_json;
use family_tree_core::service::FamilyService;
use family_tree_core::text::clean_profile_text;

use crate::llm::CompletionProvider;
use crate::prompts;

/// Body of `POST /llm`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub insert_to_database: bool,
}

#[derive(Debug)]
pub enum ExtractResponse {
    /// The recovered completion JSON, as the model wrote it.
    Extracted(Value),
    Imported(ImportOutcome),
}

/// Runs the extractor over `text` and returns the recovered JSON.
pub async fn extract(
    provider: &dyn CompletionProvider,
    max_tokens: u32,
    text: &str,
) -> Result<Value> {
    let cleaned = clean_profile_text(text);
    if cleaned.is_empty() {
        return Err(FamilyError::validation("text", "No text provided").into());
    }

    let request = prompts::extractor(&cleaned, max_tokens);
    let raw = provider.complete(&request).await?;
    let value = recover_json(&raw)?;
    info!(
        model = provider.model_name(),
        chars = cleaned.len(),
        "extracted profile data"
    );
    Ok(value)
}

pub async fn run(
    service: &FamilyService,
    provider: &dyn CompletionProvider,
    max_tokens: u32,
    request: ExtractRequest,
) -> Result<ExtractResponse> {
    let text = request.text.unwrap_or_default();
    let value = extract(provider, max_tokens, &text).await?;

    if !request.insert_to_database {
        return Ok(ExtractResponse::Extracted(value));
    }

    let data: ExtractedData = serde_json::from_value(value.clone()).map_err(|e| FamilyError::Parse {
        message: format!("extraction does not match the expected shape: {}", e),
        raw: value.to_string(),
    })?;
    Ok(ExtractResponse::Imported(service.import(data).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionRequest;
    use async_trait::async_trait;
    use family_tree_core::store::memory::InMemoryStore;
    use family_tree_core::store::FamilyStore;
    use std::sync::{Arc, Mutex};

    struct Canned {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionProvider for Canned {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn canned(reply: &str) -> Canned {
        Canned {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    const FENCED: &str = "```json\n{\"nodes\":[{\"id\":\"x1\",\"name\":\"Ann Webb\",\"gender\":\"female\"},{\"id\":\"x2\",\"name\":\"Tom Webb\",\"gender\":\"male\"}],\"relations\":[{\"type\":\"married\",\"source\":\"x1\",\"target\":\"x2\"}]}\n```";

    #[tokio::test]
    async fn test_extract_cleans_text_and_recovers_fenced_json() {
        let provider = canned(FENCED);
        let value = extract(&provider, 1000, "Ann   Webb\r\n\r\nBorn 1880").await.unwrap();
        assert_eq!(value["nodes"][0]["name"], "Ann Webb");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.0);
        assert!(seen[0].messages[1].content.contains("Ann Webb\nBorn 1880"));
    }

    #[tokio::test]
    async fn test_blank_text_is_validation_error() {
        let err = extract(&canned("{}"), 1000, "  \n ").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Validation { field, .. }) if field == "text"
        ));
    }

    #[tokio::test]
    async fn test_garbage_completion_is_parse_error_with_raw() {
        let err = extract(&canned("Sorry, I can't help."), 1000, "Ann")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::Parse { raw, .. }) if raw == "Sorry, I can't help."
        ));
    }

    #[tokio::test]
    async fn test_run_with_insert_writes_through() {
        let service = FamilyService::new(Arc::new(InMemoryStore::new()));
        let response = run(
            &service,
            &canned(FENCED),
            1000,
            ExtractRequest {
                text: Some("Ann Webb married Tom Webb".into()),
                insert_to_database: true,
            },
        )
        .await
        .unwrap();

        match response {
            ExtractResponse::Imported(outcome) => {
                assert!(outcome.error.is_none());
                assert_eq!(outcome.nodes.len(), 2);
                assert_eq!(outcome.relations.len(), 1);
            }
            other => panic!("expected import, got {:?}", other),
        }
        assert_eq!(service.store().list_spouse_edges().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_without_insert_returns_raw_json() {
        let service = FamilyService::new(Arc::new(InMemoryStore::new()));
        let response = run(
            &service,
            &canned(FENCED),
            1000,
            ExtractRequest {
                text: Some("Ann".into()),
                insert_to_database: false,
            },
        )
        .await
        .unwrap();
        match response {
            ExtractResponse::Extracted(value) => assert_eq!(value["nodes"][0]["id"], "x1"),
            other => panic!("expected raw extraction, got {:?}", other),
        }
        assert!(service.list_records().await.unwrap().is_empty());
    }
}
