//! Chat action dispatcher behind `POST /chat`.
//!
//! A message plus an optional action tag is routed to one branch. Each
//! branch asks the side channel first and, when that fails for any
//! reason, answers directly from the gateway or the completion API. The
//! side-channel failure is logged at `warn` and never reaches the caller.
//!
//! | Action | Side-channel tool | Fallback | Reply type |
//! |--------|-------------------|----------|------------|
//! | `search` | `search_family_nodes` | gateway search | `search_results` |
//! | `list` | `get_all_family_nodes` | gateway list, sorted by name | `list_results` |
//! | `create` | `ai_suggest_family_node` | completion | `creation_suggestion` |
//! | `suggest_relationships` | `ai_suggest_relationships` | completion | `relationship_suggestions` |
//! | `create_node` | `create_family_node` | gateway create | `node_created` |
//! | none / unknown | | completion | `general_response` |

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

use family_tree_core::json::recover_json;
use family_tree_core::service::{FamilyService, PersonInput};

use crate::llm::{CompletionProvider, CompletionRequest};
use crate::prompts;
use crate::side_channel::{call_tool, SideChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Search,
    List,
    Create,
    SuggestRelationships,
    CreateNode,
}

impl ChatAction {
    /// `None` for a missing or unrecognised tag, which selects the
    /// general reply.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim() {
            "search" => Some(ChatAction::Search),
            "list" => Some(ChatAction::List),
            "create" => Some(ChatAction::Create),
            "suggest_relationships" => Some(ChatAction::SuggestRelationships),
            "create_node" => Some(ChatAction::CreateNode),
            _ => None,
        }
    }
}

/// Body of `POST /chat`. `message` is usually a string; `create_node`
/// takes an object with person fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub action: Option<String>,
}

impl ChatRequest {
    fn text(&self) -> String {
        match &self.message {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub message: String,
}

impl ChatReply {
    fn new(kind: &str, data: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            message: message.into(),
        }
    }
}

fn search_words() -> &'static Regex {
    static SEARCH_WORDS: OnceLock<Regex> = OnceLock::new();
    SEARCH_WORDS.get_or_init(|| Regex::new(r"(?i)search|find").expect("valid search word regex"))
}

/// Removes "search" / "find" anywhere in the message, case-insensitively.
pub fn search_query(message: &str) -> String {
    search_words().replace_all(message, "").trim().to_string()
}

fn array_len(value: &Value) -> usize {
    value.as_array().map(Vec::len).unwrap_or(0)
}

pub struct ChatDispatcher {
    service: Arc<FamilyService>,
    provider: Arc<dyn CompletionProvider>,
    side_channel: Arc<dyn SideChannel>,
    deadline: Duration,
}

impl ChatDispatcher {
    pub fn new(
        service: Arc<FamilyService>,
        provider: Arc<dyn CompletionProvider>,
        side_channel: Arc<dyn SideChannel>,
        deadline: Duration,
    ) -> Self {
        Self {
            service,
            provider,
            side_channel,
            deadline,
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply> {
        let action = request.action.as_deref().and_then(ChatAction::parse);
        info!(?action, "chat request");
        match action {
            Some(ChatAction::Search) => self.search(&request.text()).await,
            Some(ChatAction::List) => self.list().await,
            Some(ChatAction::Create) => self.suggest_node(&request.text()).await,
            Some(ChatAction::SuggestRelationships) => {
                self.suggest_relationships(&request.text()).await
            }
            Some(ChatAction::CreateNode) => Ok(self.create_node(request.message).await),
            None => self.general(&request.text()).await,
        }
    }

    /// Side channel first, then `fallback`.
    async fn via_tool<F, Fut>(&self, tool: &str, arguments: Value, fallback: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        match call_tool(self.side_channel.as_ref(), tool, arguments, self.deadline).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(tool, "side channel failed, using fallback: {:#}", e);
                fallback().await
            }
        }
    }

    async fn complete_json(&self, request: CompletionRequest) -> Result<Value> {
        let raw = self.provider.complete(&request).await?;
        recover_json(&raw)
    }

    async fn search(&self, message: &str) -> Result<ChatReply> {
        let query = search_query(message);
        let (service, q) = (&self.service, query.as_str());
        let results = self
            .via_tool(
                "search_family_nodes",
                json!({ "query": query }),
                move || async move { anyhow::Ok(serde_json::to_value(service.search(q).await?)?) },
            )
            .await?;

        let count = array_len(&results);
        let text = if count > 0 {
            format!("Found {} family member(s) matching \"{}\"", count, query)
        } else {
            format!("No family members found matching \"{}\"", query)
        };
        Ok(ChatReply::new("search_results", Some(results), text))
    }

    async fn list(&self) -> Result<ChatReply> {
        let service = &self.service;
        let all = self
            .via_tool("get_all_family_nodes", json!({}), move || async move {
                let mut records = service.list_records().await?;
                records.sort_by(|a, b| a.name.cmp(&b.name));
                anyhow::Ok(serde_json::to_value(records)?)
            })
            .await?;

        let text = format!("Found {} family member(s) in total", array_len(&all));
        Ok(ChatReply::new("list_results", Some(all), text))
    }

    async fn suggest_node(&self, message: &str) -> Result<ChatReply> {
        let suggestion = self
            .via_tool(
                "ai_suggest_family_node",
                json!({ "description": message }),
                move || self.complete_json(prompts::create_fallback(message)),
            )
            .await?;
        Ok(ChatReply::new(
            "creation_suggestion",
            Some(suggestion),
            "Here's what I suggest based on your description:",
        ))
    }

    async fn suggest_relationships(&self, message: &str) -> Result<ChatReply> {
        let suggestions = self
            .via_tool(
                "ai_suggest_relationships",
                json!({ "nodeName": message }),
                move || async move {
                    let existing: Vec<Value> = self
                        .service
                        .list_records()
                        .await?
                        .into_iter()
                        .map(|p| json!({ "id": p.id, "name": p.name }))
                        .collect();
                    self.complete_json(prompts::relationships_fallback(
                        message,
                        &Value::Array(existing),
                    ))
                    .await
                },
            )
            .await?;
        Ok(ChatReply::new(
            "relationship_suggestions",
            Some(suggestions),
            format!("Here are potential relationships for \"{}\":", message),
        ))
    }

    /// Never fails: a failed create becomes an `error` reply.
    async fn create_node(&self, message: Value) -> ChatReply {
        let fields = match message {
            Value::String(text) => recover_json(&text).unwrap_or_else(|_| json!({ "name": text })),
            other => other,
        };

        let service = &self.service;
        let fallback_fields = fields.clone();
        let created = self
            .via_tool("create_family_node", fields, move || async move {
                let input: PersonInput = serde_json::from_value(fallback_fields)?;
                anyhow::Ok(serde_json::to_value(service.create(input).await?)?)
            })
            .await;

        // The side channel writes from its own process.
        self.service.invalidate();

        match created {
            Ok(record) => ChatReply::new(
                "node_created",
                Some(record),
                "Family member created successfully!",
            ),
            Err(e) => {
                warn!("chat create failed: {:#}", e);
                ChatReply::new(
                    "error",
                    None,
                    "Failed to create family member. Please try again.",
                )
            }
        }
    }

    async fn general(&self, message: &str) -> Result<ChatReply> {
        let reply = self.provider.complete(&prompts::general(message)).await?;
        Ok(ChatReply::new("general_response", None, reply.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, DisabledProvider};
    use crate::side_channel::NoSideChannel;
    use async_trait::async_trait;
    use family_tree_core::models::PersonRecord;
    use family_tree_core::store::memory::InMemoryStore;
    use family_tree_core::store::FamilyStore;

    struct Reply(&'static str);

    #[async_trait]
    impl CompletionProvider for Reply {
        fn model_name(&self) -> &str {
            "reply"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// A side channel that answers every tool call with fixed JSON.
    struct Fixed(Value);

    #[async_trait]
    impl SideChannel for Fixed {
        async fn call(&self, _method: &str, _params: Value, _deadline: Duration) -> Result<Value> {
            Ok(json!({ "content": [{ "type": "text", "text": self.0.to_string() }] }))
        }
    }

    async fn service() -> Arc<FamilyService> {
        let store = InMemoryStore::new();
        let mut zoe = PersonRecord::new("z", "Zoe Hart");
        zoe.birth_location = Some("Dublin".into());
        store.insert_person(&zoe).await.unwrap();
        store
            .insert_person(&PersonRecord::new("a", "Abel Hart"))
            .await
            .unwrap();
        Arc::new(FamilyService::new(Arc::new(store)))
    }

    async fn dispatcher(provider: Arc<dyn CompletionProvider>) -> ChatDispatcher {
        ChatDispatcher::new(
            service().await,
            provider,
            Arc::new(NoSideChannel),
            Duration::from_secs(1),
        )
    }

    fn request(message: Value, action: &str) -> ChatRequest {
        ChatRequest {
            message,
            action: Some(action.to_string()),
        }
    }

    #[test]
    fn test_search_query_strips_words() {
        assert_eq!(search_query("Search for Dublin"), "for Dublin");
        assert_eq!(search_query("FIND hart"), "hart");
        assert_eq!(search_query("  Webb "), "Webb");
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(ChatAction::parse("create_node"), Some(ChatAction::CreateNode));
        assert_eq!(ChatAction::parse("dance"), None);
    }

    #[tokio::test]
    async fn test_search_falls_back_to_gateway() {
        let chat = dispatcher(Arc::new(DisabledProvider)).await;
        let reply = chat.handle(request(json!("find dublin"), "search")).await.unwrap();
        assert_eq!(reply.kind, "search_results");
        assert_eq!(reply.message, "Found 1 family member(s) matching \"dublin\"");

        let reply = chat.handle(request(json!("search Paris"), "search")).await.unwrap();
        assert_eq!(reply.message, "No family members found matching \"Paris\"");
    }

    #[tokio::test]
    async fn test_list_fallback_sorts_by_name() {
        let chat = dispatcher(Arc::new(DisabledProvider)).await;
        let reply = chat.handle(request(Value::Null, "list")).await.unwrap();
        assert_eq!(reply.message, "Found 2 family member(s) in total");
        let data = reply.data.unwrap();
        assert_eq!(data[0]["name"], "Abel Hart");
    }

    #[tokio::test]
    async fn test_side_channel_answer_is_preferred() {
        let chat = ChatDispatcher::new(
            service().await,
            Arc::new(DisabledProvider),
            Arc::new(Fixed(json!([{ "id": "remote", "name": "Remote" }]))),
            Duration::from_secs(1),
        );
        let reply = chat.handle(request(json!("x"), "list")).await.unwrap();
        assert_eq!(reply.data.unwrap()[0]["id"], "remote");
    }

    #[tokio::test]
    async fn test_create_suggestion_uses_completion_fallback() {
        let chat = dispatcher(Arc::new(Reply("```json\n{\"name\": \"Iris Hart\"}\n```"))).await;
        let reply = chat
            .handle(request(json!("my aunt Iris"), "create"))
            .await
            .unwrap();
        assert_eq!(reply.kind, "creation_suggestion");
        assert_eq!(reply.data.unwrap()["name"], "Iris Hart");
    }

    #[tokio::test]
    async fn test_relationship_suggestions_message() {
        let chat = dispatcher(Arc::new(Reply("[]"))).await;
        let reply = chat
            .handle(request(json!("Iris Hart"), "suggest_relationships"))
            .await
            .unwrap();
        assert_eq!(reply.kind, "relationship_suggestions");
        assert_eq!(reply.message, "Here are potential relationships for \"Iris Hart\":");
    }

    #[tokio::test]
    async fn test_create_node_falls_back_to_gateway_then_error() {
        let chat = dispatcher(Arc::new(DisabledProvider)).await;
        let reply = chat
            .handle(request(json!({"name": "Iris Hart", "fatherId": "a"}), "create_node"))
            .await
            .unwrap();
        assert_eq!(reply.kind, "node_created");
        assert_eq!(reply.message, "Family member created successfully!");

        let reply = chat
            .handle(request(json!({"birth": "1900"}), "create_node"))
            .await
            .unwrap();
        assert_eq!(reply.kind, "error");
        assert_eq!(reply.message, "Failed to create family member. Please try again.");
    }

    #[tokio::test]
    async fn test_unknown_action_is_general_response() {
        let chat = dispatcher(Arc::new(Reply(" Hello there! "))).await;
        let reply = chat.handle(request(json!("hi"), "dance")).await.unwrap();
        assert_eq!(reply.kind, "general_response");
        assert_eq!(reply.message, "Hello there!");
        assert!(reply.data.is_none());
    }
}
