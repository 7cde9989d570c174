//! Assistant tools shared by the side-channel RPC server, the MCP server
//! and the HTTP `/tools` endpoints.
//!
//! # Architecture
//!
//! ```text
//! serve rpc ─┐
//! serve mcp ─┼─▶ ToolRegistry::call ─▶ validate_params ─▶ Tool::execute(ctx)
//! POST /tools┘                                              │
//!                                   ToolContext { FamilyService, CompletionProvider }
//! ```
//!
//! | Tool | Required | Returns |
//! |------|----------|---------|
//! | `get_all_family_nodes` | none | array of person records |
//! | `create_family_node` | `name` | the created record |
//! | `update_family_node` | `id` | the updated record |
//! | `get_family_node_by_id` | `id` | one record |
//! | `search_family_nodes` | `query` | array of matching records |
//! | `ai_suggest_family_node` | `description` | suggested record fields |
//! | `ai_suggest_relationships` | `nodeName` | `{suggestedParents, suggestedSpouses, suggestedChildren}` |
//! | `ai_validate_family_node` | `node` | `{isValid, suggestions}` |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use family_tree_core::error::FamilyError;
use family_tree_core::json::recover_json;
use family_tree_core::service::{FamilyService, PersonInput};

use crate::llm::{CompletionProvider, CompletionRequest};
use crate::prompts;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A named operation an assistant can invoke.
///
/// Parameters are validated against [`parameters_schema`](Tool::parameters_schema)
/// by [`ToolRegistry::call`] before [`execute`](Tool::execute) runs, so
/// implementations can rely on required keys being present.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, used in `tools/call` and `POST /tools/{name}`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) describing the parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Serializable tool info for `tools/list` and `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// What a tool can reach while it runs: the gateway and the completion
/// provider. Cheap to clone.
#[derive(Clone)]
pub struct ToolContext {
    service: Arc<FamilyService>,
    provider: Arc<dyn CompletionProvider>,
}

impl ToolContext {
    pub fn new(service: Arc<FamilyService>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { service, provider }
    }

    pub fn service(&self) -> &FamilyService {
        &self.service
    }

    pub fn provider(&self) -> &dyn CompletionProvider {
        self.provider.as_ref()
    }

    /// Sends a prompt and recovers its JSON answer.
    async fn complete_json(&self, request: CompletionRequest) -> Result<Value> {
        let raw = self.provider.complete(&request).await?;
        recover_json(&raw)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parameter Validation
// ═══════════════════════════════════════════════════════════════════════

/// Checks `params` against a tool's schema: required keys must be present
/// and non-null, present keys must have the declared type. A `null` value
/// for an optional key is accepted as "not given".
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be an object, got {}", json_type_name(other)),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for field in &required {
        match params_obj.get(*field) {
            None | Some(Value::Null) => {
                return Err(
                    FamilyError::validation(*field, "missing required parameter").into(),
                )
            }
            Some(_) => {}
        }
    }

    for (prop_name, prop_schema) in &properties {
        let Some(value) = params_obj.get(prop_name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                return Err(FamilyError::validation(
                    prop_name.as_str(),
                    format!("must be of type '{}', got {}", expected, json_type_name(value)),
                )
                .into());
            }
        }
    }

    Ok(Value::Object(params_obj))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn person_properties() -> Value {
    json!({
        "name": { "type": "string", "description": "Full name" },
        "gender": { "type": "string", "description": "male, female or unknown" },
        "birth": { "type": "string", "description": "Birth date" },
        "birthLocation": { "type": "string" },
        "death": { "type": "string", "description": "Death date, null while living" },
        "deathLocation": { "type": "string" },
        "fatherId": { "type": "string", "description": "Id of an existing person" },
        "motherId": { "type": "string", "description": "Id of an existing person" },
        "occupation": { "type": "string" },
        "profileImg": { "type": "string", "description": "Image URL" },
        "facts": { "type": "string" },
        "spouses": { "type": "array", "description": "Ids of existing spouses", "items": { "type": "string" } }
    })
}

fn person_input(params: Value) -> Result<PersonInput> {
    serde_json::from_value(params)
        .map_err(|e| FamilyError::validation("params", e.to_string()).into())
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    match params[key].as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(FamilyError::validation(key, "must not be empty").into()),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tools
// ═══════════════════════════════════════════════════════════════════════

pub struct GetAllFamilyNodes;

#[async_trait]
impl Tool for GetAllFamilyNodes {
    fn name(&self) -> &str {
        "get_all_family_nodes"
    }

    fn description(&self) -> &str {
        "List every person in the family tree"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(serde_json::to_value(ctx.service().list_records().await?)?)
    }
}

pub struct CreateFamilyNode;

#[async_trait]
impl Tool for CreateFamilyNode {
    fn name(&self) -> &str {
        "create_family_node"
    }

    fn description(&self) -> &str {
        "Add a person to the family tree, linking existing parents and spouses"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": person_properties(),
            "required": ["name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let record = ctx.service().create(person_input(params)?).await?;
        Ok(serde_json::to_value(record)?)
    }
}

pub struct UpdateFamilyNode;

#[async_trait]
impl Tool for UpdateFamilyNode {
    fn name(&self) -> &str {
        "update_family_node"
    }

    fn description(&self) -> &str {
        "Change fields of an existing person; omitted fields keep their value"
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = person_properties();
        properties["id"] = json!({ "type": "string", "description": "Id of the person to update" });
        json!({
            "type": "object",
            "properties": properties,
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let id = str_param(&params, "id")?.to_string();
        let record = ctx.service().update(&id, person_input(params)?).await?;
        Ok(serde_json::to_value(record)?)
    }
}

pub struct GetFamilyNodeById;

#[async_trait]
impl Tool for GetFamilyNodeById {
    fn name(&self) -> &str {
        "get_family_node_by_id"
    }

    fn description(&self) -> &str {
        "Fetch one person by id"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "id": { "type": "string" } },
            "required": ["id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let record = ctx.service().get_record(str_param(&params, "id")?).await?;
        Ok(serde_json::to_value(record)?)
    }
}

pub struct SearchFamilyNodes;

#[async_trait]
impl Tool for SearchFamilyNodes {
    fn name(&self) -> &str {
        "search_family_nodes"
    }

    fn description(&self) -> &str {
        "Find people whose name, birth place, death place or occupation contains the query"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string", "description": "Case-insensitive substring" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let results = ctx.service().search(str_param(&params, "query")?).await?;
        Ok(serde_json::to_value(results)?)
    }
}

pub struct AiSuggestFamilyNode;

#[async_trait]
impl Tool for AiSuggestFamilyNode {
    fn name(&self) -> &str {
        "ai_suggest_family_node"
    }

    fn description(&self) -> &str {
        "Turn a free-text description into suggested person fields"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "description": { "type": "string" } },
            "required": ["description"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let description = str_param(&params, "description")?;
        let existing: Vec<(String, String)> = ctx
            .service()
            .list_records()
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        ctx.complete_json(prompts::suggest_node(description, &existing))
            .await
    }
}

pub struct AiSuggestRelationships;

#[async_trait]
impl Tool for AiSuggestRelationships {
    fn name(&self) -> &str {
        "ai_suggest_relationships"
    }

    fn description(&self) -> &str {
        "Suggest likely parents, spouses and children for a person among existing people"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "nodeName": { "type": "string" } },
            "required": ["nodeName"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let name = str_param(&params, "nodeName")?;
        let names: Vec<String> = ctx
            .service()
            .list_records()
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect();
        ctx.complete_json(prompts::suggest_relationships(name, &names))
            .await
    }
}

pub struct AiValidateFamilyNode;

#[async_trait]
impl Tool for AiValidateFamilyNode {
    fn name(&self) -> &str {
        "ai_validate_family_node"
    }

    fn description(&self) -> &str {
        "Review a person record for missing or implausible data"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "node": { "type": "object" } },
            "required": ["node"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        ctx.complete_json(prompts::validate_node(&params["node"]))
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of assistant tools.
///
/// ```rust
/// use family_tree::tools::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("search_family_nodes").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// A registry holding all eight family tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GetAllFamilyNodes));
        registry.register(Box::new(CreateFamilyNode));
        registry.register(Box::new(UpdateFamilyNode));
        registry.register(Box::new(GetFamilyNodeById));
        registry.register(Box::new(SearchFamilyNodes));
        registry.register(Box::new(AiSuggestFamilyNode));
        registry.register(Box::new(AiSuggestRelationships));
        registry.register(Box::new(AiValidateFamilyNode));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Looks up, validates and runs a tool. An unknown name is
    /// [`FamilyError::NotFound`].
    pub async fn call(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<Value> {
        let tool = self
            .find(name)
            .ok_or_else(|| FamilyError::not_found(format!("tool {}", name)))?;
        let params = validate_params(&tool.parameters_schema(), &params)?;
        debug!(tool = name, "calling tool");
        tool.execute(params, ctx).await
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionRequest;
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

    async fn context(reply: &'static str) -> ToolContext {
        let store = InMemoryStore::new();
        let mut ada = PersonRecord::new("p1", "Ada Lovelace");
        ada.birth_location = Some("London".into());
        store.insert_person(&ada).await.unwrap();
        store
            .insert_person(&PersonRecord::new("p2", "William King"))
            .await
            .unwrap();
        ToolContext::new(
            Arc::new(FamilyService::new(Arc::new(store))),
            Arc::new(Reply(reply)),
        )
    }

    #[test]
    fn test_registry_has_eight_tools() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 8);
        for info in registry.infos() {
            assert_eq!(info.parameters["type"], "object", "{}", info.name);
        }
    }

    #[test]
    fn test_validate_params_required_and_types() {
        let schema = CreateFamilyNode.parameters_schema();
        assert!(validate_params(&schema, &json!({})).is_err());
        assert!(validate_params(&schema, &json!({"name": null})).is_err());
        assert!(validate_params(&schema, &json!({"name": 7})).is_err());
        assert!(validate_params(&schema, &json!({"name": "A", "spouses": "p1"})).is_err());
        assert!(validate_params(&schema, &json!({"name": "A", "fatherId": null})).is_ok());
        assert!(validate_params(&schema, &json!("A")).is_err());
    }

    #[tokio::test]
    async fn test_search_and_get_by_id() {
        let ctx = context("{}").await;
        let registry = ToolRegistry::with_builtins();

        let found = registry
            .call("search_family_nodes", json!({"query": "london"}), &ctx)
            .await
            .unwrap();
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["id"], "p1");

        let one = registry
            .call("get_family_node_by_id", json!({"id": "p2"}), &ctx)
            .await
            .unwrap();
        assert_eq!(one["name"], "William King");
    }

    #[tokio::test]
    async fn test_create_then_update_through_tools() {
        let ctx = context("{}").await;
        let registry = ToolRegistry::with_builtins();

        let created = registry
            .call(
                "create_family_node",
                json!({"name": "Byron", "spouses": ["p1"]}),
                &ctx,
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(ctx.service().store().list_spouse_edges().await.unwrap().len(), 1);

        let updated = registry
            .call(
                "update_family_node",
                json!({"id": id, "occupation": "Poet"}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(updated["occupation"], "Poet");
        assert_eq!(updated["name"], "Byron");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let ctx = context("{}").await;
        let err = ToolRegistry::with_builtins()
            .call("delete_everything", json!({}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FamilyError>(),
            Some(FamilyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ai_tool_recovers_fenced_reply() {
        let ctx = context("```json\n{\"isValid\": false, \"suggestions\": [\"Add a birth date\"]}\n```").await;
        let review = ToolRegistry::with_builtins()
            .call(
                "ai_validate_family_node",
                json!({"node": {"name": "Ada"}}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(review["isValid"], false);
    }
}
