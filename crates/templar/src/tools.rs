//! Agent tools.
//!
//! A [`Tool`] is a named operation with a JSON Schema for its parameters,
//! served by `GET /tools/list` and `POST /tools/{name}`. The built-ins
//! expose the template store to an agent:
//!
//! | Tool | Parameters | Result |
//! |------|-----------|--------|
//! | `get_template` | `template_id` | `{ template_id, chunks }` in order |
//! | `search_templates` | `query` | `{ templates }` (main chunks) |
//! | `save_template` | `template: [chunk, ...]` | `{ saved, chunks }` |
//!
//! Custom tools implement the same trait and are added with
//! [`ToolRegistry::register`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use templar_core::{NewChunk, TemplateStore};

/// A tool callable by an agent over HTTP.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name, a lowercase identifier with underscores.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Built-in tools are flagged `"builtin": true` in `GET /tools/list`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema of the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` has already passed [`validate_params`].
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool may touch while executing.
#[derive(Clone)]
pub struct ToolContext {
    store: Arc<TemplateStore>,
}

impl ToolContext {
    pub fn new(store: Arc<TemplateStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }
}

/// Listing entry for `GET /tools/list`.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Check `params` against the `required` list and property `type`s of a
/// tool schema. Unknown parameters are passed through untouched.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let Some(params_obj) = params.as_object() else {
        bail!("parameters must be a JSON object");
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !params_obj.contains_key(field) {
                bail!("missing required parameter: {}", field);
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (prop_name, prop_schema) in properties {
            let Some(value) = params_obj.get(prop_name) else {
                continue;
            };
            let Some(expected) = prop_schema.get("type").and_then(Value::as_str) else {
                continue;
            };
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
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    prop_name,
                    expected,
                    value
                );
            }
        }
    }

    Ok(params.clone())
}

fn string_param<'a>(params: &'a Value, name: &str) -> &'a str {
    params[name].as_str().unwrap_or("")
}

/// Ordered chunks of one template.
pub struct GetTemplateTool;

#[async_trait]
impl Tool for GetTemplateTool {
    fn name(&self) -> &str {
        "get_template"
    }

    fn description(&self) -> &str {
        "Fetch every chunk of a template in order"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "template_id": { "type": "string", "description": "Template to fetch" }
            },
            "required": ["template_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let template_id = string_param(&params, "template_id");
        if template_id.trim().is_empty() {
            bail!("template_id must not be empty");
        }
        let chunks = ctx.store().list_chunks(template_id).await?;
        if chunks.is_empty() {
            bail!("template not found: {}", template_id);
        }
        Ok(json!({ "template_id": template_id, "chunks": chunks }))
    }
}

/// Case-insensitive search over template names and main-chunk content.
pub struct SearchTemplatesTool;

#[async_trait]
impl Tool for SearchTemplatesTool {
    fn name(&self) -> &str {
        "search_templates"
    }

    fn description(&self) -> &str {
        "Find templates whose name or main content contains the query"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Substring to look for" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = string_param(&params, "query");
        let templates = ctx.store().search(query).await?;
        Ok(json!({ "templates": templates }))
    }
}

/// Store a list of chunks, typically a whole template drafted by an agent.
pub struct SaveTemplateTool;

#[async_trait]
impl Tool for SaveTemplateTool {
    fn name(&self) -> &str {
        "save_template"
    }

    fn description(&self) -> &str {
        "Save a template given as a list of chunks"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "template": {
                    "type": "array",
                    "description": "Chunks to create, in order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "template_id": { "type": "string" },
                            "chunk_id": { "type": "string" },
                            "chunk_order": { "type": "integer" },
                            "name": { "type": "string" },
                            "content": { "type": "string" },
                            "linked_prompt_id": { "type": "string" }
                        },
                        "required": ["name", "content"]
                    }
                }
            },
            "required": ["template"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let news: Vec<NewChunk> = serde_json::from_value(params["template"].clone())
            .context("invalid template chunk")?;
        if news.is_empty() {
            bail!("template must not be empty");
        }
        let created = ctx.store().create_many(news).await?;
        Ok(json!({ "saved": created.len(), "chunks": created }))
    }
}

/// Registered tools, looked up by name.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding `get_template`, `search_templates`, and
    /// `save_template`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(GetTemplateTool));
        registry.register(Box::new(SearchTemplatesTool));
        registry.register(Box::new(SaveTemplateTool));
        registry
    }

    /// Add a tool. A later tool with a taken name is shadowed by the first.
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
