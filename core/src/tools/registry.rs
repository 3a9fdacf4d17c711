use crate::tools::invoker::ToolError;
use crate::tools::types::ToolSchema;
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Catalog of the tools the assistant may call, in a stable order
pub struct ToolRegistry {
    specs: Vec<ToolSchema>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut registry = Self { specs: Vec::new() };

        registry.register_builtin_tools();
        registry
    }

    /// Process-wide catalog shared by every session
    pub fn global() -> &'static ToolRegistry {
        static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ToolRegistry::new)
    }

    fn register(&mut self, name: &str, description: &str, parameters: Value) {
        self.specs.push(ToolSchema {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        });
    }

    /// Register all built-in tools
    fn register_builtin_tools(&mut self) {
        // review_column_cards
        self.register(
            "review_column_cards",
            "Review the current column cards and report which matches are pending, confirmed or need attention.",
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["pending", "confirmed", "all"],
                        "description": "Which cards to review (default: all)"
                    }
                }
            }),
        );

        // match_columns
        self.register(
            "match_columns",
            "Group unmatched source columns into new match cards with a proposed final name.",
            json!({
                "type": "object",
                "properties": {
                    "column_names": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Columns to match (default: every unmatched column)"
                    },
                    "final_name": { "type": "string", "description": "Name for the resulting match" }
                }
            }),
        );

        // apply_ai_suggestions
        self.register(
            "apply_ai_suggestions",
            "Apply the AI-suggested names and types to pending matches.",
            json!({
                "type": "object",
                "properties": {
                    "match_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Matches to update (default: all pending matches)"
                    }
                }
            }),
        );

        // auto_process_and_match
        self.register(
            "auto_process_and_match",
            "Run the automatic processing pipeline and match every column it can.",
            json!({
                "type": "object",
                "properties": {
                    "confirm": { "type": "boolean", "description": "Confirm the resulting matches (default: false)" }
                }
            }),
        );

        // generate_sql
        self.register(
            "generate_sql",
            "Generate the SQL script for the confirmed matches and offer it for download.",
            json!({
                "type": "object",
                "properties": {
                    "table_name": { "type": "string", "description": "Target table name" },
                    "dialect": {
                        "type": "string",
                        "enum": ["postgres", "mysql", "sqlite"],
                        "description": "SQL dialect (default: postgres)"
                    }
                },
                "required": ["table_name"]
            }),
        );
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> &[ToolSchema] {
        &self.specs
    }

    /// Get the schema for a specific tool
    pub fn get(&self, name: &str) -> Option<&ToolSchema> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    /// Validate arguments against tool schema
    pub fn validate_args(&self, name: &str, args: &Value) -> Result<(), ToolError> {
        let spec = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        // Object shape and required fields only; no full JSON Schema validation
        let Some(obj) = args.as_object() else {
            return Err(ToolError::InvalidArguments {
                tool: name.to_string(),
                reason: "Arguments must be an object".to_string(),
            });
        };

        if let Some(required) = spec.parameters.get("required").and_then(Value::as_array) {
            for field_name in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(field_name) {
                    return Err(ToolError::InvalidArguments {
                        tool: name.to_string(),
                        reason: format!("Missing required field: {}", field_name),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
