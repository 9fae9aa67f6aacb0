pub const JSON_MEDIA_TYPE: &str = "application/json";

/// One entry of `toolConfiguration.tools`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    tool_spec: ToolSpec,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function in JSON Schema format
    input_schema: InputSchema,
}

/// The model expects the JSON Schema serialized into a string.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputSchema {
    json: String,
}

impl Tool {
    pub fn new(name: &str, description: &str, parameters: &serde_json::Value) -> Self {
        Self {
            tool_spec: ToolSpec {
                name: name.to_string(),
                description: description.to_string(),
                input_schema: InputSchema {
                    json: parameters.to_string(),
                },
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.tool_spec.name
    }

    pub fn description(&self) -> &str {
        &self.tool_spec.description
    }

    pub fn parameters(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.tool_spec.input_schema.json)
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolConfiguration {
    tools: Vec<Tool>,
}

impl ToolConfiguration {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }
}

/// `status` of a tool result; absent on the wire for success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_is_sent_as_a_string() {
        let tool = Tool::new(
            "query_documents",
            "Search the uploaded documents",
            &json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        );
        let wire = serde_json::to_value(&tool).unwrap();
        assert!(wire["toolSpec"]["inputSchema"]["json"].is_string());
        assert_eq!(tool.parameters().unwrap()["type"], "object");
    }
}
