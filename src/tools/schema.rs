//! Function-calling definitions for the agent-facing tools.
//!
//! The sandbox id is injected by the dispatcher and never appears here.

use serde_json::json;

use super::ToolName;
use crate::llm::{FunctionDefinition, ToolDefinition};

/// Definitions for every tool, in a stable order.
pub(crate) fn tool_definitions() -> Vec<ToolDefinition> {
    ToolName::ALL.iter().map(|tool| definition(*tool)).collect()
}

fn definition(tool: ToolName) -> ToolDefinition {
    let (description, parameters) = match tool {
        ToolName::Grep => (
            "Search for a pattern in files using ripgrep.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Text or regex to search for inside files"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in"
                    },
                    "file_pattern": {
                        "type": "string",
                        "description": "Only search files matching this glob (e.g., *.ts, *.py)"
                    },
                    "context_lines": {
                        "type": "integer",
                        "description": "Lines of context around each match"
                    },
                    "case_insensitive": {
                        "type": "boolean",
                        "description": "Ignore case when matching"
                    }
                },
                "required": ["pattern"]
            }),
        ),
        ToolName::List => (
            "List files and directories at a path.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path to list contents of"
                    }
                },
                "required": ["path"]
            }),
        ),
        ToolName::Read => (
            "Read lines from a file.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file"
                    },
                    "start_line": {
                        "type": "integer",
                        "description": "Line number to start from (1-indexed)"
                    },
                    "num_lines": {
                        "type": "integer",
                        "description": "Number of lines to read (max 50)"
                    }
                },
                "required": ["file_path"]
            }),
        ),
    };

    ToolDefinition {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: tool.as_str().to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_tools_in_order() {
        let names: Vec<String> = tool_definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["grep_tool", "list_files", "read_file"]);
    }

    #[test]
    fn test_sandbox_id_is_never_exposed() {
        let json = serde_json::to_string(&tool_definitions()).unwrap();
        assert!(!json.contains("sandbox_id"));
    }
}
