//! The tool flows.

pub mod call_tool;
pub mod list_tools;

pub use call_tool::{CALL_TOOL_KIND, CallToolFlow, CallToolRequest, CallToolResult, ContentBlock};
pub use list_tools::{LIST_TOOLS_KIND, ListToolsFlow, ListToolsResult, ListedTool};
