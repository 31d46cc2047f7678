mod mapping_error;
mod mcp_error;
mod tool_error;

pub use mapping_error::MappingError;
pub use mcp_error::{ErrorCode, McpError};
pub use tool_error::{ToolError, ToolErrorKind};
