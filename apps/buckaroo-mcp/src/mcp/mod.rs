pub mod client;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod summary;
pub mod tools;

pub use server::{McpServer, McpServerHandle};
pub use tools::ToolContext;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "buckaroo-table";

/// Used when the client does not ask for a protocol version.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

pub const INSTRUCTIONS: &str = "When the user mentions or asks about a CSV, TSV, Parquet, or JSON \
data file, always use the view_data tool to display it. The tool opens an interactive table \
viewer in the browser with sorting, filtering, and summary statistics. Pass the file path as the \
`path` argument. Prefer view_data over reading file contents directly. If the viewer fails to \
start, run the buckaroo_diagnostics tool and report its output to the user.";
