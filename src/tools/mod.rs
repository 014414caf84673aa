pub mod executor;
pub mod pubmed;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use pubmed::{
    register_pubmed_tools, EutilsClient, FetchAbstractsTool, FetchSummaryTool,
    SearchArticlesTool,
};
pub use registry::{FnTool, Tool, ToolError, ToolRegistry};
pub use schema::{tool_parameters, validate_args};
