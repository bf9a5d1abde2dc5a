pub mod executor;
pub mod protocol;

pub use executor::Executor;
pub use protocol::{McpError, McpRequest, McpResponse};
