//! Single-kind tool gateway.
//!
//! One process exposes one [`kinds::ToolKind`]: a fixed set of tools announced on a discovery
//! stream and invoked through a dispatch endpoint, each tool confined by the sandbox of its kind.

pub mod config;
pub mod error;
pub mod kinds;
pub mod policy;
pub mod protocol;
pub mod registry;

pub use config::{GatewayConfig, PolicyConfig};
pub use error::{GatewayError, ToolError};
pub use kinds::{ToolKind, build_server};
pub use registry::{ServerDescriptor, ToolDescriptor, ToolHandler};
