pub mod command;
pub mod invoker;
pub mod registry;
pub mod types;

#[cfg(test)]
pub mod tests;

pub use command::CommandInvoker;
pub use invoker::{EchoInvoker, ToolError, ToolInvoker};
pub use registry::ToolRegistry;
pub use types::*;
