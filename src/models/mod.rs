mod message;
mod tool;

pub use message::{Content, Message, Role};
pub use tool::{FunctionCall, ToolCall};
