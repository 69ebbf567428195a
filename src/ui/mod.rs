mod output;

pub use output::{display_error, display_notice, display_reply_json, display_tool_call, print_chunk};
