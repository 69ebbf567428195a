use crate::orchestrator::ChatReply;
use colored::*;
use std::io::{self, Write};

/// Write a streamed fragment immediately.
pub fn print_chunk(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}

pub fn display_tool_call(name: &str) {
    eprintln!("{}", format!("\n[tool] {}", name).cyan());
}

pub fn display_notice(message: &str) {
    eprintln!("{}", message.dimmed());
}

pub fn display_error(message: &str) {
    eprintln!("{} {}", "Error:".red(), message);
}

pub fn display_reply_json(reply: &ChatReply) {
    match serde_json::to_string(reply) {
        Ok(json) => println!("{}", json),
        Err(e) => display_error(&format!("could not encode reply: {}", e)),
    }
}
