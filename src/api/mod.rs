pub mod aggregator;
pub mod client;
pub mod models;
pub mod response;
pub mod streaming;
pub mod vision;

pub use aggregator::ToolCallAggregator;
pub use client::{ByteStream, ChatProvider, HttpProvider};
pub use models::ChatRequest;
pub use streaming::{collect_round, RoundOutput, StreamDecoder, StreamDelta, ToolCallDelta};
