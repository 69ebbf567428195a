use super::streaming::ToolCallDelta;
use crate::models::ToolCall;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Rebuilds complete tool calls from the per-index fragments of one streamed turn.
#[derive(Default)]
pub struct ToolCallAggregator {
    calls: HashMap<u32, PartialCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, delta: ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();

        // The first non-empty id sticks.
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            if call.id.is_empty() {
                call.id = id;
            }
        }
        if let Some(name) = delta.name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = delta.arguments {
            call.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls ordered by index. Calls the provider never named get a
    /// generated id so their tool results can still reference them.
    pub fn finalize(self) -> Vec<ToolCall> {
        let mut calls: Vec<(u32, PartialCall)> = self.calls.into_iter().collect();
        calls.sort_by_key(|(index, _)| *index);

        calls
            .into_iter()
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{}", Uuid::new_v4().simple())
                } else {
                    call.id
                };
                ToolCall::new(id, index, call.name, call.arguments)
            })
            .collect()
    }
}
