//! Block capture contract (§4.1, §8): accumulates ordered blocks across the turns of one run
//! and attaches tool results to their matching `tool_use` block by id.

use agento_protocol::{MessageBlock, RunEvent};

#[derive(Debug, Default)]
pub struct TurnCapture {
    blocks: Vec<MessageBlock>,
}

impl TurnCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one demultiplexed event; only `AssistantTurn` and `ToolResult` affect capture.
    pub fn on_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::AssistantTurn { blocks } => self.blocks.extend(blocks.iter().cloned()),
            RunEvent::ToolResult { tool_use_id, result } => {
                for block in self.blocks.iter_mut().rev() {
                    if let MessageBlock::ToolUse { id, .. } = block {
                        if id == tool_use_id {
                            block.attach_result(tool_use_id, result.clone());
                            break;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub fn blocks(&self) -> &[MessageBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<MessageBlock> {
        self.blocks
    }

    /// Flattened text content for `ChatMessage::content` (§3): concatenation of every block's
    /// text contribution, in arrival order.
    pub fn text_aggregate(&self) -> String {
        self.blocks.iter().map(|b| b.text_contribution()).collect::<Vec<_>>().join("")
    }
}
