use taskling_common::{Error, Result};
use taskling_db::SessionRecord;

use crate::providers::{ChatMessage, ChatRole, ContentBlock, MessagePart};

/// In-flight view of one conversation. Loaded from a `SessionRecord` at the
/// start of a turn, mutated as the loop runs, written back before the reply
/// is returned.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub user_id: String,
    pub history: Vec<ChatMessage>,
    pub plan: Option<Vec<String>>,
    pub plan_step: usize,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            history: Vec::new(),
            plan: None,
            plan_step: 0,
        }
    }

    pub fn from_record(record: SessionRecord) -> Result<Self> {
        let history: Vec<ChatMessage> = serde_json::from_value(record.history)
            .map_err(|e| Error::Database(format!("corrupt session history: {e}")))?;
        Ok(Self {
            session_id: record.session_id,
            user_id: record.user_id,
            history,
            plan: record.plan,
            plan_step: record.plan_step,
        })
    }

    pub fn to_record(&self) -> Result<SessionRecord> {
        let history = serde_json::to_value(&self.history)
            .map_err(|e| Error::Database(format!("failed to serialize history: {e}")))?;
        Ok(SessionRecord {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            history,
            plan: self.plan.clone(),
            plan_step: self.plan_step,
        })
    }

    pub fn push_user(&mut self, text: &str) {
        self.history.push(ChatMessage::user_text(text));
    }

    pub fn push_assistant_text(&mut self, text: &str) {
        self.history.push(ChatMessage::assistant_text(text));
    }

    /// One assistant message per tool call, so each call and its result form
    /// an adjacent pair in history.
    pub fn push_tool_use(&mut self, id: &str, name: &str, input: serde_json::Value) {
        self.history.push(ChatMessage {
            role: ChatRole::Assistant,
            content: MessagePart::Parts(vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }]),
        });
    }

    pub fn push_tool_result(&mut self, tool_use_id: &str, content: &str) {
        self.history.push(ChatMessage {
            role: ChatRole::Tool,
            content: MessagePart::Parts(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: content.to_string(),
            }]),
        });
    }

    /// Keep only the trailing `limit` messages.
    pub fn trim_history(&mut self, limit: usize) {
        if self.history.len() > limit {
            let drop = self.history.len() - limit;
            self.history.drain(..drop);
        }
    }

    pub fn has_active_plan(&self) -> bool {
        self.plan.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_round_trip_preserves_plan_fields() {
        let mut state = SessionState::new("s1", "u1");
        state.push_user("organize my week");
        state.push_tool_use("call_1", "list_tasks", json!({}));
        state.push_tool_result("call_1", "You have no tasks! \u{1F389}");
        state.plan = Some(vec!["list".to_string(), "add".to_string()]);
        state.plan_step = 1;

        let record = state.to_record().expect("serializes");
        let restored = SessionState::from_record(record).expect("deserializes");

        assert_eq!(restored.history.len(), 3);
        assert_eq!(restored.plan, state.plan);
        assert_eq!(restored.plan_step, 1);
    }

    #[test]
    fn trim_keeps_the_tail() {
        let mut state = SessionState::new("s1", "u1");
        for i in 0..10 {
            state.push_user(&format!("message {i}"));
        }
        state.trim_history(4);
        assert_eq!(state.history.len(), 4);

        let MessagePart::Text(last) = &state.history[3].content else {
            panic!("expected text message");
        };
        assert_eq!(last, "message 9");
    }

    #[test]
    fn trim_is_a_no_op_under_the_limit() {
        let mut state = SessionState::new("s1", "u1");
        state.push_user("hi");
        state.trim_history(50);
        assert_eq!(state.history.len(), 1);
    }
}
