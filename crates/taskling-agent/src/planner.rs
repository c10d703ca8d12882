use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::providers::{
    ChatMessage, LlmProvider, LlmRequest, extract_text,
};

/// Sentinel the classifier emits for requests that need no plan.
const NO_PLAN_SENTINEL: &str = "NO_PLAN_NEEDED";

/// Decides whether a request needs a multi-step plan. `None` means the
/// simple path: the loop attaches no plan at all. Any classifier can sit
/// behind this seam; the loop never sees how the decision was made.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, user_message: &str, history: &[ChatMessage]) -> Option<Vec<String>>;
}

/// Classifier backed by the same model capability as the main loop. On any
/// provider error it falls back to `None`: a missed plan costs less than a
/// failed turn.
pub struct LlmPlanner {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_steps: usize,
}

impl LlmPlanner {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, max_steps: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            max_steps,
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You decide whether a to-do assistant needs a step-by-step plan for the user's \
             request. Simple requests (adding, listing, completing, or clearing tasks, or \
             setting one reminder) need no plan. Only multi-part or aggregate goals do.\n\
             If no plan is needed, reply with exactly {NO_PLAN_SENTINEL}.\n\
             Otherwise reply with a numbered list of at most {} short steps, one per line, \
             and nothing else.",
            self.max_steps
        )
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, user_message: &str, _history: &[ChatMessage]) -> Option<Vec<String>> {
        let request = LlmRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_text(user_message)],
            system: Some(self.system_prompt()),
            max_tokens: Some(256),
            temperature: None,
            tools: Vec::new(),
        };

        let response = match self.provider.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("planner call failed, taking the simple path: {e}");
                return None;
            }
        };

        let text = extract_text(&response.content);
        let plan = parse_plan(&text, self.max_steps);
        match &plan {
            Some(steps) => debug!("planner produced {} steps", steps.len()),
            None => debug!("planner chose the simple path"),
        }
        plan
    }
}

/// Parse the classifier's reply. The sentinel, an empty reply, or anything
/// without numbered lines all mean "no plan".
pub fn parse_plan(text: &str, max_steps: usize) -> Option<Vec<String>> {
    if text.contains(NO_PLAN_SENTINEL) {
        return None;
    }

    let mut steps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((prefix, rest)) = line.split_once('.') else {
            continue;
        };
        if !prefix.chars().all(|c| c.is_ascii_digit()) || prefix.is_empty() {
            continue;
        }
        let step = rest.trim();
        if !step.is_empty() {
            steps.push(step.to_string());
        }
        if steps.len() == max_steps {
            break;
        }
    }

    if steps.is_empty() { None } else { Some(steps) }
}

#[cfg(test)]
mod tests {
    use super::parse_plan;

    #[test]
    fn sentinel_means_no_plan() {
        assert_eq!(parse_plan("NO_PLAN_NEEDED", 5), None);
        assert_eq!(parse_plan("  NO_PLAN_NEEDED\n", 5), None);
    }

    #[test]
    fn numbered_list_becomes_steps() {
        let plan = parse_plan("1. List current tasks\n2. Add the three new tasks\n3. Confirm", 5)
            .expect("plan parses");
        assert_eq!(
            plan,
            vec!["List current tasks", "Add the three new tasks", "Confirm"]
        );
    }

    #[test]
    fn steps_are_capped() {
        let text = "1. a\n2. b\n3. c\n4. d\n5. e\n6. f\n7. g";
        let plan = parse_plan(text, 5).expect("plan parses");
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn chatter_around_the_list_is_ignored() {
        let text = "Here is the plan:\n1. First thing\n2. Second thing\nThat should do it.";
        let plan = parse_plan(text, 5).expect("plan parses");
        assert_eq!(plan, vec!["First thing", "Second thing"]);
    }

    #[test]
    fn unstructured_reply_means_no_plan() {
        assert_eq!(parse_plan("I think you should just add the task.", 5), None);
        assert_eq!(parse_plan("", 5), None);
    }
}
