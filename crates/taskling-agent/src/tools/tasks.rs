use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use taskling_common::Result;
use taskling_db::{CompleteOutcome, Task, TaskStore};
use tokio::sync::Mutex;

use crate::tools::{Tool, ToolContext, ToolOutput};

// ---------------------------------------------------------------------------
// AddTask
// ---------------------------------------------------------------------------

pub struct AddTask {
    store: Arc<Mutex<TaskStore>>,
}

impl AddTask {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddTask {
    fn name(&self) -> &'static str {
        "add_task"
    }

    fn description(&self) -> &'static str {
        "Add a new task to the user's to-do list."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "What the task is, in the user's words (e.g. 'buy milk')."
                }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let Some(description) = args["description"].as_str().map(str::trim) else {
            return Ok(ToolOutput::error("missing 'description' argument"));
        };
        if description.is_empty() {
            return Ok(ToolOutput::error("task description cannot be empty"));
        }

        let store = self.store.lock().await;
        let number = store.insert_task(&context.user_id, description, None)?;
        Ok(ToolOutput::success(format!(
            "\u{2713} Added task #{number}: '{description}'"
        )))
    }
}

// ---------------------------------------------------------------------------
// ListTasks
// ---------------------------------------------------------------------------

pub struct ListTasks {
    store: Arc<Mutex<TaskStore>>,
}

impl ListTasks {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListTasks {
    fn name(&self) -> &'static str {
        "list_tasks"
    }

    fn description(&self) -> &'static str {
        "List all of the user's tasks with their numbers and status."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, context: &ToolContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let store = self.store.lock().await;
        let tasks = store.list_tasks(&context.user_id)?;
        Ok(ToolOutput::success(format_task_list(&tasks)))
    }
}

fn format_task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "You have no tasks! \u{1F389}".to_string();
    }

    let mut out = String::from("Your tasks:");
    for task in tasks {
        let marker = if task.done { "[x]" } else { "[ ]" };
        out.push_str(&format!("\n#{} {} {}", task.number, marker, task.description));
        if let Some(due) = task.due_at {
            out.push_str(&format!(" (due {})", due.format("%Y-%m-%d %H:%M UTC")));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// CompleteTask
// ---------------------------------------------------------------------------

pub struct CompleteTask {
    store: Arc<Mutex<TaskStore>>,
}

impl CompleteTask {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CompleteTask {
    fn name(&self) -> &'static str {
        "complete_task"
    }

    fn description(&self) -> &'static str {
        "Mark a task as done by its number."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "number": {
                    "type": "integer",
                    "description": "The task number as shown in the list (e.g. 3 for task #3)."
                }
            },
            "required": ["number"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let Some(number) = args["number"].as_i64() else {
            return Ok(ToolOutput::error("missing or invalid 'number' argument"));
        };

        let store = self.store.lock().await;
        match store.set_done(&context.user_id, number)? {
            CompleteOutcome::Completed(description) => Ok(ToolOutput::success(format!(
                "\u{2713} Completed task #{number}: '{description}'"
            ))),
            CompleteOutcome::AlreadyDone(description) => Ok(ToolOutput::success(format!(
                "Task #{number}: '{description}' was already done."
            ))),
            CompleteOutcome::NotFound => Ok(ToolOutput::error(format!(
                "No task #{number} found. Use list_tasks to see the current numbers."
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ClearTasks
// ---------------------------------------------------------------------------

pub struct ClearTasks {
    store: Arc<Mutex<TaskStore>>,
}

impl ClearTasks {
    pub fn new(store: Arc<Mutex<TaskStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ClearTasks {
    fn name(&self) -> &'static str {
        "clear_tasks"
    }

    fn description(&self) -> &'static str {
        "Delete all of the user's tasks. Only use when the user explicitly asks to clear or start over."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, context: &ToolContext, _args: serde_json::Value) -> Result<ToolOutput> {
        let store = self.store.lock().await;
        let cleared = store.delete_all(&context.user_id)?;
        Ok(ToolOutput::success(format!("\u{2713} Cleared {cleared} tasks!")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    fn context() -> ToolContext {
        ToolContext {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            timezone: Tz::UTC,
        }
    }

    fn store() -> Arc<Mutex<TaskStore>> {
        Arc::new(Mutex::new(TaskStore::in_memory().expect("store opens")))
    }

    #[tokio::test]
    async fn add_then_list() {
        let store = store();
        let add = AddTask::new(store.clone());
        let list = ListTasks::new(store.clone());

        let out = add
            .execute(&context(), json!({"description": "buy milk"}))
            .await
            .unwrap();
        assert!(!out.is_error);
        assert_eq!(out.content, "\u{2713} Added task #1: 'buy milk'");

        let out = list.execute(&context(), json!({})).await.unwrap();
        assert!(out.content.contains("#1 [ ] buy milk"));
    }

    #[tokio::test]
    async fn empty_list_has_explicit_text() {
        let list = ListTasks::new(store());
        let out = list.execute(&context(), json!({})).await.unwrap();
        assert!(!out.is_error);
        assert!(out.content.contains("no tasks"));
    }

    #[tokio::test]
    async fn add_without_description_is_a_tool_error_not_a_crash() {
        let add = AddTask::new(store());
        let out = add.execute(&context(), json!({})).await.unwrap();
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn complete_unknown_number_reports_not_found() {
        let complete = CompleteTask::new(store());
        let out = complete
            .execute(&context(), json!({"number": 5}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("No task #5"));
    }

    #[tokio::test]
    async fn completing_twice_still_confirms() {
        let store = store();
        let add = AddTask::new(store.clone());
        let complete = CompleteTask::new(store.clone());

        add.execute(&context(), json!({"description": "call mom"}))
            .await
            .unwrap();

        let first = complete
            .execute(&context(), json!({"number": 1}))
            .await
            .unwrap();
        assert!(!first.is_error);
        assert!(first.content.contains("Completed"));

        let second = complete
            .execute(&context(), json!({"number": 1}))
            .await
            .unwrap();
        assert!(!second.is_error);
        assert!(second.content.contains("already done"));
    }

    #[tokio::test]
    async fn clear_reports_the_count() {
        let store = store();
        let add = AddTask::new(store.clone());
        let clear = ClearTasks::new(store.clone());

        add.execute(&context(), json!({"description": "a"})).await.unwrap();
        add.execute(&context(), json!({"description": "b"})).await.unwrap();

        let out = clear.execute(&context(), json!({})).await.unwrap();
        assert_eq!(out.content, "\u{2713} Cleared 2 tasks!");

        let out = clear.execute(&context(), json!({})).await.unwrap();
        assert_eq!(out.content, "\u{2713} Cleared 0 tasks!");
    }
}
