use std::sync::Arc;

use chrono_tz::Tz;
use dashmap::DashMap;
use taskling_common::Result;
use taskling_db::SessionStore;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::gateway::{ModelGateway, ModelTurn, ToolRequest};
use crate::planner::Planner;
use crate::session::SessionState;
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};

/// Built-in assistant persona. Overridable via config.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Taskling, a friendly and efficient personal to-do assistant. You help \
the user keep track of tasks and reminders through short chat messages.

Guidelines:
- Use the provided tools for anything that reads or changes the task list; \
never invent task numbers or contents.
- Refer to tasks by the numbers shown in list_tasks.
- Keep replies short and warm, like a text message.
- When a tool reports an error, explain the problem plainly and suggest what \
to try instead.";

const BUDGET_APOLOGY: &str = "I'm having trouble completing this, please rephrase.";
const MODEL_APOLOGY: &str =
    "I'm having trouble responding right now, please try again in a moment.";
const GENERIC_APOLOGY: &str = "Something went wrong, please try again.";

/// Knobs for the execution loop.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Hard cap on model calls per user message.
    pub turn_budget: usize,
    /// Persisted history keeps at most this many trailing messages.
    pub history_limit: usize,
    pub system_prompt: String,
    pub default_timezone: Tz,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            turn_budget: 10,
            history_limit: 50,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_timezone: Tz::UTC,
        }
    }
}

/// Drives one conversation turn at a time: route, optionally plan, then
/// alternate model calls and tool dispatches until a final reply lands.
pub struct AgentRuntime {
    gateway: ModelGateway,
    planner: Arc<dyn Planner>,
    tools: ToolRegistry,
    sessions: Arc<Mutex<SessionStore>>,
    settings: RuntimeSettings,
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AgentRuntime {
    pub fn new(
        gateway: ModelGateway,
        planner: Arc<dyn Planner>,
        tools: ToolRegistry,
        sessions: Arc<Mutex<SessionStore>>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            gateway,
            planner,
            tools,
            sessions,
            settings,
            turn_locks: DashMap::new(),
        }
    }

    /// The outer boundary: always returns text, never an error. Messages for
    /// the same session queue behind each other; distinct sessions run
    /// concurrently.
    #[instrument(skip(self, text), fields(session_id = %session_id, user_id = %user_id))]
    pub async fn handle_user_message(
        &self,
        session_id: &str,
        user_id: &str,
        text: &str,
    ) -> String {
        let lock = self
            .turn_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        match self.run_turn(session_id, user_id, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("turn failed: {e}");
                GENERIC_APOLOGY.to_string()
            }
        }
    }

    async fn run_turn(&self, session_id: &str, user_id: &str, text: &str) -> Result<String> {
        let mut session = self.load_session(session_id, user_id).await?;
        session.push_user(text);

        // ROUTING: the planner fork. None means no plan is attached at all.
        if let Some(steps) = self.planner.plan(text, &session.history).await {
            info!(steps = steps.len(), "attached plan to session");
            session.plan = Some(steps);
            session.plan_step = 0;
        }

        let tool_defs = self.tools.definitions();
        let mut gateway_calls = 0usize;

        let reply = 'turn: loop {
            if gateway_calls >= self.settings.turn_budget {
                warn!(
                    budget = self.settings.turn_budget,
                    "turn budget exhausted, forcing done"
                );
                session.plan = None;
                session.plan_step = 0;
                break BUDGET_APOLOGY.to_string();
            }
            gateway_calls += 1;

            let system = self.compose_system(&session);
            let turn = match self
                .gateway
                .advance(&system, &session.history, &tool_defs)
                .await
            {
                Ok(turn) => turn,
                Err(e) => {
                    error!("model gateway failed after retry: {e}");
                    session.plan = None;
                    session.plan_step = 0;
                    break MODEL_APOLOGY.to_string();
                }
            };

            match turn {
                ModelTurn::FinalReply(reply_text) => {
                    // A reply on the last step completes the plan; a reply
                    // any earlier abandons it rather than forcing more turns.
                    if let Some(plan) = session.plan.take() {
                        if session.plan_step + 1 < plan.len() {
                            warn!(
                                step = session.plan_step,
                                total = plan.len(),
                                "model replied before the plan finished, abandoning plan"
                            );
                        }
                        session.plan_step = 0;
                    }
                    break reply_text;
                }
                ModelTurn::ToolRequests(requests) => {
                    if requests.is_empty() {
                        warn!("model returned an empty tool batch, treating as empty reply");
                        session.plan = None;
                        session.plan_step = 0;
                        break String::new();
                    }

                    // Strictly sequential, in receipt order: later calls in a
                    // batch may depend on earlier effects.
                    for request in &requests {
                        let output = match self.dispatch(&session, request).await {
                            Ok(output) => output,
                            Err(e) => {
                                error!("tool '{}' failed: {e}", request.name);
                                session.plan = None;
                                session.plan_step = 0;
                                break 'turn GENERIC_APOLOGY.to_string();
                            }
                        };
                        session.push_tool_use(
                            &request.id,
                            &request.name,
                            request.arguments.clone(),
                        );
                        session.push_tool_result(&request.id, &output.content);
                    }

                    // REFLECTING: only reachable with an active plan.
                    if let Some(plan) = &session.plan {
                        session.plan_step += 1;
                        if session.plan_step >= plan.len() {
                            info!(steps = plan.len(), "plan complete");
                            session.plan = None;
                            session.plan_step = 0;
                        }
                    }
                }
            }
        };

        session.push_assistant_text(&reply);
        self.persist(&mut session).await?;
        Ok(reply)
    }

    async fn dispatch(&self, session: &SessionState, request: &ToolRequest) -> Result<ToolOutput> {
        let context = ToolContext {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            timezone: self.settings.default_timezone,
        };

        let Some(tool) = self.tools.find(&request.name) else {
            return Ok(ToolOutput::error(format!("unknown tool: {}", request.name)));
        };

        match tool.execute(&context, request.arguments.clone()).await {
            Ok(output) => Ok(output),
            // Domain errors belong in the result text, never in the loop.
            Err(e) if e.is_domain() => Ok(ToolOutput::error(format!("{e}"))),
            Err(e) => Err(e),
        }
    }

    fn compose_system(&self, session: &SessionState) -> String {
        let Some(plan) = &session.plan else {
            return self.settings.system_prompt.clone();
        };

        let mut out = self.settings.system_prompt.clone();
        out.push_str("\n\nYou are working through a plan for the user's request:\n");
        for (i, step) in plan.iter().enumerate() {
            out.push_str(&format!("{}. {step}\n", i + 1));
        }
        if session.plan_step < plan.len() {
            out.push_str(&format!(
                "Current step ({} of {}): {}",
                session.plan_step + 1,
                plan.len(),
                plan[session.plan_step]
            ));
        }
        out
    }

    async fn load_session(&self, session_id: &str, user_id: &str) -> Result<SessionState> {
        let record = {
            let sessions = self.sessions.lock().await;
            sessions.load(session_id)?
        };

        match record {
            Some(record) => {
                let mut session = SessionState::from_record(record)?;
                session.user_id = user_id.to_string();
                Ok(session)
            }
            None => {
                info!("starting new session");
                Ok(SessionState::new(session_id, user_id))
            }
        }
    }

    async fn persist(&self, session: &mut SessionState) -> Result<()> {
        session.trim_history(self.settings.history_limit);
        let record = session.to_record()?;
        let sessions = self.sessions.lock().await;
        sessions.save(&record)
    }
}
