use std::sync::Arc;

use taskling_agent::AgentRuntime;
use taskling_common::{Error, Result};
use tracing::info;

use crate::router::build_router;

/// Owns the listening socket and serves the webhook router.
pub struct GatewayServer {
    bind: String,
    runtime: Arc<AgentRuntime>,
}

impl GatewayServer {
    pub fn new(bind: impl Into<String>, runtime: Arc<AgentRuntime>) -> Self {
        Self {
            bind: bind.into(),
            runtime,
        }
    }

    /// Serve until the process is stopped.
    pub async fn serve(self) -> Result<()> {
        let app = build_router(self.runtime);

        let listener = tokio::net::TcpListener::bind(&self.bind)
            .await
            .map_err(|e| Error::Config(format!("failed to bind {}: {e}", self.bind)))?;
        info!("gateway listening on {}", self.bind);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Agent(format!("server error: {e}")))
    }
}
