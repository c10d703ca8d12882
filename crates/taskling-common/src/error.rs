use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type shared across all Taskling crates.
///
/// The first three variants are "domain" errors: tools encode them into
/// their result text so the conversation keeps going. The rest are
/// infrastructure errors that the execution loop catches at its outer
/// boundary and degrades into an apology reply.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad tool arguments (e.g. an unparseable date expression).
    #[error("validation error: {0}")]
    Validation(String),

    /// Reference to something that does not exist (e.g. an unknown task number).
    #[error("not found: {0}")]
    NotFound(String),

    /// Recoverable upstream hiccup (network, rate limit). Retried once.
    #[error("transient error: {0}")]
    Transient(String),

    /// SQLite / storage failure. Never retried by the loop.
    #[error("database error: {0}")]
    Database(String),

    /// Agent-level failure (provider misbehavior, malformed response).
    #[error("agent error: {0}")]
    Agent(String),

    /// Configuration problem detected at startup.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Domain errors are surfaced to the model as tool-result text;
    /// everything else aborts the turn.
    pub fn is_domain(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }

    /// Transient errors get exactly one retry at the gateway.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_classification() {
        assert!(Error::Validation("bad date".into()).is_domain());
        assert!(Error::NotFound("task #5".into()).is_domain());
        assert!(!Error::Database("locked".into()).is_domain());
        assert!(!Error::Transient("timeout".into()).is_domain());
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Transient("503".into()).is_transient());
        assert!(!Error::Agent("bad json".into()).is_transient());
    }
}
