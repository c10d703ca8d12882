use std::sync::Arc;

use taskling_common::Result;
use tracing::warn;

use crate::providers::{
    ChatMessage, ContentBlock, LlmProvider, LlmRequest, ToolDefinition, extract_text,
};

/// One requested tool invocation from the model.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What the model decided to do with the conversation so far.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    FinalReply(String),
    ToolRequests(Vec<ToolRequest>),
}

/// Wraps a provider behind the loop's single contract: history in, one
/// classified turn out. Holds no conversation state of its own.
pub struct ModelGateway {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 1024,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One model call. A transient failure is retried exactly once; a second
    /// failure surfaces so the caller can degrade to an apology.
    pub async fn advance(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelTurn> {
        let request = LlmRequest {
            model: self.model.clone(),
            messages: history.to_vec(),
            system: Some(system.to_string()),
            max_tokens: Some(self.max_tokens),
            temperature: None,
            tools: tools.to_vec(),
        };

        let response = match self.provider.complete(&request).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                warn!("model call failed, retrying once: {e}");
                self.provider.complete(&request).await?
            }
            Err(e) => return Err(e),
        };

        let requests: Vec<ToolRequest> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolRequest {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect();

        if requests.is_empty() {
            Ok(ModelTurn::FinalReply(extract_text(&response.content)))
        } else {
            Ok(ModelTurn::ToolRequests(requests))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LlmResponse, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taskling_common::Error;

    struct FlakyProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn provider_id(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(Error::Transient("connection reset".to_string()));
            }
            Ok(LlmResponse {
                content: vec![ContentBlock::Text {
                    text: "hello".to_string(),
                }],
                model: "flaky".to_string(),
                usage: None::<Usage>,
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let gateway = ModelGateway::new(provider.clone(), "m");

        let turn = gateway.advance("sys", &[], &[]).await.expect("retry succeeds");
        assert!(matches!(turn, ModelTurn::FinalReply(ref t) if t == "hello"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_surfaces() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let gateway = ModelGateway::new(provider.clone(), "m");

        let err = gateway.advance("sys", &[], &[]).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
