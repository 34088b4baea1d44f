//! Oracle Session
//!
//! Per-instance access to the reasoning oracle. A single `chat` call may
//! expand into a short tool sub-dialogue: when the model asks for a tool, the
//! session runs it, feeds the result back, and asks again, until the model
//! answers in text or the round budget runs out. Callers only see the final
//! text.

use std::path::PathBuf;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use assertflip_core::{ProgressCounter, ProgressTracker};
use assertflip_llm::{
    estimate_message_tokens, send_with_retry, CostCalculator, LlmProvider, LlmRequestOptions,
    LlmResponse, Message, ResponseFormat, RetryPolicy, TokenRateLimiter, ToolCallMode,
    ToolDefinition,
};
use assertflip_tools::{ToolContext, ToolRegistry};

/// Upper bound on tool rounds within one `chat` call
pub const MAX_TOOL_ROUNDS: usize = 8;

// ============================================================================
// Conversation
// ============================================================================

/// System instruction plus the ordered user/assistant turns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    pub system: String,
    pub turns: Vec<Message>,
}

impl Conversation {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            turns: vec![Message::user(user)],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.turns.push(message);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Message::assistant(text));
    }

    /// Keep the first user turn and the latest turn only.
    pub fn trim(&mut self) {
        if self.turns.len() > 2 {
            let last = self.turns.pop();
            self.turns.truncate(1);
            self.turns.extend(last);
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ============================================================================
// Shared client
// ============================================================================

/// Oracle resources shared by every instance of a run.
#[derive(Clone)]
pub struct OracleClient {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    retry: RetryPolicy,
    limiter: Arc<TokenRateLimiter>,
    pricing: Arc<CostCalculator>,
    progress: Arc<ProgressTracker>,
    source_root: PathBuf,
    max_tool_rounds: usize,
}

impl OracleClient {
    pub fn new(provider: Arc<dyn LlmProvider>, progress: Arc<ProgressTracker>) -> Self {
        Self {
            provider,
            tools: Arc::new(ToolRegistry::new()),
            retry: RetryPolicy::default(),
            limiter: Arc::new(TokenRateLimiter::per_minute(0)),
            pricing: Arc::new(CostCalculator::new()),
            progress,
            source_root: PathBuf::from("."),
            max_tool_rounds: MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry, source_root: impl Into<PathBuf>) -> Self {
        self.tools = Arc::new(tools);
        self.source_root = source_root.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<TokenRateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_pricing(mut self, pricing: CostCalculator) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Open a session for one instance.
    pub fn session(&self, instance_id: impl Into<String>) -> OracleSession {
        let instance_id = instance_id.into();
        OracleSession {
            client: self.clone(),
            tool_context: ToolContext::new(instance_id.clone(), self.source_root.clone()),
            instance_id,
            spent: 0.0,
        }
    }
}

// ============================================================================
// Per-instance session
// ============================================================================

pub struct OracleSession {
    client: OracleClient,
    instance_id: String,
    tool_context: ToolContext,
    spent: f64,
}

impl OracleSession {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Dollars spent by this instance so far
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Ask for a free-text reply, resolving tool calls along the way.
    ///
    /// Returns `None` when the oracle gave no usable reply.
    pub async fn chat(&mut self, conversation: &Conversation, offer_tools: bool) -> Option<String> {
        let tools: Vec<ToolDefinition> = if offer_tools && self.client.provider.supports_tools() {
            self.client.tools.definitions()
        } else {
            Vec::new()
        };
        let options = LlmRequestOptions {
            tool_call_mode: if tools.is_empty() {
                ToolCallMode::None
            } else {
                ToolCallMode::Auto
            },
            ..Default::default()
        };

        let tag = self.instance_id.clone();
        let mut messages = conversation.turns.clone();
        for round in 0..=self.client.max_tool_rounds {
            let response = self
                .send(&messages, &conversation.system, &tools, &options, &tag)
                .await?;

            if !response.has_tool_calls() {
                return response.non_empty_content().map(String::from);
            }
            if round == self.client.max_tool_rounds {
                tracing::warn!(
                    "[oracle:tools] {} exceeded {} tool rounds",
                    tag,
                    self.client.max_tool_rounds
                );
                return response.non_empty_content().map(String::from);
            }

            messages.push(Message::assistant_with_tool_calls(
                response.content.clone(),
                &response.tool_calls,
            ));
            for call in &response.tool_calls {
                tracing::debug!("[tool:{}] {} args={}", call.name, tag, call.arguments);
                let result = self
                    .client
                    .tools
                    .execute(&call.name, &self.tool_context, call.arguments.clone())
                    .await;
                messages.push(Message::tool_result(
                    call.id.clone(),
                    result.to_content(),
                    !result.success,
                ));
            }
        }
        None
    }

    /// Ask for a structured judgement conforming to `T`'s schema.
    ///
    /// No tools are offered. Returns `None` when there is no reply or the
    /// reply does not parse as `T`.
    pub async fn judge<T>(&mut self, conversation: &Conversation, schema_name: &str) -> Option<T>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T)).ok()?;
        let options = LlmRequestOptions {
            tool_call_mode: ToolCallMode::None,
            response_format: if self.client.provider.supports_structured_output() {
                Some(ResponseFormat {
                    name: schema_name.to_string(),
                    schema,
                    strict: false,
                })
            } else {
                None
            },
            ..Default::default()
        };

        let tag = format!("{}-validation", self.instance_id);
        let response = self
            .send(&conversation.turns, &conversation.system, &[], &options, &tag)
            .await?;
        let content = response.non_empty_content()?;
        match parse_judgement::<T>(content) {
            Some(value) => Some(value),
            None => {
                tracing::warn!("[oracle] {} unparseable judgement", tag);
                None
            }
        }
    }

    async fn send(
        &mut self,
        messages: &[Message],
        system: &str,
        tools: &[ToolDefinition],
        options: &LlmRequestOptions,
        tag: &str,
    ) -> Option<LlmResponse> {
        let system = Some(system).filter(|s| !s.is_empty());
        let estimate = estimate_message_tokens(messages, system) as u64;
        self.client.limiter.acquire(estimate).await;

        let progress = self.client.progress.clone();
        let result = send_with_retry(
            self.client.provider.as_ref(),
            messages,
            system,
            tools,
            options,
            &self.client.retry,
            |_, _, _| progress.inc(ProgressCounter::Retried),
        )
        .await;

        match result {
            Ok(response) => {
                let model = if response.model.is_empty() {
                    self.client.provider.model()
                } else {
                    response.model.as_str()
                };
                let cost = self.client.pricing.cost_usd(model, &response.usage);
                self.spent += cost;
                self.client.progress.add_cost(cost);
                tracing::debug!(
                    "[oracle] {} tokens in={} out={} cost=${:.4}",
                    tag,
                    response.usage.input_tokens,
                    response.usage.output_tokens,
                    cost
                );
                Some(response)
            }
            Err(e) => {
                tracing::warn!("[oracle] {} no response: {}", tag, e);
                None
            }
        }
    }
}

/// Parse a JSON judgement, tolerating prose or fences around the object.
fn parse_judgement<T: DeserializeOwned>(content: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str(content.trim()) {
        return Some(value);
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertflip_llm::{LlmError, LlmResult, ProviderConfig, ToolCall, UsageStats};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<LlmResult<LlmResponse>>>,
        seen: Mutex<Vec<(Vec<Message>, usize, LlmRequestOptions)>>,
        config: ProviderConfig,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<LlmResult<LlmResponse>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
                config: ProviderConfig::default(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "gpt-4o"
        }

        async fn send_message(
            &self,
            messages: Vec<Message>,
            _system: Option<String>,
            tools: Vec<ToolDefinition>,
            request_options: LlmRequestOptions,
        ) -> LlmResult<LlmResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((messages, tools.len(), request_options));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LlmResponse::text("", "gpt-4o")))
        }

        fn config(&self) -> &ProviderConfig {
            &self.config
        }
    }

    fn tool_call(name: &str) -> LlmResponse {
        let mut response = LlmResponse::text("", "gpt-4o");
        response.content = None;
        response.tool_calls = vec![ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: serde_json::json!({"name": "f", "path": "missing.py"}),
        }];
        response
    }

    fn client(provider: Arc<ScriptedProvider>) -> (OracleClient, Arc<ProgressTracker>) {
        let progress = Arc::new(ProgressTracker::new(1));
        let client = OracleClient::new(provider, progress.clone())
            .with_tools(assertflip_tools::default_registry(), "/nonexistent")
            .with_retry_policy(RetryPolicy::new(0, 1));
        (client, progress)
    }

    #[test]
    fn test_conversation_trim() {
        let mut conv = Conversation::new("sys", "first");
        conv.push_assistant("a1");
        conv.push_user("fix it");
        conv.push_assistant("a2");
        conv.trim();
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns[0].text_content(), "first");
        assert_eq!(conv.turns[1].text_content(), "a2");
        assert_eq!(conv.system, "sys");
    }

    #[tokio::test]
    async fn test_chat_resolves_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call("get_info")),
            Ok(tool_call("no_such_tool")),
            Ok(LlmResponse::text("done", "gpt-4o")),
        ]));
        let (client, _) = client(provider.clone());
        let mut session = client.session("inst-1");

        let reply = session.chat(&Conversation::new("s", "u"), true).await;
        assert_eq!(reply.as_deref(), Some("done"));

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].1, 1);
        // user, assistant(tool call), tool result
        assert_eq!(seen[1].0.len(), 3);
        let last = seen[2].0.last().unwrap();
        match &last.content[0] {
            assertflip_llm::MessageContent::ToolResult { content, is_error, .. } => {
                assert!(content.contains("Unknown tool: no_such_tool"));
                assert_eq!(*is_error, Some(true));
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_stops_after_tool_budget() {
        let replies = (0..=MAX_TOOL_ROUNDS).map(|_| Ok(tool_call("get_info"))).collect();
        let provider = Arc::new(ScriptedProvider::new(replies));
        let (client, _) = client(provider.clone());
        let mut session = client.session("inst-1");

        let reply = session.chat(&Conversation::new("s", "u"), true).await;
        assert!(reply.is_none());
        assert_eq!(provider.seen.lock().unwrap().len(), MAX_TOOL_ROUNDS + 1);
    }

    #[tokio::test]
    async fn test_chat_error_is_no_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            LlmError::AuthenticationFailed {
                message: "bad key".into(),
            },
        )]));
        let (client, _) = client(provider);
        let mut session = client.session("inst-1");
        assert!(session.chat(&Conversation::new("s", "u"), false).await.is_none());
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Judgement {
        reason: String,
        revealing: bool,
    }

    #[tokio::test]
    async fn test_judge_parses_and_costs() {
        let mut reply =
            LlmResponse::text(r#"{"reason": "matches ticket", "revealing": true}"#, "gpt-4o");
        reply.usage = UsageStats {
            input_tokens: 1_000_000,
            output_tokens: 0,
        };
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(reply)]));
        let (client, progress) = client(provider.clone());
        let mut session = client.session("inst-1");

        let judgement: Judgement = session
            .judge(&Conversation::new("s", "u"), "ValidationResult")
            .await
            .unwrap();
        assert!(judgement.revealing);
        assert_eq!(judgement.reason, "matches ticket");
        assert!((session.spent() - 2.5).abs() < 1e-9);
        assert!((progress.total_cost() - 2.5).abs() < 1e-6);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].1, 0);
        assert!(seen[0].2.response_format.is_some());
    }

    #[test]
    fn test_parse_judgement_tolerates_prose() {
        let parsed: Judgement =
            parse_judgement("Here you go:\n```json\n{\"reason\": \"r\", \"revealing\": false}\n```")
                .unwrap();
        assert!(!parsed.revealing);
        assert!(parse_judgement::<Judgement>("not json").is_none());
    }
}
