//! Conversation orchestrator: drives the inference/tool loop for one Slack
//! thread and always comes back with something postable.
//!
//! The loop is iterative. State lives in `OrchestrationState` and every turn
//! appends to it; there is no recursive call chain and no shared mutable
//! history between conversations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quarry_provider::{ContentBlock, LlmMessage, LlmProvider, LlmRequest, ToolDef};

use crate::tool::ToolDispatcher;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
const CONTINUE_PROMPT: &str = "Please continue.";
const FINAL_ANSWER_PROMPT: &str =
    "Please answer now using the information you have already gathered, without calling any more tools.";
const APOLOGY: &str = "Sorry, an error occurred while generating the response.";
const BUDGET_EXCEEDED: &str =
    "Sorry, the response took too long to generate. Please try again.";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    /// Tool rounds and forced continuations share this counter.
    pub max_recursion_depth: u32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
    /// Wall-clock ceiling for a whole conversation, tool calls included.
    pub conversation_budget: Duration,
    pub system_prompt: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: quarry_provider::bedrock::DEFAULT_MODEL.into(),
            max_recursion_depth: 5,
            max_tokens: 300,
            top_p: 0.1,
            temperature: 0.3,
            conversation_budget: Duration::from_secs(300),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

/// Accumulated conversation for one orchestration run.
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    pub messages: Vec<LlmMessage>,
    pub depth: u32,
}

impl OrchestrationState {
    pub fn new(messages: Vec<LlmMessage>) -> Self {
        Self { messages, depth: 0 }
    }

    /// Append one assistant turn with tool requests and the user turn with
    /// its results.
    fn push_tool_round(&mut self, assistant: Vec<ContentBlock>, results: Vec<ContentBlock>) {
        self.messages.push(LlmMessage {
            role: "assistant".into(),
            content: assistant,
        });
        self.messages.push(LlmMessage {
            role: "user".into(),
            content: results,
        });
        self.depth += 1;
    }

    /// Append a truncated assistant turn plus a continue nudge.
    fn push_continuation(&mut self, assistant: Vec<ContentBlock>) {
        self.messages.push(LlmMessage {
            role: "assistant".into(),
            content: assistant,
        });
        self.messages.push(LlmMessage::user(CONTINUE_PROMPT));
        self.depth += 1;
    }
}

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolDispatcher>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolDispatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Run one conversation to completion. Never fails: provider errors,
    /// tool transport errors and budget expiry all come back as user-facing
    /// text.
    pub async fn converse(&self, context: Vec<LlmMessage>) -> String {
        match tokio::time::timeout(self.config.conversation_budget, self.run(context)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "orchestration failed");
                APOLOGY.to_string()
            }
            Err(_) => {
                tracing::warn!(
                    budget_secs = self.config.conversation_budget.as_secs(),
                    "conversation exceeded wall-clock budget"
                );
                BUDGET_EXCEEDED.to_string()
            }
        }
    }

    async fn run(&self, context: Vec<LlmMessage>) -> Result<String> {
        let tool_defs = self.tools.tool_defs();
        let system = self.system_prompt(&tool_defs);
        let mut state = OrchestrationState::new(context);

        while state.depth < self.config.max_recursion_depth {
            let resp = self
                .provider
                .chat(self.request(&state, &system, tool_defs.clone()))
                .await?;

            match resp.stop_reason() {
                "end_turn" | "stop_sequence" => return Ok(resp.text),
                "tool_use" => {
                    let tool_uses: Vec<(String, String, serde_json::Value)> = resp
                        .content
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::ToolUse { id, name, input } => {
                                Some((id.clone(), name.clone(), input.clone()))
                            }
                            _ => None,
                        })
                        .collect();
                    if tool_uses.is_empty() {
                        // Claimed tool_use without any tool_use block.
                        return Ok(resp.text);
                    }
                    let results = self.invoke_all(tool_uses).await;
                    state.push_tool_round(resp.content, results);
                }
                "max_tokens" => {
                    tracing::debug!(depth = state.depth, "response truncated, continuing");
                    state.push_continuation(resp.content);
                }
                other => {
                    tracing::warn!(stop_reason = other, "unexpected stop reason");
                    let note = format!("\n\n(The response ended unexpectedly: {other}.)");
                    return Ok(format!("{}{}", resp.text, note));
                }
            }
        }

        // Depth cap reached. One last call, no tools, so the user still gets
        // an answer built from whatever the tools returned so far.
        tracing::warn!(
            depth = state.depth,
            "recursion limit reached, requesting final answer without tools"
        );
        state.messages.push(LlmMessage::user(FINAL_ANSWER_PROMPT));
        let resp = self
            .provider
            .chat(self.request(&state, &system, Vec::new()))
            .await?;
        Ok(resp.text)
    }

    fn request(
        &self,
        state: &OrchestrationState,
        system: &str,
        tools: Vec<ToolDef>,
    ) -> LlmRequest {
        LlmRequest {
            model: self.config.model.clone(),
            system: Some(system.to_string()),
            messages: state.messages.clone(),
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            temperature: self.config.temperature,
            tools,
        }
    }

    fn system_prompt(&self, tool_defs: &[ToolDef]) -> String {
        if tool_defs.is_empty() {
            return self.config.system_prompt.clone();
        }
        let listing = tool_defs
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n\nYou have access to the following tools:\n{}",
            self.config.system_prompt, listing
        )
    }

    /// One result per requested tool, in request order, keyed by the
    /// tool_use_id the model chose.
    async fn invoke_all(
        &self,
        tool_uses: Vec<(String, String, serde_json::Value)>,
    ) -> Vec<ContentBlock> {
        let futures: Vec<_> = tool_uses
            .into_iter()
            .map(|(id, name, input)| async move {
                let invocation = self.tools.invoke(&name, input).await;
                ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: invocation.content.clone(),
                    is_error: invocation.is_error(),
                }
            })
            .collect();
        futures::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{NoTools, ToolInvocation};
    use async_trait::async_trait;
    use quarry_provider::LlmResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of responses and records every request.
    struct ScriptedProvider {
        responses: Mutex<Vec<LlmResponse>>,
        requests: Mutex<Vec<LlmRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<LlmResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn request(&self, index: usize) -> LlmRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct EchoDispatcher {
        invoked: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl EchoDispatcher {
        fn new() -> Self {
            Self {
                invoked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolDispatcher for EchoDispatcher {
        fn tool_defs(&self) -> Vec<ToolDef> {
            vec![ToolDef {
                name: "time_get_current_time".into(),
                description: "[time] Get the current time".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }

        async fn invoke(&self, name: &str, input: serde_json::Value) -> ToolInvocation {
            self.invoked
                .lock()
                .unwrap()
                .push((name.to_string(), input.clone()));
            if name == "time_get_current_time" {
                ToolInvocation::success("2024-01-01T00:00:00Z")
            } else {
                ToolInvocation::error(format!("unknown tool: {name}"))
            }
        }
    }

    fn text_response(text: &str, stop_reason: &str) -> LlmResponse {
        LlmResponse {
            text: text.into(),
            content: vec![ContentBlock::Text { text: text.into() }],
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some(stop_reason.into()),
        }
    }

    fn tool_use_response(id: &str, name: &str, input: serde_json::Value) -> LlmResponse {
        LlmResponse {
            text: String::new(),
            content: vec![ContentBlock::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            }],
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("tool_use".into()),
        }
    }

    fn orchestrator(
        provider: Arc<ScriptedProvider>,
        tools: Arc<dyn ToolDispatcher>,
        config: OrchestratorConfig,
    ) -> Orchestrator {
        Orchestrator::new(provider, tools, config)
    }

    #[tokio::test]
    async fn end_turn_returns_text_after_one_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "hello there",
            "end_turn",
        )]));
        let orch = orchestrator(
            provider.clone(),
            Arc::new(NoTools),
            OrchestratorConfig::default(),
        );
        let answer = orch.converse(vec![LlmMessage::user("hi")]).await;
        assert_eq!(answer, "hello there");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_round_feeds_result_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_use_response(
                "tooluse_1",
                "time_get_current_time",
                serde_json::json!({"timezone": "UTC"}),
            ),
            text_response("It is midnight UTC.", "end_turn"),
        ]));
        let tools = Arc::new(EchoDispatcher::new());
        let orch = orchestrator(provider.clone(), tools.clone(), OrchestratorConfig::default());

        let answer = orch.converse(vec![LlmMessage::user("what time is it?")]).await;
        assert_eq!(answer, "It is midnight UTC.");
        assert_eq!(provider.call_count(), 2);

        let invoked = tools.invoked.lock().unwrap();
        assert_eq!(invoked.len(), 1);
        assert_eq!(invoked[0].0, "time_get_current_time");

        // Second request carries the assistant tool_use turn and the matched result.
        let second = provider.request(1);
        let assistant = &second.messages[second.messages.len() - 2];
        assert_eq!(assistant.role, "assistant");
        assert_eq!(assistant.tool_uses().len(), 1);
        let results = &second.messages[second.messages.len() - 1];
        assert_eq!(results.role, "user");
        assert!(matches!(
            &results.content[0],
            ContentBlock::ToolResult { tool_use_id, is_error, .. }
                if tool_use_id == "tooluse_1" && !*is_error
        ));
    }

    #[tokio::test]
    async fn multiple_tool_uses_get_results_in_request_order() {
        let first = LlmResponse {
            text: String::new(),
            content: vec![
                ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "time_get_current_time".into(),
                    input: serde_json::json!({}),
                },
                ContentBlock::ToolUse {
                    id: "t2".into(),
                    name: "not_a_tool".into(),
                    input: serde_json::json!({}),
                },
            ],
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("tool_use".into()),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            first,
            text_response("done", "end_turn"),
        ]));
        let orch = orchestrator(
            provider.clone(),
            Arc::new(EchoDispatcher::new()),
            OrchestratorConfig::default(),
        );
        let answer = orch.converse(vec![LlmMessage::user("go")]).await;
        assert_eq!(answer, "done");

        let second = provider.request(1);
        let results = &second.messages[second.messages.len() - 1];
        match (&results.content[0], &results.content[1]) {
            (
                ContentBlock::ToolResult {
                    tool_use_id: a,
                    is_error: ea,
                    ..
                },
                ContentBlock::ToolResult {
                    tool_use_id: b,
                    is_error: eb,
                    ..
                },
            ) => {
                assert_eq!(a, "t1");
                assert!(!*ea);
                assert_eq!(b, "t2");
                assert!(*eb, "unknown tool must come back as an error result");
            }
            other => panic!("expected two tool results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recursion_cap_forces_final_call_without_tools() {
        let always_tools = (0..2)
            .map(|i| {
                tool_use_response(
                    &format!("t{i}"),
                    "time_get_current_time",
                    serde_json::json!({}),
                )
            })
            .chain(std::iter::once(text_response(
                "best effort answer",
                "end_turn",
            )))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(always_tools));
        let config = OrchestratorConfig {
            max_recursion_depth: 2,
            ..Default::default()
        };
        let orch = orchestrator(provider.clone(), Arc::new(EchoDispatcher::new()), config);

        let answer = orch.converse(vec![LlmMessage::user("loop forever")]).await;
        assert_eq!(answer, "best effort answer");
        // limit + 1 inference calls, no more
        assert_eq!(provider.call_count(), 3);
        let final_req = provider.request(2);
        assert!(final_req.tools.is_empty());
        let nudge = final_req.messages.last().unwrap();
        assert_eq!(nudge.role, "user");
        assert!(nudge.text().contains("without calling any more tools"));
    }

    #[tokio::test]
    async fn max_tokens_appends_continue_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("first half", "max_tokens"),
            text_response("second half", "end_turn"),
        ]));
        let orch = orchestrator(
            provider.clone(),
            Arc::new(NoTools),
            OrchestratorConfig::default(),
        );
        let answer = orch.converse(vec![LlmMessage::user("long story")]).await;
        assert_eq!(answer, "second half");

        let second = provider.request(1);
        let tail = second.messages.last().unwrap();
        assert_eq!(tail.role, "user");
        assert_eq!(tail.text(), CONTINUE_PROMPT);
        let partial = &second.messages[second.messages.len() - 2];
        assert_eq!(partial.role, "assistant");
        assert_eq!(partial.text(), "first half");
    }

    #[tokio::test]
    async fn unknown_stop_reason_returns_text_with_note() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "partial",
            "guardrail_intervened",
        )]));
        let orch = orchestrator(
            provider.clone(),
            Arc::new(NoTools),
            OrchestratorConfig::default(),
        );
        let answer = orch.converse(vec![LlmMessage::user("hi")]).await;
        assert!(answer.starts_with("partial"));
        assert!(answer.contains("guardrail_intervened"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_error_becomes_apology() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let orch = orchestrator(
            provider.clone(),
            Arc::new(NoTools),
            OrchestratorConfig::default(),
        );
        let answer = orch.converse(vec![LlmMessage::user("hi")]).await;
        assert_eq!(answer, APOLOGY);
    }

    #[tokio::test]
    async fn budget_expiry_becomes_timeout_message() {
        struct SlowProvider;

        #[async_trait]
        impl LlmProvider for SlowProvider {
            async fn chat(&self, _request: LlmRequest) -> Result<LlmResponse> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(LlmResponse {
                    text: "too late".into(),
                    content: vec![],
                    input_tokens: None,
                    output_tokens: None,
                    stop_reason: Some("end_turn".into()),
                })
            }
        }

        let config = OrchestratorConfig {
            conversation_budget: Duration::from_millis(20),
            ..Default::default()
        };
        let orch = Orchestrator::new(Arc::new(SlowProvider), Arc::new(NoTools), config);
        let answer = orch.converse(vec![LlmMessage::user("hi")]).await;
        assert_eq!(answer, BUDGET_EXCEEDED);
    }

    #[tokio::test]
    async fn system_prompt_lists_registered_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "ok", "end_turn",
        )]));
        let orch = orchestrator(
            provider.clone(),
            Arc::new(EchoDispatcher::new()),
            OrchestratorConfig::default(),
        );
        orch.converse(vec![LlmMessage::user("hi")]).await;
        let first = provider.request(0);
        let system = first.system.unwrap();
        assert!(system.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(system.contains("time_get_current_time"));
    }
}
