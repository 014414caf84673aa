//! 主循环集成测试：脚本化 LLM + 桩工具

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use medlit::core::{AgentError, LoopState};
use medlit::llm::{AssistantTurn, LlmClient, LlmError, MockLlmClient, ScriptedLlmClient, ToolSpec};
use medlit::memory::{Message, Role, Session, ToolCallRequest};
use medlit::react::{react_loop, ModelInvoker, ReactEvent, ReactSession};
use medlit::tools::{ToolError, ToolExecutor, ToolRegistry};

fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "query": { "type": "string" } },
        "required": ["query"]
    })
}

fn pmid_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "pmid": { "type": "string" } },
        "required": ["pmid"]
    })
}

/// search_articles 固定返回一个 PMID；fetch_summary 按 PMID 延迟不同时间返回
fn stub_executor() -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry
        .register_fn("search_articles", "Search PubMed", query_schema(), |_args| async {
            Ok("[\"34345882\"]".to_string())
        })
        .unwrap();
    registry
        .register_fn("fetch_summary", "Fetch a summary", pmid_schema(), |args| async move {
            let pmid = args["pmid"].as_str().unwrap_or_default().to_string();
            let delay = match pmid.as_str() {
                "a" => 60,
                "b" => 30,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("summary {pmid}"))
        })
        .unwrap();
    registry
        .register_fn("fetch_abstracts", "Fetch abstracts", json!({"type": "object"}), |_args| async {
            Err(ToolError::Failed("HTTP 500 from efetch".to_string()))
        })
        .unwrap();
    ToolExecutor::new(registry, 5)
}

fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, args)
}

fn error_kind(content: &str) -> String {
    let v: Value = serde_json::from_str(content).unwrap();
    v["error"]["kind"].as_str().unwrap().to_string()
}

fn drain(mut rx: mpsc::UnboundedReceiver<ReactEvent>) -> Vec<ReactEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn test_single_tool_cycle() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        AssistantTurn::tool_calls(vec![call(
            "call_1",
            "search_articles",
            json!({"query": "covid vaccine efficacy"}),
        )]),
        AssistantTurn::text("PMID 34345882 reports high efficacy."),
    ]));
    let invoker = ModelInvoker::new(llm.clone(), "test prompt");
    let executor = stub_executor();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new());
    let mut session = Session::new();

    let result = react_loop(&rs, &mut session, "covid vaccine efficacy").await.unwrap();
    assert_eq!(result.response, "PMID 34345882 reports high efficacy.");
    assert_eq!(result.steps, 2);
    assert_eq!(session.state(), LoopState::Done);

    let msgs = session.messages();
    assert_eq!(msgs.len(), 4);
    assert_eq!(msgs[0], Message::user("covid vaccine efficacy"));
    assert!(msgs[1].has_tool_calls());
    assert_eq!(msgs[2].role, Role::Tool);
    assert_eq!(msgs[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(msgs[2].content, "[\"34345882\"]");
    assert_eq!(msgs[3].role, Role::Assistant);
    session.conversation().validate().unwrap();

    // 第二次模型调用看到 system + 完整 transcript
    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1][0].role, Role::System);
    assert_eq!(&calls[1][1..], &msgs[..3]);
}

#[tokio::test]
async fn test_results_follow_request_order() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        AssistantTurn::tool_calls(vec![
            call("c1", "fetch_summary", json!({"pmid": "a"})),
            call("c2", "fetch_summary", json!({"pmid": "b"})),
            call("c3", "fetch_summary", json!({"pmid": "c"})),
        ]),
        AssistantTurn::text("done"),
    ]));
    let invoker = ModelInvoker::new(llm, "");
    let executor = stub_executor();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new());
    let mut session = Session::new();

    react_loop(&rs, &mut session, "three summaries").await.unwrap();

    let results: Vec<(&str, &str)> = session
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.tool_call_id.as_deref().unwrap(), m.content.as_str()))
        .collect();
    assert_eq!(
        results,
        vec![("c1", "summary a"), ("c2", "summary b"), ("c3", "summary c")]
    );
}

#[tokio::test]
async fn test_tool_errors_become_results_and_loop_continues() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        AssistantTurn::tool_calls(vec![
            call("u1", "does_not_exist", json!({})),
            call("u2", "search_articles", json!({})),
            call("u3", "fetch_abstracts", json!({"pmids": ["1"]})),
        ]),
        AssistantTurn::text("recovered"),
    ]));
    let invoker = ModelInvoker::new(llm.clone(), "");
    let executor = stub_executor();
    let (tx, rx) = mpsc::unbounded_channel();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new()).with_event_tx(&tx);
    let mut session = Session::new();

    let result = react_loop(&rs, &mut session, "q").await.unwrap();
    assert_eq!(result.response, "recovered");
    assert_eq!(llm.call_count(), 2);

    let msgs = session.messages();
    assert_eq!(error_kind(&msgs[2].content), "UnknownToolError");
    assert_eq!(error_kind(&msgs[3].content), "InvalidArgumentsError");
    assert_eq!(error_kind(&msgs[4].content), "ToolExecutionError");
    session.conversation().validate().unwrap();

    let failures = drain(rx)
        .into_iter()
        .filter(|e| matches!(e, ReactEvent::ToolFailure { .. }))
        .count();
    assert_eq!(failures, 3);
}

#[tokio::test]
async fn test_tool_calls_with_text_emit_events() {
    let turn = AssistantTurn {
        content: "Let me search PubMed first.".to_string(),
        tool_calls: vec![call("s1", "search_articles", json!({"query": "covid"}))],
    };
    let llm = Arc::new(ScriptedLlmClient::new(vec![turn, AssistantTurn::text("answer")]));
    let invoker = ModelInvoker::new(llm, "");
    let executor = stub_executor();
    let (tx, rx) = mpsc::unbounded_channel();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new()).with_event_tx(&tx);
    let mut session = Session::new();

    react_loop(&rs, &mut session, "q").await.unwrap();
    assert_eq!(session.messages()[1].content, "Let me search PubMed first.");

    let events = drain(rx);
    assert!(matches!(events[0], ReactEvent::StepUpdate { step: 1, max_steps: None }));
    assert!(events
        .iter()
        .any(|e| matches!(e, ReactEvent::AssistantText { text } if text.starts_with("Let me"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, ReactEvent::ToolCall { call_id, .. } if call_id == "s1")));
    assert!(events
        .iter()
        .any(|e| matches!(e, ReactEvent::Observation { tool, .. } if tool == "search_articles")));
    assert!(matches!(events.last(), Some(ReactEvent::MessageDone)));
}

#[tokio::test]
async fn test_inference_error_propagates() {
    let llm = Arc::new(
        ScriptedLlmClient::new(vec![]).then_error(LlmError::Api("503 Service Unavailable".into())),
    );
    let invoker = ModelInvoker::new(llm, "");
    let executor = stub_executor();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new());
    let mut session = Session::new();

    let err = react_loop(&rs, &mut session, "q").await.unwrap_err();
    assert!(matches!(err, AgentError::Inference(LlmError::Api(_))));
    assert_eq!(err.kind(), "InferenceError");
    assert_eq!(session.state(), LoopState::Failed);
    assert_eq!(session.messages(), &[Message::user("q")]);
}

#[tokio::test]
async fn test_mock_llm_replay_is_identical() {
    let executor = stub_executor();
    let invoker = ModelInvoker::new(Arc::new(MockLlmClient), "");
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new());

    let mut first = Session::new();
    let mut second = Session::new();
    let a = react_loop(&rs, &mut first, "covid vaccine efficacy").await.unwrap();
    let b = react_loop(&rs, &mut second, "covid vaccine efficacy").await.unwrap();

    assert_eq!(a, b);
    assert_eq!(first.messages(), second.messages());
}

#[tokio::test]
async fn test_follow_up_query_sees_history() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        AssistantTurn::text("first"),
        AssistantTurn::text("second"),
    ]));
    let invoker = ModelInvoker::new(llm.clone(), "");
    let executor = stub_executor();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new());
    let mut session = Session::new();

    react_loop(&rs, &mut session, "q1").await.unwrap();
    react_loop(&rs, &mut session, "q2").await.unwrap();

    assert_eq!(session.messages().len(), 4);
    let calls = llm.calls();
    assert_eq!(calls[1].len(), 3);
    assert_eq!(calls[1][1], Message::assistant("first"));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let llm = Arc::new(ScriptedLlmClient::new(vec![AssistantTurn::text("unused")]));
    let invoker = ModelInvoker::new(llm.clone(), "");
    let executor = stub_executor();
    let token = CancellationToken::new();
    token.cancel();
    let rs = ReactSession::new(&invoker, &executor, token);
    let mut session = Session::new();

    let err = react_loop(&rs, &mut session, "q").await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(session.state(), LoopState::Cancelled);
    assert_eq!(llm.call_count(), 0);
    session.conversation().validate().unwrap();
}

#[tokio::test]
async fn test_cancel_during_dispatch_keeps_transcript_valid() {
    let token = CancellationToken::new();
    let mut registry = ToolRegistry::new();
    let t = token.clone();
    registry
        .register_fn("search_articles", "Search", query_schema(), move |_args| {
            let t = t.clone();
            async move {
                t.cancel();
                Ok("[]".to_string())
            }
        })
        .unwrap();
    let executor = ToolExecutor::new(registry, 5);
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        AssistantTurn::tool_calls(vec![call("k1", "search_articles", json!({"query": "x"}))]),
        AssistantTurn::text("never reached"),
    ]));
    let invoker = ModelInvoker::new(llm.clone(), "");
    let rs = ReactSession::new(&invoker, &executor, token);
    let mut session = Session::new();

    let err = react_loop(&rs, &mut session, "q").await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(llm.call_count(), 1);
    assert_eq!(session.messages().len(), 3);
    assert_eq!(session.messages()[2].tool_call_id.as_deref(), Some("k1"));
    session.conversation().validate().unwrap();
}

struct HangingLlm;

#[async_trait::async_trait]
impl LlmClient for HangingLlm {
    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_cancel_interrupts_pending_model_call() {
    let invoker = ModelInvoker::new(Arc::new(HangingLlm), "");
    let executor = stub_executor();
    let token = CancellationToken::new();
    let rs = ReactSession::new(&invoker, &executor, token.clone());
    let mut session = Session::new();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let err = tokio::time::timeout(Duration::from_secs(5), react_loop(&rs, &mut session, "q"))
        .await
        .expect("loop should stop after cancellation")
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(session.state(), LoopState::Cancelled);
    assert_eq!(session.messages(), &[Message::user("q")]);
}

#[tokio::test]
async fn test_step_limit() {
    let looping = || {
        AssistantTurn::tool_calls(vec![call("", "search_articles", json!({"query": "again"}))])
    };
    let llm = Arc::new(ScriptedLlmClient::new(vec![looping(), looping(), looping()]));
    let invoker = ModelInvoker::new(llm.clone(), "");
    let executor = stub_executor();
    let rs = ReactSession::new(&invoker, &executor, CancellationToken::new()).with_max_steps(Some(2));
    let mut session = Session::new();

    let err = react_loop(&rs, &mut session, "q").await.unwrap_err();
    assert!(matches!(err, AgentError::StepLimit(2)));
    assert_eq!(llm.call_count(), 2);
    assert_eq!(session.state(), LoopState::Failed);
    // 空 id 被补齐为轮内唯一 id，transcript 仍然配对完整
    assert_eq!(session.messages().len(), 5);
    session.conversation().validate().unwrap();
}
