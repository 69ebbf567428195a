use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tabchat::api::{ByteStream, ChatProvider, ChatRequest};
use tabchat::history::{HistoryStore, MemoryStorage, SessionStorage};
use tabchat::models::{Message, Role};
use tabchat::tools::{Browser, BrowserActions, ToolExecutor};
use tabchat::{
    ChatEvent, ChatInput, EngineError, EngineSettings, Orchestrator, PageContext, Result,
};
use tokio::sync::mpsc;

enum Round {
    Stream(Vec<Result<Bytes>>),
    Fail(EngineError),
}

struct ScriptedProvider {
    rounds: Mutex<VecDeque<Round>>,
    requests: Mutex<Vec<Value>>,
    ready: bool,
}

impl ScriptedProvider {
    fn new(rounds: Vec<Round>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
            ready: true,
        })
    }

    fn without_credentials() -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            ready: false,
        })
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(EngineError::ConfigError("Configure your API key".into()))
        }
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(request).unwrap());
        match self.rounds.lock().unwrap().pop_front() {
            Some(Round::Stream(chunks)) => Ok(stream::iter(chunks).boxed()),
            Some(Round::Fail(e)) => Err(e),
            None => Err(EngineError::Other("script exhausted".into())),
        }
    }
}

#[derive(Default)]
struct RecordingBrowser {
    opened: Mutex<Vec<String>>,
}

#[async_trait]
impl Browser for RecordingBrowser {
    async fn open_tab(&self, url: &str) -> std::result::Result<(), String> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn close_tab(&self, _session_id: &str) -> std::result::Result<(), String> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    fn definitions(&self) -> Vec<Value> {
        Vec::new()
    }

    async fn execute(&self, _session_id: &str, name: &str, arguments: &Value) -> Value {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        json!({ "status": "ok" })
    }
}

fn sse(payloads: &[Value]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str(&format!("data: {}\n\n", payload));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn text_delta(text: &str) -> Value {
    json!({"choices": [{"delta": {"content": text}}]})
}

fn tool_delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> Value {
    let mut function = json!({});
    if let Some(name) = name {
        function["name"] = json!(name);
    }
    if let Some(args) = args {
        function["arguments"] = json!(args);
    }
    let mut call = json!({"index": index, "function": function});
    if let Some(id) = id {
        call["id"] = json!(id);
    }
    json!({"choices": [{"delta": {"tool_calls": [call]}}]})
}

/// Split the body into small chunks to exercise line buffering.
fn round(body: String) -> Round {
    let chunks = body
        .into_bytes()
        .chunks(11)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Round::Stream(chunks)
}

fn input(text: &str) -> ChatInput {
    ChatInput {
        session_id: "tab-42".into(),
        text: text.into(),
        page: PageContext {
            title: "Example Domain".into(),
            url: "https://example.com".into(),
        },
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn settings(max_loops: usize) -> EngineSettings {
    EngineSettings {
        max_loops,
        ..EngineSettings::default()
    }
}

#[tokio::test]
async fn plain_answer_completes_in_one_round() {
    let provider = ScriptedProvider::new(vec![round(sse(&[
        text_delta("An API is "),
        text_delta("an interface."),
    ]))]);
    let executor = Arc::new(BrowserActions::new(Arc::new(RecordingBrowser::default())));
    let orchestrator = Orchestrator::new(provider.clone(), executor, settings(4));
    let history = HistoryStore::in_memory();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = orchestrator
        .run(&history, &input("What's an API?"), &tx)
        .await
        .unwrap();

    assert_eq!(outcome.reply, "An API is an interface.");
    assert_eq!(outcome.rounds, 1);
    assert!(!outcome.exhausted);
    assert_eq!(provider.requests().len(), 1);

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            ChatEvent::Chunk("An API is ".into()),
            ChatEvent::Chunk("an interface.".into()),
            ChatEvent::Done,
        ]
    );

    let saved = history.load("tab-42").unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0], Message::user("What's an API?"));
    assert_eq!(saved[1], Message::assistant("An API is an interface."));
}

#[tokio::test]
async fn request_carries_system_context_tools_and_stream_flag() {
    let provider = ScriptedProvider::new(vec![round(sse(&[text_delta("hi")]))]);
    let executor = Arc::new(BrowserActions::new(Arc::new(RecordingBrowser::default())));
    let orchestrator = Orchestrator::new(provider.clone(), executor, settings(4));
    let (tx, _rx) = mpsc::unbounded_channel();

    orchestrator
        .run(&HistoryStore::in_memory(), &input("hello"), &tx)
        .await
        .unwrap();

    let request = &provider.requests()[0];
    assert_eq!(request["model"], "deepseek-chat");
    assert_eq!(request["stream"], true);
    assert_eq!(request["tools"].as_array().unwrap().len(), 3);

    let messages = request["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    let system = messages[0]["content"].as_str().unwrap();
    assert!(system.contains("\"Example Domain\""));
    assert!(system.contains("URL: https://example.com"));
    assert_eq!(messages[1], json!({"role": "user", "content": "hello"}));
}

#[tokio::test]
async fn search_tool_round_then_final_answer() {
    let provider = ScriptedProvider::new(vec![
        round(sse(&[
            tool_delta(0, Some("call_abc"), Some("google"), Some("")),
            tool_delta(0, None, Some("Search"), Some("{\"query\":")),
            tool_delta(0, None, None, Some("\"flights Japan\"}")),
        ])),
        round(sse(&[text_delta("I opened a search for flights to Japan.")])),
    ]);
    let browser = Arc::new(RecordingBrowser::default());
    let executor = Arc::new(BrowserActions::new(browser.clone()));
    let orchestrator = Orchestrator::new(provider.clone(), executor, settings(4));
    let history = HistoryStore::in_memory();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = orchestrator
        .run(&history, &input("search for cheap flights to Japan"), &tx)
        .await
        .unwrap();

    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.reply, "I opened a search for flights to Japan.");
    assert_eq!(
        browser.opened.lock().unwrap().as_slice(),
        ["https://www.google.com/search?q=flights%20Japan"]
    );

    let saved = history.load("tab-42").unwrap();
    let roles: Vec<Role> = saved.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);

    let calls = saved[1].tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_abc");
    assert_eq!(calls[0].function.name, "googleSearch");
    assert_eq!(saved[1].content, None);

    assert_eq!(saved[2].tool_call_id.as_deref(), Some("call_abc"));
    let result: Value = serde_json::from_str(saved[2].text_content().unwrap()).unwrap();
    assert_eq!(result, json!({"status": "searching", "query": "flights Japan"}));

    // Second request replays the tool exchange after the system message.
    let second = &provider.requests()[1];
    let messages = second["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"query\":\"flights Japan\"}");
    assert_eq!(messages[3]["role"], "tool");

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&ChatEvent::ToolCall { name: "googleSearch".into() }));
    assert_eq!(events.last(), Some(&ChatEvent::Done));
}

#[tokio::test]
async fn endless_tool_calls_stop_at_round_budget() {
    let rounds = (0..3)
        .map(|i| {
            round(sse(&[
                text_delta("working on it"),
                tool_delta(0, Some(format!("call_{}", i).as_str()), Some("openUrl"), Some("{\"url\":\"a.com\"}")),
            ]))
        })
        .collect();
    let provider = ScriptedProvider::new(rounds);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider.clone(), executor.clone(), settings(3));
    let history = HistoryStore::in_memory();
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = orchestrator.run(&history, &input("loop"), &tx).await.unwrap();

    assert_eq!(outcome.rounds, 3);
    assert!(outcome.exhausted);
    assert_eq!(outcome.reply, "");
    assert_eq!(provider.requests().len(), 3);
    assert_eq!(executor.calls.lock().unwrap().len(), 3);

    let saved = history.load("tab-42").unwrap();
    assert_eq!(saved.len(), 7);
    assert_eq!(saved.last().unwrap().role, Role::Tool);
    assert_eq!(saved[1].text_content(), Some("working on it"));
}

#[tokio::test]
async fn malformed_arguments_still_dispatch() {
    let provider = ScriptedProvider::new(vec![
        round(sse(&[tool_delta(0, Some("c1"), Some("openUrl"), Some("{bad json"))])),
        round(sse(&[text_delta("Sorry, that failed.")])),
    ]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider, executor.clone(), settings(4));
    let (tx, _rx) = mpsc::unbounded_channel();

    let outcome = orchestrator
        .run(&HistoryStore::in_memory(), &input("open it"), &tx)
        .await
        .unwrap();

    assert_eq!(outcome.reply, "Sorry, that failed.");
    let calls = executor.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("openUrl".to_string(), json!({"error": "Invalid JSON args"})));
}

#[tokio::test]
async fn tool_calls_dispatch_in_index_order() {
    let provider = ScriptedProvider::new(vec![
        round(sse(&[
            tool_delta(1, Some("second"), Some("closeCurrentTab"), Some("{}")),
            tool_delta(0, Some("first"), Some("openUrl"), Some("{\"url\":\"b.com\"}")),
        ])),
        round(sse(&[text_delta("done")])),
    ]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider, executor.clone(), settings(4));
    let history = HistoryStore::in_memory();
    let (tx, _rx) = mpsc::unbounded_channel();

    orchestrator.run(&history, &input("go"), &tx).await.unwrap();

    let names: Vec<String> = executor.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names, vec!["openUrl", "closeCurrentTab"]);

    let saved = history.load("tab-42").unwrap();
    assert_eq!(saved[2].tool_call_id.as_deref(), Some("first"));
    assert_eq!(saved[3].tool_call_id.as_deref(), Some("second"));
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let provider = ScriptedProvider::new(vec![
        round(sse(&[tool_delta(0, Some("c1"), Some("deleteEverything"), Some("{}"))])),
        round(sse(&[text_delta("I can't do that.")])),
    ]);
    let executor = Arc::new(BrowserActions::new(Arc::new(RecordingBrowser::default())));
    let orchestrator = Orchestrator::new(provider, executor, settings(4));
    let history = HistoryStore::in_memory();
    let (tx, _rx) = mpsc::unbounded_channel();

    orchestrator.run(&history, &input("wipe"), &tx).await.unwrap();

    let saved = history.load("tab-42").unwrap();
    let result: Value = serde_json::from_str(saved[2].text_content().unwrap()).unwrap();
    assert_eq!(result, json!({"error": "Function not found"}));
}

#[tokio::test]
async fn transport_failure_leaves_history_untouched() {
    let provider = ScriptedProvider::new(vec![
        round(sse(&[tool_delta(0, Some("c1"), Some("openUrl"), Some("{\"url\":\"x.com\"}"))])),
        Round::Fail(EngineError::ApiError {
            status: 500,
            message: "upstream exploded".into(),
        }),
    ]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider, executor, settings(4));
    let history = HistoryStore::in_memory();
    history.append_and_save("tab-42", "earlier", "answer").unwrap();
    let before = history.load("tab-42").unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let err = orchestrator.run(&history, &input("open x"), &tx).await.unwrap_err();

    assert!(err.is_transport());
    assert_eq!(history.load("tab-42").unwrap(), before);
    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&ChatEvent::Error("upstream exploded".into())));
}

#[tokio::test]
async fn dropped_connection_does_not_persist_partial_answer() {
    let provider = ScriptedProvider::new(vec![Round::Stream(vec![
        Ok(Bytes::from(sse(&[text_delta("partial ")]).replace("data: [DONE]\n\n", ""))),
        Err(EngineError::StreamInterrupted("connection reset".into())),
    ])]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider, executor, settings(4));
    let history = HistoryStore::in_memory();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let err = orchestrator.run(&history, &input("hi"), &tx).await.unwrap_err();

    assert!(matches!(err, EngineError::StreamInterrupted(_)));
    assert!(history.load("tab-42").unwrap().is_empty());
    let events = drain(&mut rx);
    assert_eq!(events[0], ChatEvent::Chunk("partial ".into()));
    assert!(matches!(events.last(), Some(ChatEvent::Error(_))));
}

/// Reads succeed, every write fails.
struct ReadOnlyStorage;

impl SessionStorage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Value) -> Result<()> {
        Err(EngineError::HistoryError("disk full".into()))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_history_write_fails_the_interaction() {
    let provider = ScriptedProvider::new(vec![round(sse(&[text_delta("hi")]))]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider, executor, settings(4));
    let history = HistoryStore::new(Arc::new(ReadOnlyStorage), 30_000);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let err = orchestrator.run(&history, &input("hello"), &tx).await.unwrap_err();

    assert!(matches!(err, EngineError::HistoryError(_)));
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            ChatEvent::Chunk("hi".into()),
            ChatEvent::Error("Conversation history could not be stored.".into()),
        ]
    );
    assert_eq!(
        tabchat::ChatReply::from_result(&Err(err)),
        tabchat::ChatReply::Failure {
            error: "Conversation history could not be stored.".into()
        }
    );
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let provider = ScriptedProvider::without_credentials();
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider.clone(), executor, settings(4));
    let history = HistoryStore::in_memory();
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = orchestrator.run(&history, &input("hi"), &tx).await.unwrap_err();

    assert!(matches!(err, EngineError::ConfigError(_)));
    assert!(provider.requests().is_empty());
    assert!(history.load("tab-42").unwrap().is_empty());
}

#[tokio::test]
async fn history_is_trimmed_before_sending() {
    let provider = ScriptedProvider::new(vec![round(sse(&[text_delta("ok")]))]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider.clone(), executor, settings(4));
    let history = HistoryStore::new(Arc::new(MemoryStorage::new()), 50);
    history.append_and_save("tab-42", &"a".repeat(20), &"b".repeat(20)).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    orchestrator
        .run(&history, &input(&"c".repeat(15)), &tx)
        .await
        .unwrap();

    // 15 + 20 fits under 50; adding the 20-char user turn would not.
    let messages = provider.requests()[0]["messages"].as_array().unwrap().clone();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["content"], "b".repeat(20));

    let saved = history.load("tab-42").unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[2], Message::assistant("ok"));
}

#[tokio::test]
async fn sessions_do_not_share_history() {
    let provider = ScriptedProvider::new(vec![
        round(sse(&[text_delta("one")])),
        round(sse(&[text_delta("two")])),
    ]);
    let executor = Arc::new(RecordingExecutor::default());
    let orchestrator = Orchestrator::new(provider.clone(), executor, settings(4));
    let history = HistoryStore::in_memory();
    let (tx, _rx) = mpsc::unbounded_channel();

    orchestrator.run(&history, &input("first"), &tx).await.unwrap();
    let other = ChatInput {
        session_id: "tab-7".into(),
        ..input("second")
    };
    orchestrator.run(&history, &other, &tx).await.unwrap();

    assert_eq!(history.load("tab-42").unwrap().len(), 2);
    assert_eq!(history.load("tab-7").unwrap().len(), 2);
    let second_request = &provider.requests()[1];
    assert_eq!(second_request["messages"].as_array().unwrap().len(), 2);
}
