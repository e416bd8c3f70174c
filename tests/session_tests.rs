//! Streaming session lifecycle tests over scripted transport and
//! listen-key seams, driven on a paused clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use sodex::core::kernel::{
    ListenKey, ListenKeyProvider, Message, SessionConfig, SessionManager, SessionState,
    WsTransport,
};
use sodex::spot::{SpotCodec, SpotEvent};
use sodex::SodexError;

#[derive(Default)]
struct TransportState {
    connected: bool,
    connect_urls: Vec<String>,
    connect_results: VecDeque<Result<(), SodexError>>,
    sent: Vec<Message>,
    incoming: VecDeque<Result<Message, SodexError>>,
    end_stream_once: bool,
}

#[derive(Clone, Default)]
struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    fn push_incoming(&self, frame: Message) {
        self.state.lock().unwrap().incoming.push_back(Ok(frame));
    }

    fn fail_next_connects(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state
                .connect_results
                .push_back(Err(SodexError::Network("connection refused".into())));
        }
    }

    fn end_stream_once(&self) {
        self.state.lock().unwrap().end_stream_once = true;
    }

    fn sent_text_frames(&self) -> Vec<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => serde_json::from_str(t).ok(),
                _ => None,
            })
            .collect()
    }

    fn connect_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().connect_urls.clone()
    }
}

#[async_trait]
impl WsTransport for MockTransport {
    async fn connect(&mut self, url: &str) -> Result<(), SodexError> {
        let mut state = self.state.lock().unwrap();
        state.connect_urls.push(url.to_string());
        match state.connect_results.pop_front() {
            Some(Err(e)) => Err(e),
            _ => {
                state.connected = true;
                Ok(())
            }
        }
    }

    async fn send(&mut self, msg: Message) -> Result<(), SodexError> {
        self.state.lock().unwrap().sent.push(msg);
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<Message, SodexError>> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(frame) = state.incoming.pop_front() {
                return Some(frame);
            }
            if state.end_stream_once {
                state.end_stream_once = false;
                state.connected = false;
                return None;
            }
        }
        // Nothing scripted: stay quiet so timers drive the session.
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), SodexError> {
        self.state.lock().unwrap().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

#[derive(Default)]
struct ProviderState {
    fetch_count: u32,
    renew_count: u32,
    renew_results: VecDeque<Result<(), SodexError>>,
}

#[derive(Clone)]
struct MockProvider {
    state: Arc<Mutex<ProviderState>>,
    ttl: Duration,
}

impl MockProvider {
    fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState::default())),
            ttl,
        }
    }

    fn fail_next_renewals(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state
                .renew_results
                .push_back(Err(SodexError::Network("renewal timed out".into())));
        }
    }

    fn fetch_count(&self) -> u32 {
        self.state.lock().unwrap().fetch_count
    }

    fn renew_count(&self) -> u32 {
        self.state.lock().unwrap().renew_count
    }
}

#[async_trait]
impl ListenKeyProvider for MockProvider {
    async fn fetch_listen_key(&self) -> Result<ListenKey, SodexError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_count += 1;
        Ok(ListenKey::new(format!("key-{}", state.fetch_count), self.ttl))
    }

    async fn renew_listen_key(&self, key: &ListenKey) -> Result<ListenKey, SodexError> {
        let mut state = self.state.lock().unwrap();
        state.renew_count += 1;
        match state.renew_results.pop_front() {
            Some(Err(e)) => Err(e),
            _ => Ok(ListenKey::new(key.value.clone(), self.ttl)),
        }
    }
}

type TestSession = SessionManager<SpotCodec, MockTransport, MockProvider>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn session(ttl: Duration) -> (TestSession, MockTransport, MockProvider) {
    init_tracing();
    let transport = MockTransport::default();
    let provider = MockProvider::new(ttl);
    let config = SessionConfig::new("wss://stream.test".to_string())
        .with_listen_key_ttl(ttl)
        .with_key_param("token".to_string());
    let manager = SessionManager::new(SpotCodec, transport.clone(), provider.clone(), config);
    (manager, transport, provider)
}

fn depth_frame(symbol: &str) -> Message {
    Message::Text(
        json!({
            "channel": format!("{symbol}@depth"),
            "data": {"s": symbol, "t": 1_700_000_000_000i64, "b": [["27000", "1"]], "a": []},
        })
        .to_string(),
    )
}

#[tokio::test(start_paused = true)]
async fn connect_appends_listen_key_and_replays_subscriptions_in_order() {
    let (mut session, transport, provider) = session(Duration::from_secs(1800));

    session.subscribe("a_usdt@depth").await.unwrap();
    session.subscribe("b_usdt@depth").await.unwrap();
    session.subscribe("c_usdt@depth").await.unwrap();
    // A duplicate must not widen the replay set.
    session.subscribe("b_usdt@depth").await.unwrap();
    session.connect().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(transport.connect_urls(), vec!["wss://stream.test?token=key-1"]);
    assert_eq!(provider.fetch_count(), 1);

    let frames = transport.sent_text_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["method"], "SUBSCRIBE");
    assert_eq!(
        frames[0]["params"],
        json!(["a_usdt@depth", "b_usdt@depth", "c_usdt@depth"])
    );
}

#[tokio::test(start_paused = true)]
async fn renewal_fires_before_the_ttl_elapses() {
    let (mut session, _transport, provider) = session(Duration::from_secs(30));
    session.connect().await.unwrap();

    // The renewal timer is the only runnable event, so one step is one
    // renewal, fired at 2/3 of the TTL.
    let start = tokio::time::Instant::now();
    session.step().await.unwrap();

    assert_eq!(provider.renew_count(), 1);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(19) && elapsed < Duration::from_secs(30));
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn renewal_failures_escalate_to_a_fresh_key() {
    let (mut session, transport, provider) = session(Duration::from_secs(600));
    provider.fail_next_renewals(3);
    session.subscribe("btc_usdt@depth").await.unwrap();
    session.connect().await.unwrap();

    // Two failures retry locally, the third forces a full reconnect with
    // a newly fetched key rather than a fourth renewal attempt.
    for _ in 0..3 {
        session.step().await.unwrap();
    }

    assert_eq!(provider.renew_count(), 3);
    assert_eq!(provider.fetch_count(), 2);
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(
        transport.connect_urls().last().map(String::as_str),
        Some("wss://stream.test?token=key-2")
    );
    // Subscriptions were replayed on the new connection.
    let frames = transport.sent_text_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["params"], json!(["btc_usdt@depth"]));
}

#[tokio::test(start_paused = true)]
async fn transport_disconnect_reconnects_and_resubscribes() {
    let (mut session, transport, provider) = session(Duration::from_secs(1800));
    session.subscribe("a_usdt@depth").await.unwrap();
    session.subscribe("b_usdt@depth").await.unwrap();
    session.connect().await.unwrap();

    transport.end_stream_once();
    session.step().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(provider.fetch_count(), 2);
    let frames = transport.sent_text_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1]["method"], "SUBSCRIBE");
    assert_eq!(frames[1]["params"], json!(["a_usdt@depth", "b_usdt@depth"]));
}

#[tokio::test(start_paused = true)]
async fn close_before_reconnect_suppresses_further_attempts() {
    let (mut session, transport, provider) = session(Duration::from_secs(1800));
    session.connect().await.unwrap();

    transport.end_stream_once();
    session.handle().close();
    session.step().await.unwrap();

    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(provider.fetch_count(), 1);
    assert!(!transport.is_connected());

    // Closed is terminal.
    session.step().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.connect().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_the_attempt_cap() {
    init_tracing();
    let transport = MockTransport::default();
    let provider = MockProvider::new(Duration::from_secs(1800));
    let config = SessionConfig::new("wss://stream.test".to_string())
        .with_key_param("token".to_string())
        .with_max_reconnect_attempts(2);
    let mut session = SessionManager::new(SpotCodec, transport.clone(), provider.clone(), config);
    session.connect().await.unwrap();

    transport.end_stream_once();
    transport.fail_next_connects(2);
    let err = session.step().await.unwrap_err();

    assert!(matches!(err, SodexError::WebSocket(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
    // One initial connect plus two failed reconnect attempts.
    assert_eq!(provider.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (mut session, _transport, _provider) = session(Duration::from_secs(1800));
    session.connect().await.unwrap();

    session.close().await.unwrap();
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.handle().is_closed());
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped_without_killing_the_session() {
    let (mut session, transport, _provider) = session(Duration::from_secs(1800));
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&seen);
    session.on_channel("btc_usdt@depth", move |message| {
        if let SpotEvent::Orderbook(book) = message.event {
            sink.lock().unwrap().push(book.symbol);
        }
    });
    session.subscribe("btc_usdt@depth").await.unwrap();
    session.connect().await.unwrap();

    transport.push_incoming(Message::Text("{this is not json".to_string()));
    transport.push_incoming(depth_frame("btc_usdt"));
    session.step().await.unwrap();
    session.step().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(*seen.lock().unwrap(), vec!["btc_usdt".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn unrouted_messages_fall_back_to_the_default_handler() {
    let (mut session, transport, _provider) = session(Duration::from_secs(1800));
    let count = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&count);
    session.on_unrouted(move |_| *sink.lock().unwrap() += 1);
    session.connect().await.unwrap();

    transport.push_incoming(depth_frame("eth_usdt"));
    session.step().await.unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_shrinks_the_replay_set() {
    let (mut session, transport, _provider) = session(Duration::from_secs(1800));
    session.subscribe("a_usdt@depth").await.unwrap();
    session.subscribe("b_usdt@depth").await.unwrap();
    session.connect().await.unwrap();

    session.unsubscribe("a_usdt@depth").await.unwrap();
    assert_eq!(session.subscriptions(), ["b_usdt@depth".to_string()]);

    transport.end_stream_once();
    session.step().await.unwrap();

    let frames = transport.sent_text_frames();
    let replay = frames.last().unwrap();
    assert_eq!(replay["method"], "SUBSCRIBE");
    assert_eq!(replay["params"], json!(["b_usdt@depth"]));
}
