use crate::core::errors::SodexError;
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::ws::WsTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, trace, warn};

/// Default TTL attached to listen keys; the wire returns a bare token with
/// no expiry, so the lifetime is client-side configuration.
pub const DEFAULT_LISTEN_KEY_TTL: Duration = Duration::from_secs(30 * 60);

/// A listen key authorizing a private stream session.
///
/// The key must be renewed before `issued_at + ttl` or the server drops the
/// streaming session.
#[derive(Debug, Clone)]
pub struct ListenKey {
    pub value: String,
    pub issued_at: Instant,
    pub ttl: Duration,
}

impl ListenKey {
    #[must_use]
    pub fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            issued_at: Instant::now(),
            ttl,
        }
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.issued_at + self.ttl
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }

    /// The instant at which renewal should fire, `fraction` of the way
    /// through the TTL.
    #[must_use]
    pub fn renew_at(&self, fraction: f64) -> Instant {
        self.issued_at + self.ttl.mul_f64(fraction)
    }
}

/// REST-side collaborator that issues and renews listen keys.
#[async_trait]
pub trait ListenKeyProvider: Send + Sync {
    /// Obtain a fresh listen key.
    async fn fetch_listen_key(&self) -> Result<ListenKey, SodexError>;

    /// Renew an existing key before its TTL elapses.
    async fn renew_listen_key(&self, key: &ListenKey) -> Result<ListenKey, SodexError>;
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Handshaking,
    Active,
    Reconnecting,
}

/// Tuning knobs for the streaming session. The defaults renew at 2/3 of the
/// key TTL (tolerating one missed attempt) and escalate to a full reconnect
/// after three consecutive renewal failures.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Streaming endpoint URL, without the key parameter.
    pub ws_url: String,
    /// Query parameter carrying the listen key (`listenKey` for futures,
    /// `token` for spot).
    pub key_param: String,
    /// TTL attached to keys the provider returns.
    pub listen_key_ttl: Duration,
    /// Fraction of the TTL after which renewal fires. Must be < 1.
    pub renew_fraction: f64,
    /// Delay before retrying a failed renewal locally.
    pub renewal_retry_delay: Duration,
    /// Consecutive renewal failures before forcing a full reconnect.
    pub max_renewal_failures: u32,
    /// Initial reconnect backoff delay.
    pub initial_backoff: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
    /// Reconnect attempts before the session gives up.
    pub max_reconnect_attempts: u32,
    /// Bound on the connect + handshake sequence.
    pub handshake_timeout: Duration,
}

impl SessionConfig {
    #[must_use]
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url,
            key_param: "listenKey".to_string(),
            listen_key_ttl: DEFAULT_LISTEN_KEY_TTL,
            renew_fraction: 2.0 / 3.0,
            renewal_retry_delay: Duration::from_secs(5),
            max_renewal_failures: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            max_reconnect_attempts: 10,
            handshake_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_key_param(mut self, key_param: String) -> Self {
        self.key_param = key_param;
        self
    }

    #[must_use]
    pub fn with_listen_key_ttl(mut self, ttl: Duration) -> Self {
        self.listen_key_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_renew_fraction(mut self, fraction: f64) -> Self {
        self.renew_fraction = fraction;
        self
    }

    #[must_use]
    pub fn with_max_renewal_failures(mut self, count: u32) -> Self {
        self.max_renewal_failures = count;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Cloneable handle for closing a session from outside the driver task.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    closed: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl SessionHandle {
    /// Request session shutdown. Idempotent; any in-flight reconnect backoff
    /// is interrupted.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

type Handler<M> = Box<dyn FnMut(M) + Send>;

enum Wakeup {
    Closed,
    RenewDue,
    Frame(Option<Result<Message, SodexError>>),
}

/// Owns one streaming connection and its listen-key lifecycle.
///
/// All state transitions (connect, renew, reconnect, subscription changes)
/// run through `&mut self`, so exactly one of them is in progress at any
/// time: a renewal failure and a transport disconnect can never start two
/// overlapping reconnect cycles. The renewal timer and the receive loop are
/// arms of a single `select!` inside [`SessionManager::step`].
pub struct SessionManager<C: WsCodec, T: WsTransport, K: ListenKeyProvider> {
    codec: C,
    transport: T,
    keys: K,
    config: SessionConfig,
    state: SessionState,
    listen_key: Option<ListenKey>,
    renew_deadline: Instant,
    renewal_failures: u32,
    subscriptions: Vec<String>,
    handlers: HashMap<String, Handler<C::Message>>,
    unrouted: Option<Handler<C::Message>>,
    handle: SessionHandle,
}

impl<C: WsCodec, T: WsTransport, K: ListenKeyProvider> SessionManager<C, T, K> {
    pub fn new(codec: C, transport: T, keys: K, config: SessionConfig) -> Self {
        Self {
            codec,
            transport,
            keys,
            config,
            state: SessionState::Disconnected,
            listen_key: None,
            renew_deadline: Instant::now(),
            renewal_failures: 0,
            subscriptions: Vec::new(),
            handlers: HashMap::new(),
            unrouted: None,
            handle: SessionHandle::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Channels currently subscribed (or queued for the next connection),
    /// in insertion order.
    #[must_use]
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Handle for closing the session from another task.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Register a handler for one channel's messages.
    pub fn on_channel(&mut self, channel: impl Into<String>, handler: impl FnMut(C::Message) + Send + 'static) {
        self.handlers.insert(channel.into(), Box::new(handler));
    }

    /// Register a handler for messages with no channel match.
    pub fn on_unrouted(&mut self, handler: impl FnMut(C::Message) + Send + 'static) {
        self.unrouted = Some(Box::new(handler));
    }

    /// Obtain a listen key and open the streaming connection.
    ///
    /// On success the session is `Active` and any queued subscriptions have
    /// been replayed.
    #[instrument(skip(self), fields(url = %self.config.ws_url))]
    pub async fn connect(&mut self) -> Result<(), SodexError> {
        if self.handle.is_closed() {
            return Err(SodexError::WebSocket("session is closed".to_string()));
        }
        if self.state == SessionState::Active {
            return Ok(());
        }
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Add a channel to the subscription set. Sent immediately when active,
    /// queued for the next successful connection otherwise.
    pub async fn subscribe(&mut self, channel: &str) -> Result<(), SodexError> {
        if !self.subscriptions.iter().any(|c| c == channel) {
            self.subscriptions.push(channel.to_string());
        }
        if self.state == SessionState::Active {
            let frame = self.codec.encode_subscription(&[channel])?;
            self.transport.send(frame).await?;
        }
        Ok(())
    }

    /// Remove a channel from the subscription set.
    pub async fn unsubscribe(&mut self, channel: &str) -> Result<(), SodexError> {
        self.subscriptions.retain(|c| c != channel);
        if self.state == SessionState::Active {
            let frame = self.codec.encode_unsubscription(&[channel])?;
            self.transport.send(frame).await?;
        }
        Ok(())
    }

    /// Close the session. Terminal and idempotent: the renewal timer stops,
    /// any in-flight reconnect is suppressed, and subsequent calls are no-ops.
    pub async fn close(&mut self) -> Result<(), SodexError> {
        if self.handle.is_closed() && self.state == SessionState::Disconnected {
            return Ok(());
        }
        self.handle.close();
        self.finish_close().await;
        Ok(())
    }

    /// Drive the session until it is closed or reconnection is exhausted.
    pub async fn run(&mut self) -> Result<(), SodexError> {
        while !self.handle.is_closed() && self.state != SessionState::Disconnected {
            self.step().await?;
        }
        Ok(())
    }

    /// Process one event: a received frame, a due renewal, or a shutdown
    /// request. Exposed so callers (and tests) can interleave session
    /// progress with their own logic.
    pub async fn step(&mut self) -> Result<(), SodexError> {
        if self.handle.is_closed() {
            self.finish_close().await;
            return Ok(());
        }

        match self.state {
            SessionState::Disconnected => Err(SodexError::WebSocket(
                "session is not connected".to_string(),
            )),
            SessionState::Active => {
                let wakeup = {
                    let closed = self.handle.notify.notified();
                    let renew_deadline = self.renew_deadline;
                    tokio::select! {
                        biased;
                        _ = closed => Wakeup::Closed,
                        _ = time::sleep_until(renew_deadline) => Wakeup::RenewDue,
                        frame = self.transport.next() => Wakeup::Frame(frame),
                    }
                };
                match wakeup {
                    Wakeup::Closed => {
                        self.finish_close().await;
                        Ok(())
                    }
                    Wakeup::RenewDue => self.renew().await,
                    Wakeup::Frame(frame) => self.handle_frame(frame).await,
                }
            }
            // Connecting/Handshaking/Reconnecting are only observable after
            // a failed connect; resume the reconnect cycle.
            _ => self.reconnect().await,
        }
    }

    async fn establish(&mut self) -> Result<(), SodexError> {
        self.state = SessionState::Connecting;
        let key = self.keys.fetch_listen_key().await?;
        let url = format!(
            "{}?{}={}",
            self.config.ws_url, self.config.key_param, key.value
        );

        self.state = SessionState::Handshaking;
        time::timeout(self.config.handshake_timeout, self.transport.connect(&url))
            .await
            .map_err(|_| SodexError::WebSocket("handshake timed out".to_string()))??;

        self.renew_deadline = key.renew_at(self.config.renew_fraction);
        self.listen_key = Some(key);
        self.renewal_failures = 0;
        self.state = SessionState::Active;
        info!(subscriptions = self.subscriptions.len(), "session active");

        // Replay the subscription set in insertion order.
        if !self.subscriptions.is_empty() {
            let frame = self.codec.encode_subscription(&self.subscriptions)?;
            self.transport.send(frame).await?;
        }
        Ok(())
    }

    async fn renew(&mut self) -> Result<(), SodexError> {
        let Some(current) = self.listen_key.clone() else {
            return self.reconnect().await;
        };

        // A key past its TTL is already invalid server-side; local retries
        // cannot save the session, only a fresh key can.
        if current.is_expired() {
            warn!("listen key expired before renewal completed, reconnecting");
            return self.reconnect().await;
        }

        match self.keys.renew_listen_key(&current).await {
            Ok(key) => {
                self.renew_deadline = key.renew_at(self.config.renew_fraction);
                self.listen_key = Some(key);
                self.renewal_failures = 0;
                debug!("listen key renewed");
                Ok(())
            }
            Err(e) => {
                self.renewal_failures += 1;
                warn!(
                    failures = self.renewal_failures,
                    "listen key renewal failed: {}", e
                );
                if self.renewal_failures >= self.config.max_renewal_failures {
                    error!("renewal failure threshold reached, forcing reconnect");
                    self.reconnect().await
                } else {
                    self.renew_deadline = Instant::now() + self.config.renewal_retry_delay;
                    Ok(())
                }
            }
        }
    }

    async fn handle_frame(
        &mut self,
        frame: Option<Result<Message, SodexError>>,
    ) -> Result<(), SodexError> {
        match frame {
            Some(Ok(Message::Close(_))) | None => {
                warn!("transport closed, reconnecting");
                self.reconnect().await
            }
            Some(Ok(message)) => {
                // Malformed frames are logged and dropped, never fatal.
                match self.codec.decode_message(message) {
                    Ok(Some(decoded)) => {
                        self.dispatch(decoded);
                        Ok(())
                    }
                    Ok(None) => Ok(()),
                    Err(e) => {
                        warn!("dropping malformed frame: {}", e);
                        Ok(())
                    }
                }
            }
            Some(Err(e)) => {
                warn!("transport error: {}, reconnecting", e);
                self.reconnect().await
            }
        }
    }

    fn dispatch(&mut self, message: C::Message) {
        let channel = self.codec.channel_of(&message).map(str::to_owned);
        match channel.as_deref().and_then(|c| self.handlers.get_mut(c)) {
            Some(handler) => handler(message),
            None => match self.unrouted.as_mut() {
                Some(handler) => handler(message),
                None => trace!(channel = channel.as_deref(), "no handler for message"),
            },
        }
    }

    /// Full reconnect cycle: capped exponential backoff, fresh listen key
    /// (the old one is assumed invalid), fresh handshake, subscription
    /// replay. At most one cycle runs at a time; a close request aborts it
    /// before the next attempt.
    async fn reconnect(&mut self) -> Result<(), SodexError> {
        self.state = SessionState::Reconnecting;
        self.listen_key = None;
        let _ = self.transport.close().await;

        let mut delay = self.config.initial_backoff;
        for attempt in 1..=self.config.max_reconnect_attempts {
            if self.handle.is_closed() {
                self.finish_close().await;
                return Ok(());
            }

            {
                let closed = self.handle.notify.notified();
                tokio::select! {
                    biased;
                    _ = closed => {}
                    _ = time::sleep(delay) => {}
                }
            }
            if self.handle.is_closed() {
                self.finish_close().await;
                return Ok(());
            }

            match self.establish().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!(attempt, "reconnect attempt failed: {}", e);
                    self.state = SessionState::Reconnecting;
                    delay = std::cmp::min(delay * 2, self.config.max_backoff);
                }
            }
        }

        self.state = SessionState::Disconnected;
        Err(SodexError::WebSocket(format!(
            "failed to reconnect after {} attempts",
            self.config.max_reconnect_attempts
        )))
    }

    async fn finish_close(&mut self) {
        if self.transport.is_connected() {
            let _ = self.transport.close().await;
        }
        self.listen_key = None;
        self.state = SessionState::Disconnected;
    }
}
