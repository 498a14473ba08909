//! The socket-talk client: one WebSocket to a broker plus the HTTP payload store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;
use sockettalk_common::auth::Signer;
use sockettalk_common::envelope::is_keep_alive;
use sockettalk_common::topic::INIT_TOPIC;
use sockettalk_common::{BaseUrl, Envelope, TopicHash};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::correlator::PendingReply;
use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::registry::{Handler, Registry, Target};
use crate::rest::PayloadClient;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long [`Client::request`] waits for an answer by default.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const OUTGOING: &str = "->";
const INCOMING: &str = "<-";

#[derive(Clone)]
pub struct ClientOptions {
    /// Broker base URL (`http://` or `https://`). Defaults to `http://localhost:8080/`.
    pub server_url: Option<String>,
    /// Signs every outgoing frame. Must match the broker's auth key.
    pub auth: Option<Signer>,
    pub request_timeout: Duration,
    /// Bypass system proxies for payload store calls.
    pub no_proxy: bool,
    /// Log every frame in and out at `info` instead of `debug`.
    pub logging: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server_url: None,
            auth: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            no_proxy: false,
            logging: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A socket-talk client. Cheap to clone; clones share one connection.
///
/// ```rust,no_run
/// use sockettalk_client::{Client, ClientOptions};
///
/// #[tokio::main]
/// async fn main() -> sockettalk_client::Result<()> {
///     let client = Client::new(ClientOptions::default())?;
///     client.subscribe("ping", |msg| async move {
///         let _ = msg.answer("pong").await;
///     });
///     client.connect().await
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    base: BaseUrl,
    payloads: PayloadClient,
    registry: Registry,
    signer: Option<Signer>,
    request_timeout: Duration,
    logging: bool,
    state: watch::Sender<ConnectionState>,
    sink: Mutex<Option<SplitSink<WsStream, Frame>>>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let base = match options.server_url.as_deref() {
            Some(url) => BaseUrl::parse(url)?,
            None => BaseUrl::default(),
        };
        let payloads = PayloadClient::new(base.clone(), options.no_proxy)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            inner: Arc::new(Inner {
                base,
                payloads,
                registry: Registry::default(),
                signer: options.auth,
                request_timeout: options.request_timeout,
                logging: options.logging,
                state,
                sink: Mutex::new(None),
                cancel: parking_lot::Mutex::new(None),
            }),
        })
    }

    /// Connect and run the read loop until the connection ends.
    ///
    /// Returns `Ok(())` after [`Client::disconnect`], and the transport error
    /// otherwise. Pending requests fail with [`ClientError::Disconnected`]
    /// once this returns.
    pub async fn connect(&self) -> Result<()> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ClientError::AlreadyConnected);
        }

        // Stored before dialing so a disconnect during the handshake is not lost.
        let cancel = CancellationToken::new();
        *self.inner.cancel.lock() = Some(cancel.clone());

        let url = self.inner.base.ws_endpoint();
        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            dialed = connect_async(url.as_str()) => Some(dialed),
        };
        let ws = match dialed {
            Some(Ok((ws, _))) => ws,
            Some(Err(e)) => {
                self.inner.cancel.lock().take();
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(e.into());
            }
            None => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                info!(server = %url, "Dial cancelled");
                return Ok(());
            }
        };
        let (sink, mut stream) = ws.split();
        *self.inner.sink.lock().await = Some(sink);
        self.inner.state.send_replace(ConnectionState::Connected);
        info!(server = %url, "Connected");

        self.announce();
        let result = self.read_loop(&mut stream, &cancel).await;

        self.inner.cancel.lock().take();
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
        let failed = self.inner.registry.fail_pending(|| ClientError::Disconnected);
        match &result {
            Ok(()) => info!(server = %url, failed, "Disconnected"),
            Err(e) => warn!(server = %url, failed, "Connection lost: {e}"),
        }
        result
    }

    /// Close the connection. Makes a running [`Client::connect`] return `Ok(())`,
    /// including one that is still dialing.
    pub async fn disconnect(&self) {
        let token = self.inner.cancel.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            let _ = sink.close().await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Resolve once the client is connected.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        rx.wait_for(|state| *state == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Disconnected)
    }

    /// Register `handler` for `topic`, replacing any previous one.
    ///
    /// Each delivery runs on its own task, so handlers may run concurrently.
    pub fn subscribe<F, Fut>(&self, topic: &str, handler: F)
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |msg| handler(msg).boxed());
        self.inner.registry.subscribe(topic, handler);
    }

    /// Stop delivering `topic`. Returns false if nothing was subscribed.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.inner.registry.unsubscribe(topic)
    }

    /// Fire-and-forget publish.
    pub async fn send(&self, topic: &str, data: &(impl Serialize + ?Sized)) -> Result<()> {
        self.publish(TopicHash::of(topic), topic, None, data).await
    }

    /// Publish and wait for one answer, decoded as JSON.
    pub async fn request<T: DeserializeOwned>(
        &self,
        topic: &str,
        data: &(impl Serialize + ?Sized),
    ) -> Result<T> {
        self.request_hashed(TopicHash::of(topic), topic, data).await
    }

    /// Publish and wait until some subscriber has answered, ignoring the answer.
    pub async fn sure_send(&self, topic: &str, data: &(impl Serialize + ?Sized)) -> Result<()> {
        self.request::<IgnoredAny>(topic, data).await.map(|_| ())
    }

    /// Requests still waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.pending_count()
    }

    // ── Internal ──────────────────────────────────────────────────────────────

    async fn request_hashed<T: DeserializeOwned>(
        &self,
        title: TopicHash,
        topic: &str,
        data: &(impl Serialize + ?Sized),
    ) -> Result<T> {
        self.ensure_connected()?;
        let message_id = self.inner.payloads.set(serde_json::to_vec(data)?).await?;
        let id = Uuid::new_v4().to_string();

        // Registered before the frame leaves so a fast answer cannot slip past.
        let pending = PendingReply::register(
            &self.inner.registry,
            TopicHash::reply_to(&title, &id),
            topic,
        );
        let envelope = Envelope {
            title,
            id,
            message_id,
            expects_answer: true,
        };
        self.send_envelope(&envelope, topic).await?;

        let bytes = pending.wait(self.inner.request_timeout).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub(crate) async fn publish(
        &self,
        title: TopicHash,
        topic: &str,
        id: Option<String>,
        data: &(impl Serialize + ?Sized),
    ) -> Result<()> {
        self.ensure_connected()?;
        let message_id = self.inner.payloads.set(serde_json::to_vec(data)?).await?;
        let envelope = Envelope {
            title,
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            message_id,
            expects_answer: false,
        };
        self.send_envelope(&envelope, topic).await
    }

    async fn send_envelope(&self, envelope: &Envelope, topic: &str) -> Result<()> {
        let mut bytes = envelope.to_json().into_bytes();
        if let Some(sign) = &self.inner.signer {
            bytes = sign(bytes);
        }
        let frame = match String::from_utf8(bytes) {
            Ok(text) => Frame::Text(text.into()),
            Err(e) => Frame::Binary(e.into_bytes().into()),
        };

        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send(frame).await?;
        self.log_frame(OUTGOING, topic);
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Announce ourselves with an INIT request. Brokers and peers may ignore it.
    fn announce(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            let init = TopicHash::init().clone();
            match client.request_hashed::<IgnoredAny>(init, INIT_TOPIC, &json!({})).await {
                Ok(_) => debug!("INIT answered"),
                Err(e) => trace!("INIT not answered: {e}"),
            }
        });
    }

    async fn read_loop(
        &self,
        stream: &mut SplitStream<WsStream>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            let frame = match next {
                Some(Ok(Frame::Text(text))) => text.as_str().as_bytes().to_vec(),
                Some(Ok(Frame::Binary(bytes))) => bytes.to_vec(),
                Some(Ok(Frame::Close(_))) | None => return Err(ClientError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };
            tokio::spawn(self.clone().dispatch(frame));
        }
    }

    async fn dispatch(self, frame: Vec<u8>) {
        if is_keep_alive(&frame) {
            trace!("Keep-alive");
            return;
        }
        let envelope = match Envelope::from_slice(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping malformed frame: {e}");
                return;
            }
        };

        // The rejection carries no correlation id, so it fails every waiter.
        if &envelope.title == TopicHash::auth_failed() {
            let failed = self.inner.registry.fail_pending(|| ClientError::AuthFailed);
            warn!(failed, "Broker rejected our frame: authentication failed");
        }

        let Some(route) = self.inner.registry.lookup(&envelope.title) else {
            self.log_frame(INCOMING, envelope.title.as_str());
            return;
        };
        self.log_frame(INCOMING, &route.topic);

        let payload = if envelope.has_payload() {
            self.inner.payloads.get(&envelope.message_id).await
        } else {
            Ok(Vec::new())
        };

        match route.target {
            Target::Reply(slot) => {
                slot.complete(payload);
            }
            Target::Handler(handler) => {
                let bytes = match payload {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(topic = %route.topic, "Payload fetch failed: {e}");
                        return;
                    }
                };
                let mut msg = Message::new(route.topic, bytes);
                if envelope.expects_answer {
                    msg = msg.expecting_answer(self.clone(), envelope.title, envelope.id);
                }
                handler(msg).await;
            }
        }
    }

    fn log_frame(&self, direction: &str, topic: &str) {
        if self.inner.logging {
            info!("[SOCK-TALK] ({direction}) {topic}");
        } else {
            debug!("({direction}) {topic}");
        }
    }
}
