//! The upstream broadcast link.
//!
//! The downstream broker connects to the upstream's WebSocket route exactly
//! like an ordinary client. Frames it accepts locally are pushed up through
//! [`FederationLink::forward`]; frames the upstream broadcasts arrive on the
//! receiver returned by [`FederationLink::connect`] and are fanned out locally
//! by the caller.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sockettalk_common::BaseUrl;
use sockettalk_common::envelope::is_keep_alive;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::time::sleep;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::FederationError;

/// Default pause between reconnect attempts after the link drops.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(4);

const OUTBOUND_CAPACITY: usize = 1024;
const INBOUND_CAPACITY: usize = 1024;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to a running upstream link. Dropping it closes the link.
pub struct FederationLink {
    upstream: BaseUrl,
    outbound: mpsc::Sender<String>,
}

impl FederationLink {
    /// Dial the upstream once and start the link task.
    ///
    /// A failure here is returned to the caller: a misconfigured upstream must
    /// surface at startup. Once running, disconnections are retried every
    /// `reconnect_interval` forever.
    pub async fn connect(
        upstream: BaseUrl,
        reconnect_interval: Duration,
    ) -> Result<(Self, mpsc::Receiver<String>), FederationError> {
        let url = upstream.ws_endpoint();
        let socket = dial(&url).await?;
        info!(upstream = %url, "Federation link established");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(run(socket, url, reconnect_interval, outbound_rx, inbound_tx));

        Ok((
            Self {
                upstream,
                outbound: outbound_tx,
            },
            inbound_rx,
        ))
    }

    /// Queue a locally accepted frame for the upstream. Never blocks.
    ///
    /// Frames are dropped while the link is reconnecting or when the queue is
    /// full; broadcast delivery is at-most-once anyway.
    pub fn forward(&self, frame: String) {
        match self.outbound.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(upstream = %self.upstream.http(), "Federation queue full, frame dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(upstream = %self.upstream.http(), "Federation link closed, frame dropped");
            }
        }
    }

    pub fn upstream(&self) -> &BaseUrl {
        &self.upstream
    }
}

async fn dial(url: &str) -> Result<UpstreamSocket, FederationError> {
    let (socket, _) = connect_async(url).await.map_err(|e| FederationError::Dial {
        url: url.to_owned(),
        source: Box::new(e),
    })?;
    Ok(socket)
}

enum LinkEnd {
    /// The broker or the link handle went away.
    Shutdown,
    /// The transport broke; reconnect.
    Lost(String),
}

async fn run(
    mut socket: UpstreamSocket,
    url: String,
    reconnect_interval: Duration,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<String>,
) {
    loop {
        match pump(socket, &mut outbound, &inbound).await {
            LinkEnd::Shutdown => {
                debug!(upstream = %url, "Federation link shut down");
                return;
            }
            LinkEnd::Lost(reason) => {
                warn!(upstream = %url, "Federation link lost: {reason}");
            }
        }

        socket = loop {
            // Nothing queued during the outage is delivered later.
            if drain(&mut outbound) || inbound.is_closed() {
                debug!(upstream = %url, "Federation link shut down while reconnecting");
                return;
            }

            sleep(reconnect_interval).await;
            if drain(&mut outbound) || inbound.is_closed() {
                debug!(upstream = %url, "Federation link shut down while reconnecting");
                return;
            }
            match dial(&url).await {
                Ok(socket) => {
                    info!(upstream = %url, "Federation link re-established");
                    break socket;
                }
                Err(e) => {
                    warn!("Can't reach upstream, retrying in {reconnect_interval:?}: {e}");
                }
            }
        };
    }
}

/// Discard queued frames. True once the link handle has been dropped.
fn drain(outbound: &mut mpsc::Receiver<String>) -> bool {
    loop {
        match outbound.try_recv() {
            Ok(_) => continue,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => return true,
        }
    }
}

async fn pump(
    socket: UpstreamSocket,
    outbound: &mut mpsc::Receiver<String>,
    inbound: &mpsc::Sender<String>,
) -> LinkEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            msg = stream.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return LinkEnd::Lost("closed by upstream".into());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                };

                // The local broker emits its own keep-alive.
                if is_keep_alive(frame.as_bytes()) {
                    continue;
                }
                if inbound.send(frame).await.is_err() {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            }
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        return LinkEnd::Lost(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::extract::WebSocketUpgrade;
    use axum::extract::ws::{Message as WsMessage, WebSocket};
    use axum::routing::get;
    use sockettalk_common::endpoint::WS_ROUTE;
    use sockettalk_common::envelope::KEEP_ALIVE;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Error as WsError;
    use tokio_tungstenite::tungstenite::error::UrlError;

    /// Fake upstream: greets every connection, records what it receives,
    /// and hangs up right after the greeting when `hang_up` is set.
    async fn spawn_upstream(
        hang_up: bool,
    ) -> (BaseUrl, mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            WS_ROUTE,
            get(move |ws: WebSocketUpgrade| {
                let tx = tx.clone();
                async move { ws.on_upgrade(move |socket| serve(socket, tx, hang_up)) }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (BaseUrl::parse(&format!("http://{addr}")).unwrap(), rx, server)
    }

    async fn serve(mut socket: WebSocket, tx: mpsc::UnboundedSender<String>, hang_up: bool) {
        let _ = socket.send(WsMessage::Text(KEEP_ALIVE.into())).await;
        let _ = socket.send(WsMessage::Text("from-upstream".into())).await;
        if hang_up {
            let _ = socket.send(WsMessage::Close(None)).await;
            return;
        }
        while let Some(Ok(WsMessage::Text(text))) = socket.recv().await {
            let _ = tx.send(text.as_str().to_owned());
        }
    }

    #[tokio::test]
    async fn first_dial_failure_is_an_error() {
        let upstream = BaseUrl::parse("http://127.0.0.1:1").unwrap();
        let result = FederationLink::connect(upstream, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(FederationError::Dial { .. })));
    }

    #[tokio::test]
    async fn relays_frames_both_ways_and_skips_keep_alive() {
        let (upstream, mut received, _server) = spawn_upstream(false).await;
        let (link, mut inbound) = FederationLink::connect(upstream, Duration::from_millis(50))
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(5), inbound.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("from-upstream"));

        link.forward("from-downstream".into());
        let got = timeout(Duration::from_secs(5), received.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("from-downstream"));
    }

    #[tokio::test]
    async fn reconnects_after_upstream_hangs_up() {
        let (upstream, _received, _server) = spawn_upstream(true).await;
        let (_link, mut inbound) = FederationLink::connect(upstream, Duration::from_millis(50))
            .await
            .unwrap();

        for _ in 0..2 {
            let frame = timeout(Duration::from_secs(5), inbound.recv()).await.unwrap();
            assert_eq!(frame.as_deref(), Some("from-upstream"));
        }
    }

    #[tokio::test]
    async fn dropped_link_stops_redialing_during_outage() {
        let (upstream, _received, server) = spawn_upstream(true).await;
        let (link, mut inbound) = FederationLink::connect(upstream, Duration::from_millis(20))
            .await
            .unwrap();
        let first = timeout(Duration::from_secs(5), inbound.recv()).await.unwrap();
        assert_eq!(first.as_deref(), Some("from-upstream"));

        // Upstream gone for good while the receiver is still held, the way
        // the broker's injector holds it between frames.
        server.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(link);

        timeout(Duration::from_secs(5), async {
            while inbound.recv().await.is_some() {}
        })
        .await
        .expect("link task kept redialing after its handle was dropped");
    }

    #[tokio::test]
    async fn https_upstream_dials_through_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let upstream = BaseUrl::parse(&format!("https://{addr}")).unwrap();
        let result = FederationLink::connect(upstream, Duration::from_millis(10)).await;
        match result {
            Err(FederationError::Dial { url, source }) => {
                assert!(url.starts_with("wss://"));
                assert!(
                    !matches!(*source, WsError::Url(UrlError::TlsFeatureNotEnabled)),
                    "wss dial was refused before TLS: {source}"
                );
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("plain TCP peer accepted a TLS handshake"),
        }
    }
}
