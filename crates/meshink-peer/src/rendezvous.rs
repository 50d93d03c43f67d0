//! Topic rendezvous over WebSocket.
//!
//! Every node serves `GET /topic/{hex}` and dials its bootstrap peers at the
//! same path. Either side opens with a hello frame:
//! ```json
//! { "type": "hello", "peer": "<peer id>", "topic": "<hex>" }
//! ```
//! After both hellos check out the stream is handed to the replication
//! engine. From then on every frame is a canvas envelope.

use crate::config::PeerConfig;
use crate::link::{run_writer, ChannelLink};
use anyhow::{bail, Context, Result};
use axum::{
    extract::{
        ws::{self, WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use meshink_core::wire::MAX_FRAME_SIZE;
use meshink_core::{CanvasHost, ReplicationEngine, Topic};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite;
use tracing::{debug, error, info, warn};

/// How long either side may take to send its hello.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Control {
    Hello { peer: String, topic: String },
}

/// A frame read off either WebSocket implementation.
enum Incoming {
    Data(Vec<u8>),
    Control,
    Close,
}

impl From<ws::Message> for Incoming {
    fn from(msg: ws::Message) -> Self {
        match msg {
            ws::Message::Text(text) => Incoming::Data(text.as_str().as_bytes().to_vec()),
            ws::Message::Binary(data) => Incoming::Data(data.to_vec()),
            ws::Message::Ping(_) | ws::Message::Pong(_) => Incoming::Control,
            ws::Message::Close(_) => Incoming::Close,
        }
    }
}

impl From<tungstenite::Message> for Incoming {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(text) => Incoming::Data(text.as_str().as_bytes().to_vec()),
            tungstenite::Message::Binary(data) => Incoming::Data(data.to_vec()),
            tungstenite::Message::Ping(_)
            | tungstenite::Message::Pong(_)
            | tungstenite::Message::Frame(_) => Incoming::Control,
            tungstenite::Message::Close(_) => Incoming::Close,
        }
    }
}

// Envelopes are JSON, so they go out as text frames.
fn axum_frame(frame: Vec<u8>) -> ws::Message {
    match String::from_utf8(frame) {
        Ok(text) => ws::Message::Text(text.into()),
        Err(e) => ws::Message::Binary(e.into_bytes().into()),
    }
}

fn tungstenite_frame(frame: Vec<u8>) -> tungstenite::Message {
    match String::from_utf8(frame) {
        Ok(text) => tungstenite::Message::Text(text.into()),
        Err(e) => tungstenite::Message::Binary(e.into_bytes().into()),
    }
}

/// State shared by the server, dialers and every connection task.
struct Shared {
    engine: Arc<ReplicationEngine>,
    topic: Topic,
    peer_id: String,
    queue: usize,
    write_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

/// A running peer: listening for the topic and replicating one canvas.
pub struct Node {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
}

impl Node {
    /// Bind the listener, dial every bootstrap peer and start replicating `canvas`.
    ///
    /// Bootstrap peers that cannot be reached are logged and skipped.
    pub async fn start(config: PeerConfig, canvas: Arc<dyn CanvasHost>) -> Result<Node> {
        let topic = config.topic()?;
        let engine = ReplicationEngine::new(canvas);
        engine.listen_for_local_changes();

        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            engine,
            topic,
            peer_id: config.peer_id(),
            queue: config.outbound_queue as usize,
            write_timeout: config.write_timeout(),
            shutdown,
        });

        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        let local_addr = listener.local_addr()?;

        let app = Router::new()
            .route("/topic/{topic}", get(topic_handler))
            .route("/health", get(health))
            .with_state(shared.clone());

        let mut stop = shared.shutdown.subscribe();
        let server = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { stopped(&mut stop).await })
            .await;
            if let Err(e) = result {
                error!("server stopped: {:#}", anyhow::Error::new(e));
            }
        });

        info!(
            "peer {} listening on ws://{}/topic/{}",
            shared.peer_id, local_addr, topic
        );

        let node = Node {
            shared,
            local_addr,
            server,
        };
        for peer in &config.peers {
            if let Err(e) = node.dial(peer).await {
                warn!("bootstrap peer unreachable: {:#}", e);
            }
        }
        Ok(node)
    }

    /// Connect to another node serving the same topic.
    ///
    /// Returns once the WebSocket is open; the hello exchange and the
    /// connection itself run in the background.
    pub async fn dial(&self, base_url: &str) -> Result<()> {
        let url = format!(
            "{}/topic/{}",
            base_url.trim_end_matches('/'),
            self.shared.topic
        );
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect to {}", url))?;
        debug!("dialed {}", url);

        let (sink, stream) = socket.split();
        let sink = sink.with(|frame: Vec<u8>| {
            future::ready(Ok::<_, tungstenite::Error>(tungstenite_frame(frame)))
        });
        let stream = stream.map(|msg| msg.map(Incoming::from));
        tokio::spawn(run_connection(self.shared.clone(), sink, stream, url));
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL other nodes can pass to [`Node::dial`].
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn topic(&self) -> Topic {
        self.shared.topic
    }

    pub fn peer_id(&self) -> &str {
        &self.shared.peer_id
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine> {
        &self.shared.engine
    }

    /// Number of connections that completed the handshake and are still open.
    pub fn peer_count(&self) -> usize {
        self.shared.engine.registry().len()
    }

    /// Stop accepting, close every connection and unregister it.
    pub async fn shutdown(self) {
        self.shared.shutdown.send_replace(true);
        let closed = self.shared.engine.registry().clear();
        self.server.abort();
        let _ = self.server.await;
        info!("left topic {} ({} connections closed)", self.shared.topic, closed);
    }
}

/// Resolves once shutdown has been requested, even if that happened before
/// the receiver was created.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn topic_handler(
    Path(topic): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(shared): State<Arc<Shared>>,
    ws: WebSocketUpgrade,
) -> Response {
    if topic.parse::<Topic>().ok() != Some(shared.topic) {
        debug!("{} asked for unknown topic {:?}", addr, topic);
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| accept(shared, socket, addr))
}

async fn accept(shared: Arc<Shared>, socket: WebSocket, addr: SocketAddr) {
    debug!("accepted connection from {}", addr);
    let (sink, stream) = socket.split();
    let sink = sink.with(|frame: Vec<u8>| future::ready(Ok::<_, axum::Error>(axum_frame(frame))));
    let stream = stream.map(|msg| msg.map(Incoming::from));
    run_connection(shared, sink, stream, addr.to_string()).await;
}

/// Handshake, then feed inbound frames to the engine until the stream ends,
/// the writer gives up or the node shuts down.
async fn run_connection<Tx, Rx, E>(shared: Arc<Shared>, mut sink: Tx, mut stream: Rx, origin: String)
where
    Tx: Sink<Vec<u8>> + Unpin + Send + 'static,
    Tx::Error: StdError + Send + Sync + 'static,
    Rx: Stream<Item = Result<Incoming, E>> + Unpin + Send,
    E: StdError + Send + Sync + 'static,
{
    let mut stop = shared.shutdown.subscribe();
    let remote = match handshake(&shared, &mut sink, &mut stream).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!("rejected connection {}: {:#}", origin, e);
            let _ = timeout(HANDSHAKE_TIMEOUT, sink.close()).await;
            return;
        }
    };
    if *stop.borrow_and_update() {
        debug!("dropping {} from {}: shutting down", remote, origin);
        let _ = timeout(HANDSHAKE_TIMEOUT, sink.close()).await;
        return;
    }

    let engine = shared.engine.clone();
    let (link, queue) = ChannelLink::new(remote.clone(), shared.queue);
    let id = engine.attach(Arc::new(link));
    let mut writer = tokio::spawn(run_writer(engine.clone(), id, queue, sink, shared.write_timeout));

    // Also catches a shutdown that raced `attach`.
    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = stopped(&mut stop) => break,
            _ = &mut writer => {
                debug!("writer for {} ended, closing reader", id);
                break;
            }
        };
        match next {
            Some(Ok(Incoming::Data(frame))) => {
                // Errors are per frame and already logged by the engine.
                if let Err(e) = engine.ingest(id, &frame).await {
                    debug!("frame from {} not applied: {:#}", remote, anyhow::Error::new(e));
                }
            }
            Some(Ok(Incoming::Control)) => {}
            Some(Ok(Incoming::Close)) | None => break,
            Some(Err(e)) => {
                warn!("connection {} to {} failed: {:#}", id, remote, anyhow::Error::new(e));
                break;
            }
        }
    }
    engine.detach(id);
}

async fn handshake<Tx, Rx, E>(shared: &Shared, sink: &mut Tx, stream: &mut Rx) -> Result<String>
where
    Tx: Sink<Vec<u8>> + Unpin,
    Tx::Error: StdError + Send + Sync + 'static,
    Rx: Stream<Item = Result<Incoming, E>> + Unpin,
    E: StdError + Send + Sync + 'static,
{
    let hello = serde_json::to_vec(&Control::Hello {
        peer: shared.peer_id.clone(),
        topic: shared.topic.to_hex(),
    })?;
    timeout(HANDSHAKE_TIMEOUT, sink.send(hello))
        .await
        .context("timed out sending hello")?
        .context("failed to send hello")?;

    let first = timeout(HANDSHAKE_TIMEOUT, first_data_frame(stream))
        .await
        .context("timed out waiting for hello")??;
    let Control::Hello { peer, topic } =
        serde_json::from_slice::<Control>(&first).context("first frame was not a hello")?;

    if topic.parse::<Topic>().ok() != Some(shared.topic) {
        bail!("peer {} is on topic {}", peer, topic);
    }
    if peer == shared.peer_id {
        bail!("connected to ourselves");
    }
    Ok(peer)
}

async fn first_data_frame<Rx, E>(stream: &mut Rx) -> Result<Vec<u8>>
where
    Rx: Stream<Item = Result<Incoming, E>> + Unpin,
    E: StdError + Send + Sync + 'static,
{
    while let Some(msg) = stream.next().await {
        match msg.context("connection failed before hello")? {
            Incoming::Data(data) => return Ok(data),
            Incoming::Control => {}
            Incoming::Close => break,
        }
    }
    bail!("closed before hello")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::GatedSink;
    use futures_util::stream;
    use meshink_core::{SharedCanvas, Snapshot};
    use std::io;

    fn shared(write_timeout: Duration) -> Arc<Shared> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Shared {
            engine: ReplicationEngine::new(Arc::new(SharedCanvas::new())),
            topic: Topic::random(),
            peer_id: "local".into(),
            queue: 8,
            write_timeout,
            shutdown,
        })
    }

    /// A remote that sends its hello and then goes quiet without closing.
    fn quiet_remote(topic: Topic) -> impl Stream<Item = Result<Incoming, io::Error>> + Unpin + Send {
        let hello = serde_json::to_vec(&Control::Hello {
            peer: "remote".into(),
            topic: topic.to_hex(),
        })
        .unwrap();
        stream::iter(vec![Ok(Incoming::Data(hello))]).chain(stream::pending())
    }

    async fn wait_for_peers(shared: &Shared, count: usize) {
        let reached = timeout(Duration::from_secs(2), async {
            while shared.engine.registry().len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reached.is_ok(), "registry never reached {} peers", count);
    }

    #[tokio::test]
    async fn test_reader_stops_when_writer_gives_up() {
        let shared = shared(Duration::from_millis(50));
        // Takes our hello, then never accepts another frame.
        let sink = GatedSink::accepting(1);
        let stream = quiet_remote(shared.topic);
        let task = tokio::spawn(run_connection(shared.clone(), sink.clone(), stream, "test".into()));

        wait_for_peers(&shared, 1).await;
        shared.engine.broadcast(&Snapshot::default());

        let finished = timeout(Duration::from_secs(2), task).await;
        assert!(finished.is_ok(), "reader outlived its writer");
        assert_eq!(sink.sent().len(), 1);
        assert!(shared.engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_during_handshake_does_not_register() {
        let shared = shared(Duration::from_secs(1));
        let (remote_tx, remote_rx) = tokio::sync::mpsc::channel::<Result<Incoming, io::Error>>(1);
        let stream = Box::pin(stream::unfold(remote_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        let sink = GatedSink::open();
        let task = tokio::spawn(run_connection(shared.clone(), sink.clone(), stream, "test".into()));

        // Our hello is out; the remote's has not arrived yet.
        let sent = timeout(Duration::from_secs(2), async {
            while sink.sent().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(sent.is_ok());

        shared.shutdown.send_replace(true);
        shared.engine.registry().clear();

        let hello = serde_json::to_vec(&Control::Hello {
            peer: "remote".into(),
            topic: shared.topic.to_hex(),
        })
        .unwrap();
        remote_tx.send(Ok(Incoming::Data(hello))).await.unwrap();

        let finished = timeout(Duration::from_secs(2), task).await;
        assert!(finished.is_ok(), "connection kept running after shutdown");
        assert!(shared.engine.registry().is_empty());
        drop(remote_tx);
    }

    #[test]
    fn test_hello_wire_shape() {
        let hello = Control::Hello {
            peer: "abc".into(),
            topic: "00".into(),
        };
        let value = serde_json::to_value(&hello).unwrap();
        assert_eq!(value, serde_json::json!({"type": "hello", "peer": "abc", "topic": "00"}));
    }

    #[test]
    fn test_envelope_is_not_a_hello() {
        let frame = br#"{"kind":"canvas-state","payload":[]}"#;
        assert!(serde_json::from_slice::<Control>(frame).is_err());
    }

    #[test]
    fn test_text_and_binary_frames_carry_the_same_bytes() {
        let text = Incoming::from(tungstenite::Message::Text("{}".into()));
        let binary = Incoming::from(tungstenite::Message::Binary(b"{}".to_vec().into()));
        assert!(matches!(text, Incoming::Data(ref d) if d == b"{}"));
        assert!(matches!(binary, Incoming::Data(ref d) if d == b"{}"));
    }

    #[test]
    fn test_utf8_frames_go_out_as_text() {
        assert!(matches!(tungstenite_frame(b"{}".to_vec()), tungstenite::Message::Text(_)));
        assert!(matches!(tungstenite_frame(vec![0xff]), tungstenite::Message::Binary(_)));
        assert!(matches!(axum_frame(b"{}".to_vec()), ws::Message::Text(_)));
    }
}
