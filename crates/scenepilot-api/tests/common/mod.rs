// In-process control surface speaking the Hello/Identify/Request protocol.

#![allow(clippy::unwrap_used, dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use scenepilot_api::ConnectionConfig;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

// ── Canned replies ──────────────────────────────────────────────────

pub enum Reply {
    Data(Value),
    Empty,
    Fail(u16, &'static str),
    Silent,
}

pub fn default_responder(request_type: &str) -> Reply {
    match request_type {
        "GetVersion" => Reply::Data(json!({
            "obsVersion": "30.1.2",
            "obsWebSocketVersion": "5.4.2",
            "rpcVersion": 1,
            "platform": "linux",
            "availableRequests": ["GetVersion", "GetSceneList"]
        })),
        "GetSceneList" => Reply::Data(json!({
            "currentProgramSceneName": "Default Scene",
            "currentPreviewSceneName": null,
            "scenes": [
                { "sceneIndex": 0, "sceneName": "Happy Scene" },
                { "sceneIndex": 1, "sceneName": "Calm Scene" },
                { "sceneIndex": 2, "sceneName": "Default Scene" }
            ]
        })),
        "GetCurrentProgramScene" => Reply::Data(json!({
            "currentProgramSceneName": "Default Scene"
        })),
        "Broken" => Reply::Fail(600, "No source was found by the name of `Missing`"),
        "Slow" => Reply::Silent,
        _ => Reply::Empty,
    }
}

#[derive(Clone)]
enum Push {
    Event(String, Value),
    Drop,
}

// ── MockSurface ─────────────────────────────────────────────────────

struct Shared {
    accepted: AtomicUsize,
    reject_handshake: AtomicBool,
    require_auth: bool,
    responder: fn(&str) -> Reply,
    frames: Mutex<Vec<Value>>,
    push_tx: broadcast::Sender<Push>,
}

pub struct MockSurface {
    pub addr: SocketAddr,
    shared: Arc<Shared>,
}

impl MockSurface {
    pub async fn start() -> Self {
        Self::start_with(false, default_responder).await
    }

    pub async fn start_with(require_auth: bool, responder: fn(&str) -> Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push_tx, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            accepted: AtomicUsize::new(0),
            reject_handshake: AtomicBool::new(false),
            require_auth,
            responder,
            frames: Mutex::new(Vec::new()),
            push_tx,
        });

        let accept_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_shared.accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
            }
        });

        Self { addr, shared }
    }

    /// Client config pointed at this surface with fast test timings.
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: "127.0.0.1".into(),
            port: self.addr.port(),
            connect_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::ZERO,
            response_timeout: Duration::from_secs(2),
            max_reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_millis(20),
            reconnect_backoff: 2.0,
            ..ConnectionConfig::default()
        }
    }

    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    pub fn reject_handshakes(&self, reject: bool) {
        self.shared.reject_handshake.store(reject, Ordering::SeqCst);
    }

    pub fn push_event(&self, event_type: &str, data: Value) {
        let _ = self
            .shared
            .push_tx
            .send(Push::Event(event_type.to_owned(), data));
    }

    /// Close every open connection from the surface side.
    pub fn drop_connections(&self) {
        let _ = self.shared.push_tx.send(Push::Drop);
    }

    /// Every inbound frame with the given op code, in arrival order.
    pub fn frames(&self, op: u64) -> Vec<Value> {
        self.shared
            .frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f["op"].as_u64() == Some(op))
            .cloned()
            .collect()
    }

    /// `requestType` of every request received, in order.
    pub fn request_types(&self) -> Vec<String> {
        self.frames(6)
            .iter()
            .map(|f| f["d"]["requestType"].as_str().unwrap().to_owned())
            .collect()
    }
}

fn frame(op: u8, d: Value) -> Message {
    Message::text(json!({ "op": op, "d": d }).to_string())
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let mut push_rx = shared.push_tx.subscribe();

    let mut hello = json!({ "obsWebSocketVersion": "5.4.2", "rpcVersion": 1 });
    if shared.require_auth {
        hello["authentication"] = json!({ "challenge": "ch", "salt": "sa" });
    }
    if ws.send(frame(0, hello)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = ws.next() => {
                let Some(Ok(Message::Text(text))) = msg else {
                    return;
                };
                let value: Value = serde_json::from_str(&text).unwrap();
                shared.frames.lock().unwrap().push(value.clone());

                match value["op"].as_u64() {
                    Some(1) => {
                        if shared.reject_handshake.load(Ordering::SeqCst) {
                            let _ = ws.close(None).await;
                            return;
                        }
                        let _ = ws.send(frame(2, json!({ "negotiatedRpcVersion": 1 }))).await;
                    }
                    Some(6) => {
                        let d = &value["d"];
                        let request_type = d["requestType"].as_str().unwrap_or_default();
                        let mut response = json!({
                            "requestType": request_type,
                            "requestId": d["requestId"],
                        });
                        match (shared.responder)(request_type) {
                            Reply::Silent => continue,
                            Reply::Empty => {
                                response["requestStatus"] = json!({ "result": true, "code": 100 });
                            }
                            Reply::Data(data) => {
                                response["requestStatus"] = json!({ "result": true, "code": 100 });
                                response["responseData"] = data;
                            }
                            Reply::Fail(code, comment) => {
                                response["requestStatus"] =
                                    json!({ "result": false, "code": code, "comment": comment });
                            }
                        }
                        let _ = ws.send(frame(7, response)).await;
                    }
                    _ => {}
                }
            }
            push = push_rx.recv() => match push {
                Ok(Push::Event(event_type, data)) => {
                    let event = json!({ "eventType": event_type, "eventIntent": 4, "eventData": data });
                    let _ = ws.send(frame(5, event)).await;
                }
                Ok(Push::Drop) | Err(_) => {
                    let _ = ws.close(None).await;
                    return;
                }
            },
        }
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
