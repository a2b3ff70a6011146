// Event-channel lifecycle tests against an in-process WebSocket server:
// identity announced on every connect, fan-out to subscribers, idempotent
// teardown.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use parley::sync::{ClientEvent, ConnectionManager, ServerEvent};

/// Minimal stand-in for the realtime server: records every JSON frame a
/// client sends, forwards pushed frames to every connected client, and can
/// drop all connections on demand to force a reconnect.
async fn spawn_server() -> (
    SocketAddr,
    mpsc::UnboundedReceiver<Value>,
    broadcast::Sender<String>,
    broadcast::Sender<()>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let (push_tx, _) = broadcast::channel::<String>(16);
    let (kick_tx, _) = broadcast::channel::<()>(4);

    let push = push_tx.clone();
    let kick = kick_tx.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            let (mut sink, mut source) = ws.split();
            let seen = seen_tx.clone();
            let mut push_rx = push.subscribe();
            let mut kick_rx = kick.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        frame = source.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                    let _ = seen.send(value);
                                }
                            }
                            Some(Ok(_)) => {}
                            _ => return,
                        },
                        pushed = push_rx.recv() => match pushed {
                            Ok(frame) => {
                                if sink.send(WsMessage::Text(frame)).await.is_err() {
                                    return;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(_) => return,
                        },
                        kicked = kick_rx.recv() => match kicked {
                            Ok(()) => {
                                let _ = sink.close().await;
                                return;
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(_) => return,
                        },
                    }
                }
            });
        }
    });

    (addr, seen_rx, push_tx, kick_tx)
}

async fn next_frame(seen: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("server task gone")
}

#[tokio::test]
async fn identity_is_registered_on_connect() {
    let (addr, mut seen, _push, _kick) = spawn_server().await;
    let mut manager = ConnectionManager::new(&format!("http://{}", addr));
    let session = manager.connect("user-1").await.unwrap();

    // Registration is the first frame on the wire.
    let first = next_frame(&mut seen).await;
    assert_eq!(first["type"], "addUser");
    assert_eq!(first["userId"], "user-1");

    // Outbound notifications flow after it.
    session
        .send(ClientEvent::TypingStart {
            to: "user-2".to_string(),
        })
        .await
        .unwrap();
    let next = next_frame(&mut seen).await;
    assert_eq!(next["type"], "typing:start");
    assert_eq!(next["to"], "user-2");

    manager.disconnect().await;
}

#[tokio::test]
async fn server_events_reach_every_subscriber() {
    let (addr, mut seen, push, _kick) = spawn_server().await;
    let mut manager = ConnectionManager::new(&format!("http://{}", addr));
    let session = manager.connect("user-1").await.unwrap();

    let mut first_rx = session.subscribe();
    let mut second_rx = session.subscribe();

    // Wait for registration so we know the socket is fully up.
    let _ = next_frame(&mut seen).await;

    push.send(r#"{"type":"getOnlineUsers","userIds":["a","b"]}"#.to_string())
        .unwrap();

    for rx in [&mut first_rx, &mut second_rx] {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        match event {
            ServerEvent::OnlineUsers { user_ids } => assert_eq!(user_ids, vec!["a", "b"]),
            other => panic!("expected presence snapshot, got {:?}", other),
        }
    }

    manager.disconnect().await;
}

#[tokio::test]
async fn identity_is_reregistered_after_reconnect() {
    let (addr, mut seen, _push, kick) = spawn_server().await;
    let mut manager = ConnectionManager::new(&format!("http://{}", addr));
    let _session = manager.connect("user-9").await.unwrap();

    let first = next_frame(&mut seen).await;
    assert_eq!(first["type"], "addUser");

    // Drop the connection server-side; the supervisor must dial back and
    // announce the identity again without being asked.
    kick.send(()).unwrap();

    let second = timeout(Duration::from_secs(10), seen.recv())
        .await
        .expect("client did not reconnect")
        .unwrap();
    assert_eq!(second["type"], "addUser");
    assert_eq!(second["userId"], "user-9");

    manager.disconnect().await;
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (addr, mut seen, _push, _kick) = spawn_server().await;
    let mut manager = ConnectionManager::new(&format!("http://{}", addr));
    let session = manager.connect("user-1").await.unwrap();
    let _ = next_frame(&mut seen).await;

    session.disconnect().await;
    session.disconnect().await;

    // Once the supervisor has wound down, outbound sends are refused.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session
        .send(ClientEvent::TypingStop {
            to: "user-2".to_string(),
        })
        .await
        .is_err());
}

#[tokio::test]
async fn connecting_twice_replaces_the_session() {
    let (addr, mut seen, _push, _kick) = spawn_server().await;
    let mut manager = ConnectionManager::new(&format!("http://{}", addr));

    let first_session = manager.connect("user-1").await.unwrap();
    let first = next_frame(&mut seen).await;
    assert_eq!(first["userId"], "user-1");

    // One live session per identity: the manager tears down the old one
    // before the new connect.
    let _second_session = manager.connect("user-1").await.unwrap();
    let second = next_frame(&mut seen).await;
    assert_eq!(second["type"], "addUser");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(first_session
        .send(ClientEvent::TypingStop {
            to: "user-2".to_string(),
        })
        .await
        .is_err());

    manager.disconnect().await;
}
