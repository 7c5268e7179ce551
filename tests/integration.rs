//! Integration tests for scene-remote.
//!
//! These tests run a full [`Service`] on an ephemeral loopback port and talk
//! to it through plain TCP clients.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::Duration;

use scene_remote::codec::JsonObject;
use scene_remote::protocol::{build_frame, build_json_frame, FrameBuffer};
use scene_remote::studio::{EventBus, MemoryStudio, SceneItem, Studio};
use scene_remote::Service;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const ATTEMPTS: usize = 200;
const PAUSE: Duration = Duration::from_millis(5);

struct TestClient {
    stream: TcpStream,
    buffer: FrameBuffer,
    inbox: VecDeque<JsonObject>,
    closed: bool,
}

impl TestClient {
    async fn connect(service: &Service) -> Self {
        Self {
            stream: TcpStream::connect(service.local_addr()).await.unwrap(),
            buffer: FrameBuffer::new(),
            inbox: VecDeque::new(),
            closed: false,
        }
    }

    async fn send(&mut self, value: Value) {
        let frame = build_json_frame(&value).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Read whatever has arrived without waiting.
    fn poll(&mut self) {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    return;
                }
                Ok(n) => self.inbox.extend(self.buffer.push(&chunk[..n]).unwrap()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(_) => {
                    self.closed = true;
                    return;
                }
            }
        }
    }
}

async fn start() -> (MemoryStudio, Service) {
    let bus = EventBus::new();
    let studio = MemoryStudio::new(bus.clone());
    studio.add_scene("Intro", vec![SceneItem::new("Camera"), SceneItem::new("Mic")]);
    studio.add_scene("Live", vec![SceneItem::new("Screen")]);

    let service = Service::builder()
        .port(0)
        .build(studio.clone(), studio.clone(), &bus)
        .await
        .unwrap();
    (studio, service)
}

/// Tick the service until `client` has a message.
async fn next_message(service: &mut Service, client: &mut TestClient) -> JsonObject {
    for _ in 0..ATTEMPTS {
        service.tick().await;
        client.poll();
        if let Some(message) = client.inbox.pop_front() {
            return message;
        }
        tokio::time::sleep(PAUSE).await;
    }
    panic!("no message received");
}

/// Tick the service until `client` sees its connection closed.
async fn wait_closed(service: &mut Service, client: &mut TestClient) {
    for _ in 0..ATTEMPTS {
        service.tick().await;
        client.poll();
        if client.closed {
            return;
        }
        tokio::time::sleep(PAUSE).await;
    }
    panic!("connection was not closed");
}

/// Let the service run a few ticks.
async fn settle(service: &mut Service) {
    for _ in 0..5 {
        service.tick().await;
        tokio::time::sleep(PAUSE).await;
    }
}

/// A new client receives every readable item once.
#[tokio::test]
async fn test_snapshot_on_join() {
    let (_studio, mut service) = start().await;
    let mut client = TestClient::connect(&service).await;

    let snapshot = next_message(&mut service, &mut client).await;
    let values = snapshot["values"].as_array().unwrap();
    assert_eq!(values.len(), 21);
    assert_eq!(values[0]["name"], "cpuUsage");
    assert_eq!(values[20]["name"], "transitionDuration");
    assert!(values.iter().all(|v| v["type"] == "set"));
    assert_eq!(service.connection_count(), 1);
}

/// A set is applied and the new value is broadcast to every client,
/// the sender included.
#[tokio::test]
async fn test_set_broadcasts_to_all_clients() {
    let (studio, mut service) = start().await;
    let mut sender = TestClient::connect(&service).await;
    let mut other = TestClient::connect(&service).await;
    next_message(&mut service, &mut sender).await;
    next_message(&mut service, &mut other).await;

    sender
        .send(json!({"values": [{"name": "streaming", "type": "set", "value": 1}]}))
        .await;

    let expected = json!({"values": [{"name": "streaming", "type": "set", "value": true}]});
    let to_sender = next_message(&mut service, &mut sender).await;
    let to_other = next_message(&mut service, &mut other).await;
    assert_eq!(Value::Object(to_sender), expected);
    assert_eq!(Value::Object(to_other), expected);
    assert!(studio.is_streaming());
}

/// A get is answered to the requesting client only.
#[tokio::test]
async fn test_get_scene_list() {
    let (_studio, mut service) = start().await;
    let mut asker = TestClient::connect(&service).await;
    let mut bystander = TestClient::connect(&service).await;
    next_message(&mut service, &mut asker).await;
    next_message(&mut service, &mut bystander).await;

    asker
        .send(json!({"values": [{"name": "sceneList", "type": "get"}]}))
        .await;
    let reply = next_message(&mut service, &mut asker).await;

    assert_eq!(
        reply["values"],
        json!([{
            "name": "sceneList",
            "type": "set",
            "value": [
                {
                    "name": "Intro",
                    "sortIndex": 0,
                    "isCurrent": true,
                    "sourceList": [
                        {"name": "Camera", "isVisible": true, "isLocked": false, "sortIndex": 0},
                        {"name": "Mic", "isVisible": true, "isLocked": false, "sortIndex": 1}
                    ]
                },
                {
                    "name": "Live",
                    "sortIndex": 1,
                    "isCurrent": false,
                    "sourceList": [
                        {"name": "Screen", "isVisible": true, "isLocked": false, "sortIndex": 0}
                    ]
                }
            ]
        }])
    );

    settle(&mut service).await;
    bystander.poll();
    assert!(bystander.inbox.is_empty());
}

/// Unknown names produce no reply entry and keep the connection open.
#[tokio::test]
async fn test_unknown_item_is_ignored() {
    let (_studio, mut service) = start().await;
    let mut client = TestClient::connect(&service).await;
    next_message(&mut service, &mut client).await;

    client
        .send(json!({"values": [
            {"name": "warpDrive", "type": "set", "value": 9},
            {"name": "warpDrive", "type": "get"},
            {"name": "currentScene", "type": "get"}
        ]}))
        .await;
    let reply = next_message(&mut service, &mut client).await;

    assert_eq!(
        reply["values"],
        json!([{"name": "currentScene", "type": "set", "value": "Intro"}])
    );
    assert!(!client.closed);
    assert_eq!(service.connection_count(), 1);
}

/// A malformed frame drops its own connection and nobody else's.
#[tokio::test]
async fn test_malformed_frame_is_isolated() {
    let (_studio, mut service) = start().await;
    let mut bad = TestClient::connect(&service).await;
    let mut good = TestClient::connect(&service).await;
    next_message(&mut service, &mut bad).await;
    next_message(&mut service, &mut good).await;

    bad.stream.write_all(&build_frame(b"[1,2,3]").unwrap()).await.unwrap();
    wait_closed(&mut service, &mut bad).await;
    assert_eq!(service.connection_count(), 1);

    good.send(json!({"values": [{"name": "transitionDuration", "type": "get"}]}))
        .await;
    let reply = next_message(&mut service, &mut good).await;
    assert_eq!(reply["values"][0]["value"], json!(300));
}

/// Silent clients are dropped once the keep-alive window passes.
#[tokio::test]
async fn test_keep_alive_expiry() {
    let bus = EventBus::new();
    let studio = MemoryStudio::new(bus.clone());
    let mut service = Service::builder()
        .port(0)
        .keep_alive(Duration::from_millis(100))
        .build(studio.clone(), studio, &bus)
        .await
        .unwrap();

    let mut client = TestClient::connect(&service).await;
    next_message(&mut service, &mut client).await;
    assert_eq!(service.connection_count(), 1);

    wait_closed(&mut service, &mut client).await;
    assert_eq!(service.connection_count(), 0);
}

/// Host-side changes reach every client without a request.
#[tokio::test]
async fn test_host_change_is_broadcast() {
    let (mut studio, mut service) = start().await;
    let mut client = TestClient::connect(&service).await;
    next_message(&mut service, &mut client).await;

    studio.set_transition_duration(750);

    let first = next_message(&mut service, &mut client).await;
    let second = next_message(&mut service, &mut client).await;
    assert_eq!(
        Value::Object(first),
        json!({"values": [{"name": "transitionDuration", "type": "set", "value": 750}]})
    );
    assert_eq!(second["values"][0]["name"], "transitionsList");
    assert_eq!(second["values"][0]["value"][1]["duration"], json!(750));
}

/// Stopping the service closes every client.
#[tokio::test]
async fn test_stop_closes_clients() {
    let (_studio, mut service) = start().await;
    let mut client = TestClient::connect(&service).await;
    next_message(&mut service, &mut client).await;

    service.stop().await;
    for _ in 0..ATTEMPTS {
        client.poll();
        if client.closed {
            break;
        }
        tokio::time::sleep(PAUSE).await;
    }
    assert!(client.closed);
    assert_eq!(service.connection_count(), 0);
}
