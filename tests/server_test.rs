//! End-to-end tests of the document server over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use rga_sync::Rga;
use rga_sync::server::{
    ClientMessage, DocumentRegistry, MemoryStore, ServerConfig, ServerMessage, SnapshotStore,
    create_router,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(store: Arc<MemoryStore>) -> (SocketAddr, Arc<DocumentRegistry>) {
    let registry = Arc::new(DocumentRegistry::new(&ServerConfig::default(), store));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(registry.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, registry)
}

/// Minimal HTTP/1.1 client, returns status code and body.
async fn http(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.unwrap_or("");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    timeout(WAIT, stream.read_to_string(&mut raw))
        .await
        .unwrap()
        .unwrap();
    let status = raw[9..12].parse().unwrap();
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn connect(addr: SocketAddr, document: Uuid) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws/{document}"))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, message: &ClientMessage) {
    let json = serde_json::to_string(message).unwrap();
    client.send(Message::Text(json)).await.unwrap();
}

async fn receive(client: &mut Client) -> ServerMessage {
    loop {
        let message = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for the server")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_health_and_document_lifecycle() {
    let (addr, registry) = spawn_server(Arc::new(MemoryStore::new())).await;

    let (status, body) = http(addr, "GET", "/health", None).await;
    assert_eq!(status, 200);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "ok");

    let (status, body) = http(addr, "POST", "/documents", Some(r#"{"title":"draft"}"#)).await;
    assert_eq!(status, 201);
    let created: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(created["title"], "draft");
    let id: Uuid = created["documentId"].as_str().unwrap().parse().unwrap();

    let (status, body) = http(addr, "GET", &format!("/documents/{id}"), None).await;
    assert_eq!(status, 200);
    let document: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(document["content"], "");

    let (status, _) = http(addr, "POST", &format!("/documents/{id}/evict"), None).await;
    assert_eq!(status, 204);
    assert_eq!(registry.active_count(), 0);

    let (status, body) = http(addr, "GET", "/documents", None).await;
    assert_eq!(status, 200);
    let listed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["active"], false);

    let (status, body) = http(addr, "GET", &format!("/documents/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, 404);
    assert!(body.contains("not found"));
}

#[tokio::test]
async fn test_sessions_exchange_operations() {
    let store = Arc::new(MemoryStore::new());
    let (addr, registry) = spawn_server(store.clone()).await;
    let id = registry.create(None).unwrap().lock().id();

    let mut first = connect(addr, id).await;
    let mut second = connect(addr, id).await;

    let ServerMessage::Init { snapshot, content, .. } = receive(&mut first).await else {
        panic!("expected init");
    };
    assert_eq!(content, "");
    assert!(matches!(receive(&mut second).await, ServerMessage::Init { .. }));

    // A positional edit performed by the server.
    send(&mut first, &ClientMessage::InsertAt { position: 0, value: 'h' }).await;
    let ServerMessage::Ack { operations } = receive(&mut first).await else {
        panic!("expected ack");
    };
    assert_eq!(operations.len(), 1);
    assert_eq!(
        receive(&mut second).await,
        ServerMessage::Operations { operations: operations.clone() }
    );

    // An operation produced by a client-side replica.
    let mut local = Rga::new("client");
    local.load_state(snapshot).unwrap();
    local.apply_batch(operations);
    let op = local.insert_at_position('i', 1);
    send(&mut second, &ClientMessage::Operation { operation: op.clone() }).await;
    assert_eq!(
        receive(&mut second).await,
        ServerMessage::Ack { operations: vec![op.clone()] }
    );
    assert_eq!(
        receive(&mut first).await,
        ServerMessage::Operations { operations: vec![op] }
    );

    send(&mut first, &ClientMessage::GetContent).await;
    assert_eq!(
        receive(&mut first).await,
        ServerMessage::Content { content: "hi".to_string() }
    );

    // Every accepted edit is persisted.
    assert!(store.load(id).unwrap().is_some());
    let (status, body) = http(addr, "GET", &format!("/documents/{id}/metrics"), None).await;
    assert_eq!(status, 200);
    let metrics: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(metrics["operationCount"], 2);
    assert_eq!(metrics["insertOperations"], 2);
}

#[tokio::test]
async fn test_invalid_messages_keep_the_session_open() {
    let (addr, registry) = spawn_server(Arc::new(MemoryStore::new())).await;
    let id = registry.create(None).unwrap().lock().id();

    let mut client = connect(addr, id).await;
    receive(&mut client).await;

    client.send(Message::Text("{\"type\":\"bogus\"}".to_string())).await.unwrap();
    assert!(matches!(receive(&mut client).await, ServerMessage::Error { .. }));

    send(&mut client, &ClientMessage::DeleteAt { position: 3 }).await;
    assert_eq!(
        receive(&mut client).await,
        ServerMessage::Ack { operations: Vec::new() }
    );

    send(&mut client, &ClientMessage::Sync).await;
    assert!(matches!(
        receive(&mut client).await,
        ServerMessage::Init { document_id, .. } if document_id == id
    ));
}

#[tokio::test]
async fn test_unknown_document_is_refused() {
    let (addr, _) = spawn_server(Arc::new(MemoryStore::new())).await;
    let url = format!("ws://{addr}/ws/{}", Uuid::new_v4());
    assert!(connect_async(url).await.is_err());
}
