//! End-to-end tests against a real server on ephemeral ports.

use std::sync::Arc;
use std::time::Duration;

use fitrelay_server::{start, ServerHandle};
use fitrelay_settings::{ServerSettings, WsHosting};
use fitrelay_store::{Database, ExerciseStore, SqliteRecordStore};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn settings(ws_hosting: WsHosting) -> ServerSettings {
    ServerSettings {
        host: "127.0.0.1".into(),
        http_port: 0,
        ws_port: Some(0),
        ws_hosting,
        static_dir: "does-not-exist".into(),
        ..ServerSettings::default()
    }
}

async fn memory_server() -> ServerHandle {
    start(
        settings(WsHosting::Dedicated),
        Arc::new(ExerciseStore::memory_only()),
        None,
    )
    .await
    .unwrap()
}

fn ws_url(handle: &ServerHandle) -> String {
    format!("ws://{}/", handle.ws_addr)
}

fn http_url(handle: &ServerHandle, path: &str) -> String {
    format!("http://{}{}", handle.http_addr, path)
}

/// Connect and consume the greeting.
async fn connect(url: &str) -> Socket {
    let (mut socket, _) = connect_async(url).await.unwrap();
    assert_eq!(next_text(&mut socket).await, "WEB_BLUETOOTH_READY");
    socket
}

async fn next_text(socket: &mut Socket) -> String {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    let res = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(res.is_err(), "unexpected frame: {res:?}");
}

async fn send(socket: &mut Socket, text: &str) {
    socket.send(Message::Text(text.into())).await.unwrap();
}

/// Wait until the hub has registered `n` peers.
async fn wait_for_peers(handle: &ServerHandle, n: usize) {
    for _ in 0..100 {
        if handle.hub().connection_count() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} peers, have {}", handle.hub().connection_count());
}

fn saved_record(text: &str) -> Value {
    let json = text
        .strip_prefix("EJERCICIO_GUARDADO:")
        .unwrap_or_else(|| panic!("not a saved notification: {text}"));
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn device_completion_is_relayed_saved_and_listed() {
    let handle = memory_server().await;
    let url = ws_url(&handle);
    let mut device = connect(&url).await;
    let mut viewer = connect(&url).await;
    wait_for_peers(&handle, 2).await;

    send(&mut device, "EJERCICIO_COMPLETADO:squat:10:10:30").await;

    // Viewer: raw relay first, then the saved notification.
    assert_eq!(next_text(&mut viewer).await, "EJERCICIO_COMPLETADO:squat:10:10:30");
    let record = saved_record(&next_text(&mut viewer).await);
    assert_eq!(record["exerciseName"], "squat");
    assert_eq!(record["target"], 10);
    assert_eq!(record["completed"], 10);
    assert_eq!(record["durationSeconds"], 30);
    assert_eq!(record["deviceLabel"], "Arduino-BLE");

    // Sender: only the saved notification.
    let own = saved_record(&next_text(&mut device).await);
    assert_eq!(own["id"], record["id"]);

    let body: Value = reqwest::get(http_url(&handle, "/api/historial"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["source"], "memory");
    assert_eq!(body["data"][0]["exerciseName"], "squat");

    handle.shutdown().await;
}

#[tokio::test]
async fn short_completion_and_status_frames_are_only_relayed() {
    let handle = memory_server().await;
    let url = ws_url(&handle);
    let mut device = connect(&url).await;
    let mut viewer = connect(&url).await;
    wait_for_peers(&handle, 2).await;

    for frame in [
        "BLUETOOTH_CONNECTED",
        "EJERCICIO_INICIADO:squat",
        "EJERCICIO_COMPLETADO:squat:10",
        "hello there",
    ] {
        send(&mut device, frame).await;
        assert_eq!(next_text(&mut viewer).await, frame);
    }
    assert_silent(&mut device).await;
    assert_silent(&mut viewer).await;

    let body: Value = reqwest::get(http_url(&handle, "/api/historial"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], json!([]));

    handle.shutdown().await;
}

#[tokio::test]
async fn relay_skips_closed_peers() {
    let handle = memory_server().await;
    let url = ws_url(&handle);
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;
    wait_for_peers(&handle, 3).await;

    b.close(None).await.unwrap();
    wait_for_peers(&handle, 2).await;

    send(&mut a, "ping-from-a").await;
    assert_eq!(next_text(&mut c).await, "ping-from-a");
    assert_silent(&mut a).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn rest_insert_uppercases_and_notifies_viewers() {
    let handle = memory_server().await;
    let mut viewer = connect(&ws_url(&handle)).await;
    wait_for_peers(&handle, 1).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(http_url(&handle, "/api/ejercicio"))
        .json(&json!({"exerciseName": "squat", "target": 10, "completed": 10, "duration": 30}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["exerciseName"], "SQUAT");
    assert_eq!(body["data"]["deviceLabel"], "Arduino");

    let record = saved_record(&next_text(&mut viewer).await);
    assert_eq!(record["exerciseName"], "SQUAT");
    assert_eq!(record["id"], body["data"]["id"]);

    handle.shutdown().await;
}

#[tokio::test]
async fn rest_insert_rejects_missing_fields() {
    let handle = memory_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(http_url(&handle, "/api/ejercicio"))
        .json(&json!({"exerciseName": "squat", "completed": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Faltan campos requeridos");

    let resp = client
        .post(http_url(&handle, "/api/ejercicio"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // completed = 0 is a valid value.
    let resp = client
        .post(http_url(&handle, "/api/ejercicio"))
        .json(&json!({"ejercicio": "plank", "objetivo": 1, "completado": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    handle.shutdown().await;
}

#[tokio::test]
async fn history_is_newest_first_and_limited() {
    let handle = memory_server().await;
    let client = reqwest::Client::new();
    for name in ["a", "b", "c"] {
        let resp = client
            .post(http_url(&handle, "/api/ejercicio"))
            .json(&json!({"exerciseName": name, "target": 10, "completed": 5}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let body: Value = reqwest::get(http_url(&handle, "/api/historial?limit=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["exerciseName"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["C", "B"]);

    handle.shutdown().await;
}

#[tokio::test]
async fn statistics_empty_and_populated() {
    let handle = memory_server().await;

    let body: Value = reqwest::get(http_url(&handle, "/api/estadisticas"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({
            "success": true,
            "data": {
                "resumen": {
                    "total": 0,
                    "completados": 0,
                    "promedio_general": 0,
                    "tiempo_total_segundos": 0
                },
                "por_ejercicio": []
            }
        })
    );

    let client = reqwest::Client::new();
    for (completed, duration) in [(100, 30), (50, 0)] {
        client
            .post(http_url(&handle, "/api/ejercicio"))
            .json(&json!({"exerciseName": "squat", "target": 100, "completed": completed, "duration": duration}))
            .send()
            .await
            .unwrap();
    }

    let body: Value = reqwest::get(http_url(&handle, "/api/estadisticas"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let resumen = &body["data"]["resumen"];
    assert_eq!(resumen["total"], 2);
    assert_eq!(resumen["completados"], 1);
    assert_eq!(resumen["promedio_general"], 75);
    assert_eq!(resumen["tiempo_total_segundos"], 30);
    assert_eq!(body["data"]["por_ejercicio"][0]["ejercicio"], "SQUAT");

    handle.shutdown().await;
}

#[tokio::test]
async fn sqlite_failure_degrades_to_memory_and_still_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("relay.db")).unwrap();
    let store = ExerciseStore::with_primary(Arc::new(SqliteRecordStore::new(db)));
    let handle = start(settings(WsHosting::Dedicated), Arc::new(store), None)
        .await
        .unwrap();

    let url = ws_url(&handle);
    let mut device = connect(&url).await;
    wait_for_peers(&handle, 1).await;

    send(&mut device, "EJERCICIO_COMPLETADO:squat:10:10:30").await;
    let first = saved_record(&next_text(&mut device).await);
    assert_eq!(first["exerciseName"], "squat");

    // Non-numeric completed count cannot be stored relationally.
    send(&mut device, "EJERCICIO_COMPLETADO:squat:10:abc:30").await;
    let second = saved_record(&next_text(&mut device).await);
    assert!(second["completed"].is_null());
    assert_ne!(second["id"], first["id"]);
    assert_eq!(second["id"], 2);

    let health: Value = reqwest::get(http_url(&handle, "/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["store"]["mode"], "degraded");
    assert_eq!(health["store"]["fallbackWrites"], 1);

    let body: Value = reqwest::get(http_url(&handle, "/api/historial"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["source"], "memory");
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, [2, 1]);

    handle.shutdown().await;
}

#[tokio::test]
async fn shared_hosting_upgrades_on_ws_path() {
    let handle = start(
        settings(WsHosting::Shared),
        Arc::new(ExerciseStore::memory_only()),
        None,
    )
    .await
    .unwrap();

    let url = format!("ws://{}/ws", handle.http_addr);
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_peers(&handle, 2).await;

    send(&mut a, "BLUETOOTH_CONNECTED").await;
    assert_eq!(next_text(&mut b).await, "BLUETOOTH_CONNECTED");

    let resp = reqwest::get(http_url(&handle, "/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    handle.shutdown().await;
}

#[tokio::test]
async fn static_fallback_serves_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>fitrelay</html>").unwrap();
    let mut s = settings(WsHosting::Dedicated);
    s.static_dir = dir.path().to_string_lossy().into_owned();
    let handle = start(s, Arc::new(ExerciseStore::memory_only()), None)
        .await
        .unwrap();

    for path in ["/", "/historial/123"] {
        let resp = reqwest::get(http_url(&handle, path)).await.unwrap();
        assert_eq!(resp.status(), 200, "{path}");
        assert!(resp.text().await.unwrap().contains("fitrelay"));
    }

    handle.shutdown().await;
}
