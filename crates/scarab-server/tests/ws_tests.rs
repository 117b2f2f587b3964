//! Integration tests for the control server over a real socket.
//!
//! Each test binds to an ephemeral port, connects a `tokio-tungstenite`
//! client, runs a small simulation, and asserts on the frames the client
//! observes and the commands it submits.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use scarab_core::{
    EndReason, HandlerBinding, HandlerFault, Outbox, SimEntity, Simulation, SimulationConfig,
};
use scarab_events::{Event, PropertyMap};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A bee that warms up by one degree every tick.
struct WarmingBee {
    temp: i64,
}

impl SimEntity for WarmingBee {
    fn scarab_name(&self) -> &str {
        "bee"
    }

    fn properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("temp".to_owned(), json!(self.temp));
        props
    }

    fn bindings(&self) -> Vec<HandlerBinding> {
        vec![HandlerBinding::time_updated("on_time")]
    }

    fn invoke(
        &mut self,
        handler: &str,
        _event: &Event,
        _outbox: &mut Outbox,
    ) -> Result<(), HandlerFault> {
        match handler {
            "on_time" => {
                self.temp += 1;
                Ok(())
            }
            other => Err(HandlerFault::new(format!("unknown handler slot: {other}"))),
        }
    }
}

fn config(number_steps: u64, step_length_secs: f64) -> SimulationConfig {
    SimulationConfig {
        number_steps,
        step_length_secs,
        ..SimulationConfig::default()
    }
}

/// Bind the server on an ephemeral port and return a connected client.
async fn connect(sim: &Simulation) -> (WsClient, tokio::task::JoinHandle<()>) {
    let state = Arc::new(scarab_server::AppState::new(sim.channels()));
    let server_config = scarab_server::ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    };
    let (addr, handle) = scarab_server::spawn_control_server(&server_config, state)
        .await
        .expect("spawn server");

    let (client, _) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("connect client");

    // Give the connection task a moment to subscribe to the broadcast
    // before the run starts producing frames.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (client, handle)
}

/// Read the next JSON text frame, or `None` on timeout / stream end.
async fn next_json(client: &mut WsClient, wait: Duration) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(wait, client.next()).await.ok()??;
        match msg {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
}

async fn send_action(client: &mut WsClient, action: &str) {
    let frame = json!({ "action": action }).to_string();
    client
        .send(Message::Text(frame.into()))
        .await
        .expect("send action");
}

#[tokio::test]
async fn clients_receive_the_event_stream_in_order() {
    let mut sim = Simulation::new(config(3, 0.0)).expect("construct");
    let _ = sim
        .add_entity(Box::new(WarmingBee { temp: 70 }))
        .expect("add bee");
    let (mut client, _server) = connect(&sim).await;

    let run = tokio::spawn(sim.run());

    let mut names = Vec::new();
    while let Some(frame) = next_json(&mut client, Duration::from_secs(2)).await {
        let name = frame["event_name"].as_str().unwrap_or("").to_owned();
        names.push(name.clone());
        if name == "scarab.simulation.shutdown" {
            break;
        }
    }

    assert_eq!(
        names,
        vec![
            "scarab.entity.created",
            "scarab.time.updated",
            "scarab.entity.changed",
            "scarab.time.updated",
            "scarab.entity.changed",
            "scarab.time.updated",
            "scarab.entity.changed",
            "scarab.simulation.shutdown",
        ]
    );

    let report = run.await.expect("join").expect("run");
    assert_eq!(report.end_reason, EndReason::StepsCompleted);
}

#[tokio::test]
async fn pause_stops_the_stream_and_resume_continues_it() {
    let mut sim = Simulation::new(config(10, 0.05)).expect("construct");
    let _ = sim
        .add_entity(Box::new(WarmingBee { temp: 0 }))
        .expect("add bee");
    let (mut client, _server) = connect(&sim).await;

    let run = tokio::spawn(sim.run());

    // Wait for the second tick, then pause.
    loop {
        let frame = next_json(&mut client, Duration::from_secs(2))
            .await
            .expect("stream ended before tick 2");
        if frame["event_name"] == "scarab.time.updated" && frame["sim_time"] == json!(2) {
            break;
        }
    }
    send_action(&mut client, "pause").await;

    // Drain frames already in flight until the stream goes quiet; the
    // quiet window must arrive well before the run could finish on its
    // own and must not contain the shutdown event.
    let mut quiet = false;
    for _ in 0..20 {
        match next_json(&mut client, Duration::from_millis(400)).await {
            Some(frame) => {
                assert_ne!(
                    frame["event_name"], "scarab.simulation.shutdown",
                    "run completed despite pause"
                );
            }
            None => {
                quiet = true;
                break;
            }
        }
    }
    assert!(quiet, "stream never paused");

    // Resume and run to completion.
    send_action(&mut client, "resume").await;
    let mut time_updates = 0;
    let mut saw_shutdown = false;
    while let Some(frame) = next_json(&mut client, Duration::from_secs(2)).await {
        match frame["event_name"].as_str() {
            Some("scarab.time.updated") => time_updates += 1,
            Some("scarab.simulation.shutdown") => {
                saw_shutdown = true;
                break;
            }
            _ => {}
        }
    }
    assert!(saw_shutdown);

    let report = run.await.expect("join").expect("run");
    assert_eq!(report.end_reason, EndReason::StepsCompleted);
    assert_eq!(report.steps_run, 10);
    // The frames after resume are exactly the remaining ticks.
    assert!(time_updates >= 1);
}

#[tokio::test]
async fn malformed_frames_and_unknown_actions_are_ignored() {
    let mut sim = Simulation::new(config(100, 0.01)).expect("construct");
    let _ = sim
        .add_entity(Box::new(WarmingBee { temp: 0 }))
        .expect("add bee");
    let (mut client, _server) = connect(&sim).await;

    let run = tokio::spawn(sim.run());

    client
        .send(Message::Text("this is not json".into()))
        .await
        .expect("send garbage");
    client
        .send(Message::Text(json!({"verb": "pause"}).to_string().into()))
        .await
        .expect("send wrong shape");
    send_action(&mut client, "hibernate").await;

    // None of the above had any effect; shutdown works afterwards.
    send_action(&mut client, "shutdown").await;

    let mut saw_shutdown = false;
    while let Some(frame) = next_json(&mut client, Duration::from_secs(2)).await {
        if frame["event_name"] == "scarab.simulation.shutdown" {
            saw_shutdown = true;
            break;
        }
    }
    assert!(saw_shutdown);

    let report = run.await.expect("join").expect("run");
    assert_eq!(report.end_reason, EndReason::ShutdownRequested);
    assert!(report.steps_run < 100);
}

#[tokio::test]
async fn a_departing_client_does_not_disturb_the_others() {
    let mut sim = Simulation::new(config(20, 0.01)).expect("construct");
    let _ = sim
        .add_entity(Box::new(WarmingBee { temp: 0 }))
        .expect("add bee");

    let state = Arc::new(scarab_server::AppState::new(sim.channels()));
    let server_config = scarab_server::ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
    };
    let (addr, _server) = scarab_server::spawn_control_server(&server_config, state)
        .await
        .expect("spawn server");

    let (mut keeper, _) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("connect keeper");
    let (leaver, _) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("connect leaver");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let run = tokio::spawn(sim.run());

    // One client drops mid-run without so much as a close frame.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(leaver);
    });

    let mut saw_shutdown = false;
    while let Some(frame) = next_json(&mut keeper, Duration::from_secs(2)).await {
        if frame["event_name"] == "scarab.simulation.shutdown" {
            saw_shutdown = true;
            break;
        }
    }
    assert!(saw_shutdown, "surviving client lost the stream");

    let report = run.await.expect("join").expect("run");
    assert_eq!(report.steps_run, 20);
}
