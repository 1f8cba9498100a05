//! Drive a session against an in-process simulated bulb.
//!
//! ```text
//! YEELIGHT_LOG_MODE=development cargo run -p yeelight-sdk-session --example simulated_bulb
//! ```

use device_session::{
    event_channel, logging, AttributeObserver, AttributeSnapshot, Command, Connection,
    ConnectionError, ConnectionEvent, DeviceInfo, DeviceSession, DisplayNames, EventSender,
    IncomingMessage, PushPolicy, SessionConfig, SessionRegistry,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const LATENCY: Duration = Duration::from_millis(40);

#[derive(Debug)]
struct BulbState {
    power: bool,
    bright: i64,
    ct: i64,
}

/// Answers like a real bulb would, after a short delay
struct SimulatedBulb {
    events: EventSender,
    state: Mutex<BulbState>,
}

impl SimulatedBulb {
    fn new(events: EventSender) -> Self {
        Self {
            events,
            state: Mutex::new(BulbState {
                power: false,
                bright: 30,
                ct: 4000,
            }),
        }
    }

    fn answer(&self, command: &Command) -> IncomingMessage {
        let mut state = self.state.lock();
        match command.method.as_str() {
            "get_prop" => {
                let values = command
                    .params
                    .iter()
                    .map(|name| match name.as_str() {
                        Some("power") => json!(if state.power { "on" } else { "off" }),
                        Some("bright") => json!(state.bright.to_string()),
                        Some("ct") => json!(state.ct.to_string()),
                        Some("name") => json!("Desk"),
                        _ => json!(""),
                    })
                    .collect();
                IncomingMessage::reply(command.id, values)
            }
            "set_power" => {
                state.power = command.params.first().and_then(Value::as_str) == Some("on");
                IncomingMessage::ok(command.id)
            }
            "set_bright" => match command.params.first().and_then(Value::as_i64) {
                Some(bright @ 1..=100) => {
                    state.bright = bright;
                    IncomingMessage::ok(command.id)
                }
                _ => IncomingMessage::error(command.id, json!({"code": -1, "message": "invalid params"})),
            },
            _ => IncomingMessage::error(command.id, json!({"code": -1, "message": "method not supported"})),
        }
    }

    fn deliver(&self, event: ConnectionEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(LATENCY).await;
            let _ = events.send(event);
        });
    }
}

impl Connection for SimulatedBulb {
    fn connect(&self) -> Result<(), ConnectionError> {
        self.deliver(ConnectionEvent::Connected);
        Ok(())
    }

    fn send(&self, command: &Command) -> Result<(), ConnectionError> {
        let reply = self.answer(command);
        self.deliver(ConnectionEvent::Message(reply));
        Ok(())
    }
}

struct PrintObserver;

impl AttributeObserver for PrintObserver {
    fn on_attributes_updated(&self, snapshot: &AttributeSnapshot) {
        println!(
            "  pushed: power={:?} bright={:?} ct={:?}",
            snapshot.bool("power"),
            snapshot.number("bright"),
            snapshot.number("ct")
        );
    }

    fn on_power_off(&self) {
        println!("  pushed: power off");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging_from_env()?;

    let names = DisplayNames::new();
    let registry = SessionRegistry::new();

    let (events_tx, events_rx) = event_channel();
    let bulb = Arc::new(SimulatedBulb::new(events_tx));
    let device = DeviceInfo::new("0x0000000007e7bd5e", "color").with_support("get_prop set_power set_bright");
    let device_id = device.id.clone();

    let config = SessionConfig::blocking()
        .with_interval(Duration::from_secs(10))
        .with_blocking_push(PushPolicy::Always);
    let (session, _) = registry.get_or_insert_with(&device_id, || {
        DeviceSession::builder(device, bulb)
            .with_config(config)
            .with_names(names.clone())
            .build()
    })?;

    session.subscribe(Arc::new(PrintObserver));
    session.start(events_rx)?;

    let mut changes = session.state_changes();
    while !changes.borrow_and_update().is_connected() {
        changes.changed().await?;
    }
    println!("{} is {}", session.name(), session.state());
    session.identify();

    // Let the share window pass so the read goes to the device
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let attributes = session.get_attributes().await;
    println!("read: power={:?} bright={:?}", attributes.bool("power"), attributes.number("bright"));

    println!("turning on");
    session
        .send_command_await("set_power", vec![json!("on"), json!("smooth"), json!(500)])
        .await?;
    session.set_attributes([("power", true.into())]);

    match session.send_command_await("set_bright", vec![json!(250)]).await {
        Ok(_) => println!("unexpectedly accepted"),
        Err(e) => println!("rejected as expected: {}", e),
    }

    // Unsupported methods are sent anyway, with a warning
    let id = session.send_command("bg_set_power", vec![json!("on")]);
    println!("sent bg_set_power as request {}", id);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let attributes = session.get_attributes().await;
    println!("read: power={:?} bright={:?}", attributes.bool("power"), attributes.number("bright"));
    println!("{} request(s) still pending", session.pending_transactions());

    Ok(())
}
