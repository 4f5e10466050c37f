//! Built-in command set for the hub binary.
//!
//! Deployments embedding real domain logic implement
//! [`Handler`](switchboard_server::Handler) themselves; the hub ships a
//! small op set good for smoke-testing a deployment end to end.

use serde_json::{Value, json};

use switchboard_core::{Broadcast, Command, DomainError};
use switchboard_server::{Handler, Outcome};

/// Dispatches `{"op": ...}` payloads.
///
/// | op         | effect                                              |
/// |------------|-----------------------------------------------------|
/// | `ping`     | replies `"pong"`                                    |
/// | `echo`     | replies with the `value` field                      |
/// | `announce` | replies `"ok"`, broadcasts `event` to everyone      |
/// | `notify`   | replies `"ok"`, broadcasts `event` back to the caller |
/// | `stats`    | replies with the number of commands processed       |
#[derive(Debug, Default)]
pub struct OpsHandler {
    processed: u64,
}

impl Handler for OpsHandler {
    fn apply(&mut self, command: Command) -> Result<Outcome, DomainError> {
        self.processed += 1;

        let op = command
            .payload
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| DomainError::new("BAD_PAYLOAD", "payload must carry an \"op\" field"))?;

        match op {
            "ping" => Ok(Outcome::reply(json!("pong"))),
            "echo" => {
                let value = command
                    .payload
                    .get("value")
                    .cloned()
                    .ok_or_else(|| DomainError::new("BAD_PAYLOAD", "echo needs a \"value\""))?;
                Ok(Outcome::reply(value))
            }
            "announce" => {
                let event = command.payload.get("event").cloned().unwrap_or(Value::Null);
                Ok(Outcome::reply(json!("ok")).with_broadcast(Broadcast::to_all(event)))
            }
            "notify" => {
                let event = command.payload.get("event").cloned().unwrap_or(Value::Null);
                Ok(Outcome::reply(json!("ok"))
                    .with_broadcast(Broadcast::to_connection(command.issuer, event)))
            }
            "stats" => Ok(Outcome::reply(json!({ "processed": self.processed }))),
            other => Err(DomainError::new(
                "UNKNOWN_COMMAND",
                format!("no such op: {other}"),
            )),
        }
    }
}
