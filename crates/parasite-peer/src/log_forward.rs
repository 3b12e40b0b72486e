//! Re-emits plugin log records through the host's `tracing` subscriber.

use serde_json::{Map, Value};
use tracing::{debug, error, info, trace, warn, Level};

use crate::error::{PeerError, Result};

/// Keys that never become attributes of a forwarded record.
const RESERVED_KEYS: [&str; 7] = [
    "level",
    "ts",
    "timestamp",
    "caller",
    "msg",
    "plugin",
    "plugin_caller",
];

/// One structured log record sent by a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: String,
    pub caller: String,
    pub msg: String,
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// Parse a record from a log frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let Value::Object(mut object) = serde_json::from_slice(payload)? else {
            return Err(PeerError::InvalidLogRecord("not a JSON object".into()));
        };

        let level = take_string(&mut object, "level")
            .ok_or_else(|| PeerError::InvalidLogRecord("missing 'level'".into()))?;
        let msg = take_string(&mut object, "msg")
            .ok_or_else(|| PeerError::InvalidLogRecord("missing 'msg'".into()))?;
        let caller = take_string(&mut object, "caller").unwrap_or_default();

        object.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));

        Ok(Self {
            level,
            caller,
            msg,
            fields: object,
        })
    }

    /// Host log level for this record. Unrecognised levels map to `INFO`.
    pub fn tracing_level(&self) -> Level {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" | "dpanic" | "panic" | "fatal" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(value)) => Some(value),
        _ => None,
    }
}

/// Decode a log frame from `plugin` and emit it. Undecodable records are dropped.
pub fn forward(plugin: &str, payload: &[u8]) {
    match LogRecord::parse(payload) {
        Ok(record) => emit(plugin, &record),
        Err(err) => debug!(plugin, error = %err, "dropping undecodable plugin log record"),
    }
}

/// Emit `record` at its mapped level, tagged with the originating plugin.
///
/// `tracing` field names are fixed at each callsite, so record attributes,
/// whose names are only known at runtime, travel together as one `fields`
/// value holding a JSON object.
pub fn emit(plugin: &str, record: &LogRecord) {
    let fields = Value::Object(record.fields.clone());
    let caller = record.caller.as_str();
    let msg = record.msg.as_str();

    match record.tracing_level() {
        Level::TRACE => trace!(plugin, plugin_caller = caller, %fields, "[{plugin}] {msg}"),
        Level::DEBUG => debug!(plugin, plugin_caller = caller, %fields, "[{plugin}] {msg}"),
        Level::WARN => warn!(plugin, plugin_caller = caller, %fields, "[{plugin}] {msg}"),
        Level::ERROR => error!(plugin, plugin_caller = caller, %fields, "[{plugin}] {msg}"),
        _ => info!(plugin, plugin_caller = caller, %fields, "[{plugin}] {msg}"),
    }
}
