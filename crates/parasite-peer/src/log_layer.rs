//! Plugin-side logging: every `tracing` event becomes a log frame to the host.
//!
//! A plugin's stdout is the frame stream, so it must never print log lines
//! there directly. Install [`FrameLogLayer`] with the same sink the runtime
//! replies through.

use std::cell::Cell;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use parasite_frame::{FrameSink, LOG_CALL};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use crate::error::{PeerError, Result};

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// Writes each event as a `LOG_CALL` frame with id 0.
pub struct FrameLogLayer<W> {
    sink: FrameSink<W>,
}

impl<W: Write> FrameLogLayer<W> {
    pub fn new(sink: FrameSink<W>) -> Self {
        Self { sink }
    }
}

impl<S, W> Layer<S> for FrameLogLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Events raised while a log frame is being written are dropped.
        if FORWARDING.with(|flag| flag.replace(true)) {
            return;
        }

        let record = encode_event(event);
        // Nowhere left to report a failure: the host is gone.
        let _ = self.sink.send(0, LOG_CALL, &record);

        FORWARDING.with(|flag| flag.set(false));
    }
}

/// Install a [`FrameLogLayer`] as the process-wide subscriber.
pub fn install<W>(sink: FrameSink<W>, level: LevelFilter) -> Result<()>
where
    W: Write + Send + 'static,
{
    let subscriber = tracing_subscriber::registry()
        .with(level)
        .with(FrameLogLayer::new(sink));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| PeerError::Logging(err.to_string()))
}

fn encode_event(event: &Event<'_>) -> Vec<u8> {
    let metadata = event.metadata();

    let mut fields = Map::new();
    event.record(&mut JsonVisitor(&mut fields));
    let msg = match fields.remove("message") {
        Some(Value::String(msg)) => msg,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let caller = match (metadata.file(), metadata.line()) {
        (Some(file), Some(line)) => format!("{file}:{line}"),
        _ => metadata.target().to_string(),
    };
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default();

    let mut record = Map::new();
    record.insert("level".into(), level_name(*metadata.level()).into());
    record.insert("ts".into(), ts.into());
    record.insert("caller".into(), caller.into());
    record.insert("msg".into(), msg.into());
    for (key, value) in fields {
        record.entry(key).or_insert(value);
    }

    serde_json::to_vec(&Value::Object(record)).unwrap_or_default()
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        _ => "error",
    }
}

struct JsonVisitor<'a>(&'a mut Map<String, Value>);

impl Visit for JsonVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}").into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use parasite_frame::FrameReader;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::log_forward::LogRecord;

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frames_from(out: &Shared) -> Vec<parasite_frame::Frame> {
        let bytes = out.0.lock().unwrap().clone();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        std::iter::from_fn(|| reader.read_frame().ok()).collect()
    }

    #[test]
    fn events_become_log_frames() {
        let out = Shared::default();
        let subscriber =
            tracing_subscriber::registry().with(FrameLogLayer::new(FrameSink::new(out.clone())));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(attempt = 3, path = "/tmp/x", "disk almost full");
        });

        let frames = frames_from(&out);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id(), 0);
        assert_eq!(frames[0].call(), LOG_CALL);

        let record: Value = serde_json::from_slice(frames[0].payload()).unwrap();
        assert_eq!(record["level"], "warn");
        assert_eq!(record["msg"], "disk almost full");
        assert_eq!(record["attempt"], 3);
        assert_eq!(record["path"], "/tmp/x");
        assert!(record["caller"].as_str().unwrap().contains("log_layer.rs:"));
        assert!(record["ts"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn frames_parse_on_the_host_side() {
        let out = Shared::default();
        let subscriber =
            tracing_subscriber::registry().with(FrameLogLayer::new(FrameSink::new(out.clone())));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(user = "ana", "logged in");
        });

        let frames = frames_from(&out);
        let record = LogRecord::parse(frames[0].payload()).unwrap();
        assert_eq!(record.level, "info");
        assert_eq!(record.msg, "logged in");
        assert_eq!(record.fields["user"], "ana");
        assert!(!record.fields.contains_key("ts"));
    }

    #[test]
    fn level_filter_applies() {
        let out = Shared::default();
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::INFO)
            .with(FrameLogLayer::new(FrameSink::new(out.clone())));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("hidden");
            tracing::error!("shown");
        });

        let frames = frames_from(&out);
        assert_eq!(frames.len(), 1);
        let record: Value = serde_json::from_slice(frames[0].payload()).unwrap();
        assert_eq!(record["msg"], "shown");
    }

    #[test]
    fn reentrant_events_are_dropped() {
        struct Noisy(Shared);

        impl Write for Noisy {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                tracing::info!("logging from inside the sink");
                self.0.write(buf)
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let out = Shared::default();
        let subscriber = tracing_subscriber::registry()
            .with(FrameLogLayer::new(FrameSink::new(Noisy(out.clone()))));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("outer");
        });

        let frames = frames_from(&out);
        assert_eq!(frames.len(), 1);
        let record: Value = serde_json::from_slice(frames[0].payload()).unwrap();
        assert_eq!(record["msg"], "outer");
    }
}
