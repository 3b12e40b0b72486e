use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{mpsc, Arc};
use std::thread;

use parasite_frame::{is_reserved, reply_name, Frame, FrameConfig, FrameError, FrameReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{shared_sink, SharedSink};
use crate::error::{HandlerError, PeerError, Result};
use crate::handshake::{validate_handshake, HandshakeConfig};

/// A named call a plugin answers.
pub trait Handler: Send + Sync {
    /// Runs once before the plugin starts serving.
    fn init(&self) -> std::result::Result<(), HandlerError> {
        Ok(())
    }

    /// Runs once when the plugin shuts down.
    fn teardown(&self) {}

    fn handle(&self, payload: &[u8]) -> std::result::Result<Vec<u8>, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&[u8]) -> std::result::Result<Vec<u8>, HandlerError> + Send + Sync,
{
    fn handle(&self, payload: &[u8]) -> std::result::Result<Vec<u8>, HandlerError> {
        self(payload)
    }
}

/// Identity of a plugin and the host it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParasiteOptions {
    pub name: String,
    pub version: String,
    /// Host name the handshake must carry.
    pub host_name: String,
    /// Lowest host version accepted, compared as a string.
    pub min_host_version: String,
}

impl ParasiteOptions {
    /// Every field is required.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("name", &self.name),
            ("version", &self.version),
            ("host_name", &self.host_name),
            ("min_host_version", &self.min_host_version),
        ];
        for (field, value) in fields {
            if value.is_empty() {
                return Err(PeerError::InvalidOptions(format!("{field} is required")));
            }
        }
        Ok(())
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            expected_host_name: self.host_name.clone(),
            min_host_version: self.min_host_version.clone(),
        }
    }
}

/// Why a running plugin stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// SIGINT or SIGTERM.
    Signal,
    /// The host closed our stdin or the frame stream failed.
    HostGone,
}

/// Plugin-side runtime: answers host calls read from stdin on stdout.
pub struct Parasite {
    options: ParasiteOptions,
    handlers: BTreeMap<String, Arc<dyn Handler>>,
    sink: SharedSink,
    frame_config: FrameConfig,
    cancel: CancellationToken,
}

impl Parasite {
    pub fn new(options: ParasiteOptions) -> Self {
        let frame_config = FrameConfig::default();
        Self {
            options,
            handlers: BTreeMap::new(),
            sink: shared_sink(std::io::stdout(), frame_config.clone()),
            frame_config,
            cancel: CancellationToken::new(),
        }
    }

    /// Register `handler` under `call`, replacing any earlier one.
    ///
    /// Protocol-reserved names are refused.
    pub fn register(mut self, call: impl Into<String>, handler: impl Handler + 'static) -> Self {
        let call = call.into();
        if is_reserved(&call) {
            warn!(call = %call, "refusing to register handler under reserved name");
            return self;
        }
        self.handlers.insert(call, Arc::new(handler));
        self
    }

    /// Reply through `sink` instead of stdout.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Frame limits for both the stdin reader and a fresh stdout sink.
    ///
    /// Replaces any sink set earlier with [`with_sink`](Self::with_sink).
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.sink = shared_sink(std::io::stdout(), config.clone());
        self.frame_config = config;
        self
    }

    pub fn options(&self) -> &ParasiteOptions {
        &self.options
    }

    /// The sink replies are written to; share it with the log layer.
    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    /// Registered call names, sorted.
    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Validate the handshake, then serve stdin until a termination signal
    /// or until the host closes the stream.
    ///
    /// Nothing is written to stdout if the handshake is rejected.
    pub fn run(self, handshake: &str) -> Result<Shutdown> {
        self.options.validate()?;
        validate_handshake(handshake, &self.options.handshake_config())?;

        self.init_handlers()?;

        let (tx, rx) = mpsc::channel();
        let signal_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = signal_tx.send(Shutdown::Signal);
        })
        .map_err(|err| PeerError::Signal(err.to_string()))?;

        let this = Arc::new(self);
        let server = Arc::clone(&this);
        let serve_tx = tx;
        thread::Builder::new()
            .name("parasite-serve".into())
            .spawn(move || {
                if let Err(err) = server.serve(std::io::stdin(), &server.sink) {
                    error!(error = %err, "serving host calls failed");
                }
                let _ = serve_tx.send(Shutdown::HostGone);
            })
            .map_err(|err| PeerError::Transport(err.into()))?;

        info!(plugin = %this.options.name, version = %this.options.version, "plugin ready");

        let reason = rx.recv().unwrap_or(Shutdown::HostGone);
        info!(plugin = %this.options.name, ?reason, "plugin shutting down");

        this.cancel.cancel();
        this.teardown_handlers();
        Ok(reason)
    }

    /// Answer every call read from `reader` until EOF or cancellation.
    pub fn serve<R: Read>(&self, reader: R, sink: &SharedSink) -> Result<()> {
        let mut frames = FrameReader::with_config(reader, self.frame_config.clone());
        loop {
            let frame = match frames.read_frame() {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => {
                    debug!("host closed the frame stream");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if frame.is_reply() {
                debug!(id = frame.id(), call = frame.call(), "ignoring reply frame");
                continue;
            }

            if let Some(err) = frame.transport_error() {
                warn!(id = frame.id(), error = %err, "skipping undecodable frame");
                continue;
            }

            self.answer(&frame, sink)?;
        }
    }

    fn answer(&self, frame: &Frame, sink: &SharedSink) -> Result<()> {
        let payload = match self.handlers.get(frame.call()) {
            Some(handler) => match handler.handle(frame.payload()) {
                Ok(payload) => payload,
                Err(err) => {
                    debug!(call = frame.call(), error = %err, "handler failed");
                    err.to_string().into_bytes()
                }
            },
            None => {
                debug!(call = frame.call(), "no handler registered");
                Vec::new()
            }
        };

        let reply = reply_name(frame.call());
        match sink.send(frame.id(), &reply, &payload) {
            Err(FrameError::LineTooLong { size, max }) => {
                warn!(id = frame.id(), call = frame.call(), size, max, "reply exceeds frame limit");
                let text = format!("reply too large: {size}-byte frame exceeds {max}");
                match sink.send(frame.id(), &reply, text.as_bytes()) {
                    Err(FrameError::LineTooLong { .. }) => {
                        warn!(id = frame.id(), call = frame.call(), "no room for an error reply either");
                        Ok(())
                    }
                    other => Ok(other?),
                }
            }
            other => Ok(other?),
        }
    }

    fn init_handlers(&self) -> Result<()> {
        for (index, (name, handler)) in self.handlers.iter().enumerate() {
            if let Err(err) = handler.init() {
                for (_, started) in self.handlers.iter().take(index) {
                    started.teardown();
                }
                return Err(PeerError::HandlerInit {
                    name: name.clone(),
                    message: err.to_string(),
                });
            }
        }
        Ok(())
    }

    fn teardown_handlers(&self) {
        for handler in self.handlers.values() {
            handler.teardown();
        }
    }
}
