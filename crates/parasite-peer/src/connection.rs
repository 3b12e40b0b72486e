use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use parasite_frame::{reply_name, Frame, FrameConfig, FrameError, FrameReader, FrameSink};
use parasite_transport::{PluginEntry, PluginProcess, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{PeerError, Result};
use crate::handshake::HANDSHAKE_FLAG;
use crate::pending::PendingCalls;

/// Frame sink over a type-erased stream, shared by every writer of one connection.
pub type SharedSink = FrameSink<Box<dyn Write + Send>>;

/// Wrap `writer` in a [`SharedSink`].
pub fn shared_sink(writer: impl Write + Send + 'static, config: FrameConfig) -> SharedSink {
    FrameSink::with_config(Box::new(writer), config)
}

/// Receives inbound calls from a plugin.
///
/// Runs on the connection's reader thread: a slow dispatch delays every
/// later frame from the same plugin, including replies to pending calls.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, plugin: &str, frame: Frame, reply: ReplyWriter);
}

/// Writes the single reply to one inbound call.
pub struct ReplyWriter {
    id: u64,
    call: String,
    sink: SharedSink,
}

impl ReplyWriter {
    pub fn new(id: u64, call: impl Into<String>, sink: SharedSink) -> Self {
        Self {
            id,
            call: call.into(),
            sink,
        }
    }

    /// Correlation id of the call being answered.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the call being answered.
    pub fn call(&self) -> &str {
        &self.call
    }

    /// Send the reply. Consumes the writer: a call is answered at most once.
    pub fn reply(self, payload: &[u8]) -> Result<()> {
        self.sink.send(self.id, &reply_name(&self.call), payload)?;
        Ok(())
    }
}

struct Shared {
    name: String,
    sink: SharedSink,
    pending: PendingCalls,
    next_id: AtomicU64,
    cancel: CancellationToken,
    reading: AtomicBool,
    config: ConnectionConfig,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn complete(&self, frame: Frame) {
        let id = frame.id();
        let (payload, error) = frame.into_parts();
        let result = match error {
            Some(err) => Err(PeerError::Decode(err)),
            None => Ok(payload),
        };
        if !self.pending.resolve(id, result) {
            debug!(plugin = %self.name, id, "discarding reply with no pending call");
        }
    }
}

/// A live link to one plugin.
///
/// Owns a reader thread that routes inbound frames and a reaper thread
/// that reclaims calls left unanswered for longer than
/// [`ConnectionConfig::stale_after`].
pub struct Connection {
    shared: Arc<Shared>,
    process: Mutex<Option<PluginProcess>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Launch `plugin` as `<path> -h <handshake>` and connect to its stdio.
    pub fn start(
        plugin: &PluginEntry,
        handshake: &str,
        dispatch: Arc<dyn Dispatch>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let (mut process, streams) =
            PluginProcess::spawn(&plugin.path, [HANDSHAKE_FLAG, handshake])?;
        let pid = process.id();

        let connection =
            match Self::attach(&plugin.name, streams.stdout, streams.stdin, dispatch, config) {
                Ok(connection) => connection,
                Err(err) => {
                    let _ = process.kill();
                    let _ = process.wait();
                    return Err(err);
                }
            };
        *connection.process.lock().unwrap_or_else(PoisonError::into_inner) = Some(process);

        info!(plugin = %plugin.name, pid, path = %plugin.path.display(), "plugin started");
        Ok(connection)
    }

    /// Run the protocol over an arbitrary pair of streams.
    pub fn attach<R, W>(
        name: &str,
        reader: R,
        writer: W,
        dispatch: Arc<dyn Dispatch>,
        config: ConnectionConfig,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let shared = Arc::new(Shared {
            name: name.to_string(),
            sink: shared_sink(writer, config.frame.clone()),
            pending: PendingCalls::new(),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            reading: AtomicBool::new(true),
            config,
        });

        let frames = FrameReader::with_config(reader, shared.config.frame.clone());
        let reader_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("parasite-read-{name}"))
            .spawn(move || read_loop(reader_shared, frames, dispatch))
            .map_err(TransportError::Io)?;

        let reaper_shared = Arc::clone(&shared);
        let reaper = thread::Builder::new()
            .name(format!("parasite-reap-{name}"))
            .spawn(move || reap_loop(reaper_shared))
            .map_err(|err| {
                shared.cancel.cancel();
                TransportError::Io(err)
            })?;

        Ok(Self {
            shared,
            process: Mutex::new(None),
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Plugin name this connection was created for.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Send a call without waiting for a reply.
    pub fn call(&self, call: &str, payload: &[u8]) -> Result<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(PeerError::Cancelled);
        }
        let id = self.shared.next_id();
        self.shared.sink.send(id, call, payload)?;
        Ok(())
    }

    /// Send a call and block until its reply, reclaim or cancellation.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context, such
    /// as a tokio runtime worker. Use `spawn_blocking` from async code.
    pub fn call_and_wait(&self, call: &str, payload: &[u8]) -> Result<Bytes> {
        let id = self.shared.next_id();
        let slot = self.shared.pending.register(id);

        // `stop` cancels before draining, so a registration that missed the
        // drain always observes the token here.
        if self.shared.cancel.is_cancelled() {
            self.shared.pending.forget(id);
            return Err(PeerError::Cancelled);
        }

        if let Err(err) = self.shared.sink.send(id, call, payload) {
            self.shared.pending.forget(id);
            return Err(err.into());
        }

        match slot.blocking_recv() {
            Ok(result) => result,
            Err(_) => Err(PeerError::Cancelled),
        }
    }

    /// Number of calls still awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// False once the reader has exited or the connection was stopped.
    pub fn is_alive(&self) -> bool {
        self.shared.reading.load(Ordering::Acquire) && !self.shared.cancel.is_cancelled()
    }

    /// Cancel outstanding calls, stop the background threads and kill the plugin.
    ///
    /// Safe to call more than once.
    pub fn stop(&self) -> Result<()> {
        if self.shared.cancel.is_cancelled() {
            return Ok(());
        }
        self.shared.cancel.cancel();

        let cancelled = self.shared.pending.cancel_all();
        if cancelled > 0 {
            info!(plugin = %self.shared.name, cancelled, "cancelled pending calls");
        }

        let reaper = self.reaper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = reaper {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!(plugin = %self.shared.name, "reaper thread panicked");
            }
        }

        let process = self.process.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut process) = process {
            process.kill()?;
            let status = process.wait()?;
            info!(plugin = %self.shared.name, %status, "plugin stopped");
        }

        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(plugin = %self.shared.name, error = %err, "failed to stop plugin");
        }
    }
}

fn read_loop<R: Read>(shared: Arc<Shared>, mut frames: FrameReader<R>, dispatch: Arc<dyn Dispatch>) {
    let plugin = shared.name.clone();
    loop {
        let frame = match frames.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                debug!(%plugin, "plugin closed its output");
                break;
            }
            Err(err) => {
                warn!(%plugin, error = %err, "reading from plugin failed");
                break;
            }
        };

        if shared.cancel.is_cancelled() {
            debug!(%plugin, "connection stopped; reader exiting");
            break;
        }

        if frame.is_reply() {
            shared.complete(frame);
            continue;
        }

        if let Some(err) = frame.transport_error() {
            warn!(%plugin, id = frame.id(), error = %err, "dropping undecodable call");
            continue;
        }

        let reply = ReplyWriter::new(frame.id(), frame.call(), shared.sink.clone());
        dispatch.dispatch(&plugin, frame, reply);
    }

    shared.reading.store(false, Ordering::Release);
}

fn reap_loop(shared: Arc<Shared>) {
    let interval = shared.config.reap_interval;
    let stale_after = shared.config.stale_after;

    while !shared.cancel.is_cancelled() {
        thread::park_timeout(interval);
        if shared.cancel.is_cancelled() {
            break;
        }
        let reclaimed = shared.pending.reap(stale_after);
        if reclaimed > 0 {
            warn!(plugin = %shared.name, reclaimed, ?stale_after, "reclaimed stale calls");
        }
    }
}
