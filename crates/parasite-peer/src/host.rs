use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use parasite_frame::{Frame, LOG_CALL};
use parasite_transport::discover;
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;
use crate::connection::{Connection, Dispatch, ReplyWriter};
use crate::error::{HandlerError, PeerError, Result};
use crate::handshake::HandshakeRecord;
use crate::log_forward;

/// Answers calls that plugins make to the host.
///
/// Runs on the calling plugin's reader thread. Calling back into that same
/// plugin and waiting for the reply blocks until the call is reclaimed.
pub trait Executor: Send + Sync {
    fn on_call(&self, call: &str, payload: &[u8]) -> std::result::Result<Vec<u8>, HandlerError>;
}

impl<F> Executor for F
where
    F: Fn(&str, &[u8]) -> std::result::Result<Vec<u8>, HandlerError> + Send + Sync,
{
    fn on_call(&self, call: &str, payload: &[u8]) -> std::result::Result<Vec<u8>, HandlerError> {
        self(call, payload)
    }
}

/// Name and version the host presents to its plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub name: String,
    pub version: String,
}

impl HostIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

struct HostDispatch {
    executor: Box<dyn Executor>,
}

impl Dispatch for HostDispatch {
    fn dispatch(&self, plugin: &str, frame: Frame, reply: ReplyWriter) {
        if frame.call() == LOG_CALL {
            log_forward::forward(plugin, frame.payload());
            return;
        }

        let payload = match self.executor.on_call(frame.call(), frame.payload()) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(plugin, call = frame.call(), error = %err, "executor returned an error");
                err.to_string().into_bytes()
            }
        };

        if let Err(err) = reply.reply(&payload) {
            warn!(plugin, call = frame.call(), error = %err, "failed to send reply");
        }
    }
}

/// Loads plugins and routes calls to them by name.
pub struct Host {
    identity: HostIdentity,
    dispatch: Arc<HostDispatch>,
    connections: RwLock<BTreeMap<String, Arc<Connection>>>,
    config: HostConfig,
}

impl Host {
    pub fn new(identity: HostIdentity, executor: impl Executor + 'static) -> Self {
        Self::with_config(identity, executor, HostConfig::default())
    }

    pub fn with_config(
        identity: HostIdentity,
        executor: impl Executor + 'static,
        config: HostConfig,
    ) -> Self {
        Self {
            identity,
            dispatch: Arc::new(HostDispatch {
                executor: Box::new(executor),
            }),
            connections: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    /// The blob every plugin receives after `-h`.
    pub fn handshake_blob(&self) -> Result<String> {
        HandshakeRecord::new(&self.identity.name, &self.identity.version).encode()
    }

    /// Start every executable in `dir` as a plugin.
    ///
    /// Returns the number of plugins started. A plugin that fails to start is
    /// logged and skipped; a plugin whose name is already loaded is skipped.
    pub fn load(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let handshake = self.handshake_blob()?;
        let entries = discover(dir)?;
        debug!(dir = %dir.display(), found = entries.len(), "discovered plugins");

        let mut loaded = 0;
        for entry in entries {
            if self.is_loaded(&entry.name) {
                warn!(plugin = %entry.name, "plugin already loaded; skipping");
                continue;
            }

            let dispatch: Arc<dyn Dispatch> = self.dispatch.clone();
            match Connection::start(&entry, &handshake, dispatch, self.config.connection.clone()) {
                Ok(connection) => {
                    self.write_connections()
                        .insert(entry.name.clone(), Arc::new(connection));
                    loaded += 1;
                }
                Err(err) => {
                    error!(plugin = %entry.name, error = %err, "failed to start plugin");
                }
            }
        }

        info!(dir = %dir.display(), loaded, "plugins loaded");
        Ok(loaded)
    }

    /// Register a plugin that is already running on the given streams.
    pub fn attach<R, W>(&self, name: &str, reader: R, writer: W) -> Result<()>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let dispatch: Arc<dyn Dispatch> = self.dispatch.clone();
        let connection =
            Connection::attach(name, reader, writer, dispatch, self.config.connection.clone())?;
        let previous = self
            .write_connections()
            .insert(name.to_string(), Arc::new(connection));
        if previous.is_some() {
            warn!(plugin = name, "replaced existing connection");
        }
        Ok(())
    }

    /// Call `plugin` and wait for its reply.
    ///
    /// Blocks the calling thread. Panics inside a tokio runtime context,
    /// see [`Connection::call_and_wait`].
    pub fn call(&self, plugin: &str, call: &str, payload: &[u8]) -> Result<Bytes> {
        self.connection(plugin)?.call_and_wait(call, payload)
    }

    /// Send a call to `plugin` without waiting for a reply.
    pub fn notice(&self, plugin: &str, call: &str, payload: &[u8]) -> Result<()> {
        self.connection(plugin)?.call(call, payload)
    }

    /// Look up the connection for `plugin`.
    pub fn connection(&self, plugin: &str) -> Result<Arc<Connection>> {
        self.read_connections()
            .get(plugin)
            .cloned()
            .ok_or_else(|| PeerError::UnknownPlugin(plugin.to_string()))
    }

    /// Names of loaded plugins, sorted.
    pub fn plugins(&self) -> Vec<String> {
        self.read_connections().keys().cloned().collect()
    }

    pub fn is_loaded(&self, plugin: &str) -> bool {
        self.read_connections().contains_key(plugin)
    }

    /// Stop one plugin and forget it.
    pub fn stop(&self, plugin: &str) -> Result<()> {
        let connection = self
            .write_connections()
            .remove(plugin)
            .ok_or_else(|| PeerError::UnknownPlugin(plugin.to_string()))?;
        connection.stop()
    }

    /// Stop every plugin. Callers still waiting on a reply get `Cancelled`.
    pub fn shutdown(&self) {
        let connections = std::mem::take(&mut *self.write_connections());
        for (name, connection) in connections {
            if let Err(err) = connection.stop() {
                warn!(plugin = %name, error = %err, "failed to stop plugin");
            }
        }
    }

    fn read_connections(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_connections(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}
