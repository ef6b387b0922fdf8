//! The event loop.
//!
//! One task owns the [`DeviceRegistry`] and serializes everything that touches
//! it: transport callbacks, application commands, and timer expiry. Other
//! tasks talk to it only through a cloneable [`RuntimeHandle`], which sends a
//! command over an unbounded channel and awaits the reply on a oneshot.
//!
//! ```text
//! transport events ──┐
//! RuntimeHandle ─────┼──▶ LinkRuntime::run ──▶ DeviceRegistry
//! next deadline ─────┘
//! ```
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::RuntimeError;
use crate::events::DeviceEvent;
use crate::message_log::LogEntry;
use crate::metrics;
use crate::registry::{DeviceId, DeviceRegistry, DeviceSnapshot};
use crate::transport::{Transport, TransportEvent};

#[derive(Debug)]
enum Command {
    Connect {
        id: DeviceId,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Disconnect {
        id: DeviceId,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Remove {
        id: DeviceId,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    SetChannel {
        id: DeviceId,
        index: usize,
        value: f32,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Rename {
        id: DeviceId,
        name: Option<String>,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Snapshot(oneshot::Sender<RuntimeSnapshot>),
    Subscribe(oneshot::Sender<mpsc::UnboundedReceiver<DeviceEvent>>),
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of the loop's state.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub devices: Vec<DeviceSnapshot>,
    /// Selected devices, oldest first.
    pub selected: Vec<DeviceId>,
    pub log: Vec<LogEntry>,
    pub metrics: metrics::Snapshot,
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl RuntimeHandle {
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(make(tx)).map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)
    }

    pub async fn connect(&self, id: DeviceId) -> Result<(), RuntimeError> {
        self.request(|reply| Command::Connect { id, reply }).await?
    }

    pub async fn disconnect(&self, id: DeviceId) -> Result<(), RuntimeError> {
        self.request(|reply| Command::Disconnect { id, reply }).await?
    }

    pub async fn remove(&self, id: DeviceId) -> Result<(), RuntimeError> {
        self.request(|reply| Command::Remove { id, reply }).await?
    }

    pub async fn set_channel(
        &self,
        id: DeviceId,
        index: usize,
        value: f32,
    ) -> Result<(), RuntimeError> {
        self.request(|reply| Command::SetChannel {
            id,
            index,
            value,
            reply,
        })
        .await?
    }

    /// Set or clear (`None`) a device's custom name.
    pub async fn rename(&self, id: DeviceId, name: Option<String>) -> Result<(), RuntimeError> {
        self.request(|reply| Command::Rename { id, name, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<RuntimeSnapshot, RuntimeError> {
        self.request(Command::Snapshot).await
    }

    /// New subscription to the device event stream.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<DeviceEvent>, RuntimeError> {
        self.request(Command::Subscribe).await
    }

    /// Stop the loop and wait until it has acknowledged.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Shutdown(tx));
        let _ = rx.await;
    }
}

pub struct LinkRuntime<T> {
    registry: DeviceRegistry<T>,
    commands: mpsc::UnboundedReceiver<Command>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<T: Transport + Send + 'static> LinkRuntime<T> {
    pub fn new(
        registry: DeviceRegistry<T>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, RuntimeHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        (
            Self {
                registry,
                commands,
                transport_events,
            },
            RuntimeHandle { tx },
        )
    }

    /// Run the loop on its own task. The task yields the registry back on shutdown.
    pub fn spawn(self) -> JoinHandle<DeviceRegistry<T>> {
        tokio::spawn(self.run())
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) -> DeviceRegistry<T> {
        let mut transport_open = true;
        loop {
            let wait = self
                .registry
                .next_deadline()
                .map(|due| due.saturating_duration_since(Instant::now()));

            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown(done)) => {
                        let _ = done.send(());
                        break;
                    }
                    Some(cmd) => self.execute(cmd),
                    None => {
                        log::debug!("all runtime handles dropped");
                        break;
                    }
                },
                ev = self.transport_events.recv(), if transport_open => match ev {
                    Some(ev) => self.registry.handle_event(ev, Instant::now()),
                    None => {
                        log::warn!("transport event stream closed");
                        transport_open = false;
                    }
                },
                _ = sleep_for(wait) => {}
            }
            self.registry.fire_due(Instant::now());
        }
        log::debug!("link runtime terminated");
        self.registry
    }

    fn execute(&mut self, cmd: Command) {
        let now = Instant::now();
        match cmd {
            Command::Connect { id, reply } => {
                let result = self.known(id).map(|_| self.registry.connect(id, now));
                let _ = reply.send(result);
            }
            Command::Disconnect { id, reply } => {
                let result = self.known(id).map(|_| self.registry.disconnect(id, now));
                let _ = reply.send(result);
            }
            Command::Remove { id, reply } => {
                let result = self.known(id).map(|_| self.registry.remove(id));
                let _ = reply.send(result);
            }
            Command::SetChannel {
                id,
                index,
                value,
                reply,
            } => {
                let _ = reply.send(self.registry.set_channel(id, index, value, now));
            }
            Command::Rename { id, name, reply } => {
                let result = self
                    .known(id)
                    .and_then(|_| self.registry.rename(id, name).map_err(RuntimeError::from));
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(RuntimeSnapshot {
                    devices: self.registry.snapshot(),
                    selected: self.registry.selected(),
                    log: self.registry.message_log().snapshot(),
                    metrics: metrics::snapshot(),
                });
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(self.registry.subscribe());
            }
            // Handled by the loop itself.
            Command::Shutdown(done) => {
                let _ = done.send(());
            }
        }
    }

    fn known(&self, id: DeviceId) -> Result<(), RuntimeError> {
        match self.registry.device(&id) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::UnknownDevice(id)),
        }
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
