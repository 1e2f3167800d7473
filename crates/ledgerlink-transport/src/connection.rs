//! Ledger connection handle and its driver task
//!
//! A [`LedgerConnection`] is a cheap, cloneable handle. All state that
//! changes while the connection runs (the pending table, the link, the
//! sweep timer) is owned by a single driver task spawned at construction.
//! Handles talk to the driver through a command channel and get their
//! outcome back on a oneshot; connection-level notifications fan out over a
//! broadcast channel.

use futures::future::{BoxFuture, FutureExt, Shared};
use ledgerlink_core::{
    ClientKeyPair, ClientSettings, ConnectionParams, LedgerConfig, LedgerError, OutgoingRequest,
    Result, SigningOptions,
};
use serde_json::Value;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::correlator::{PendingTable, ReplySender, RequestIdAllocator};
use crate::dispatcher::dispatch;
use crate::events::ConnectionEvent;
use crate::frame::PING;
use crate::transport::{Link, Transport};

/// Capacity of the connection event channel
pub const EVENT_BUFFER_SIZE: usize = 64;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

type ReadyFuture = Shared<BoxFuture<'static, Result<()>>>;

enum Command {
    Send {
        request_id: u64,
        frame: Vec<u8>,
        reply: ReplySender,
    },
    Ping {
        done: oneshot::Sender<Result<()>>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

impl Command {
    fn abort(self, error: LedgerError) {
        match self {
            Self::Send { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Self::Ping { done } => {
                let _ = done.send(Err(error));
            }
            Self::Close { done } => {
                let _ = done.send(());
            }
        }
    }
}

/// Handle to one multiplexed connection to a ledger node.
///
/// Connecting starts immediately and in the background. Every caller that
/// sends before the link is up waits on the same connection attempt, so the
/// transport is opened exactly once.
#[derive(Clone)]
pub struct LedgerConnection {
    commands: mpsc::UnboundedSender<Command>,
    ready: ReadyFuture,
    ids: Arc<RequestIdAllocator>,
    events: broadcast::Sender<ConnectionEvent>,
    params: Arc<ConnectionParams>,
    settings: ClientSettings,
}

impl fmt::Debug for LedgerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConnection")
            .field("endpoint", &self.params.endpoint())
            .field("settings", &self.settings)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl LedgerConnection {
    /// Resolve `config` and start connecting over `transport`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<T>(config: &LedgerConfig, transport: T) -> Result<Self>
    where
        T: Transport + 'static,
    {
        let (params, settings) = config.resolve()?;
        Ok(Self::connect_with_params(params, settings, transport))
    }

    /// Start connecting to an already resolved node
    pub fn connect_with_params<T>(params: ConnectionParams, settings: ClientSettings, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let ready = ready_rx
            .map(|outcome| outcome.unwrap_or_else(|_| Err(LedgerError::closed())))
            .boxed()
            .shared();

        let params = Arc::new(params);
        let driver = Driver {
            params: params.clone(),
            settings,
            table: PendingTable::new(),
            events: events.clone(),
        };
        tokio::spawn(driver.run(transport, command_rx, ready_tx));

        Self {
            commands,
            ready,
            ids: Arc::new(RequestIdAllocator::new()),
            events,
            params,
            settings,
        }
    }

    /// Issue the next request id for this connection
    pub fn new_request_id(&self) -> u64 {
        self.ids.next_id()
    }

    /// Wait until the link is open, or report why it never will be
    pub async fn ready(&self) -> Result<()> {
        self.ready.clone().await
    }

    /// Sign and send `request`, then wait for the node's answer.
    ///
    /// A request without a `reqId` is given the next id from this
    /// connection before it is signed. Resolves with the full reply frame,
    /// or fails with the node's rejection, a timeout, or `Closed`.
    pub async fn send(&self, request: OutgoingRequest, options: &SigningOptions) -> Result<Value> {
        let (request_id, request) = match request.request_id()? {
            Some(request_id) => (request_id, request),
            None => {
                let request_id = self.ids.next_id();
                (request_id, request.with_request_id(request_id))
            }
        };

        self.ready().await?;

        let frame = options.apply(&request).to_frame()?;
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Send {
                request_id,
                frame,
                reply,
            })
            .map_err(|_| LedgerError::closed())?;

        outcome.await.unwrap_or_else(|_| Err(LedgerError::closed()))
    }

    /// Send a request given as a JSON object
    pub async fn send_json(&self, request: Value, options: &SigningOptions) -> Result<Value> {
        self.send(OutgoingRequest::from_value(request)?, options).await
    }

    /// Write a heartbeat; the reply arrives as [`ConnectionEvent::Pong`]
    pub async fn ping(&self) -> Result<()> {
        self.ready().await?;

        let (done, outcome) = oneshot::channel();
        self.commands
            .send(Command::Ping { done })
            .map_err(|_| LedgerError::closed())?;
        outcome.await.unwrap_or_else(|_| Err(LedgerError::closed()))
    }

    /// Shut the connection down.
    ///
    /// Every pending request fails with `Closed`. Safe to call more than
    /// once and from any clone; later calls return immediately.
    pub async fn close(&self) {
        let (done, closed) = oneshot::channel();
        if self.commands.send(Command::Close { done }).is_ok() {
            let _ = closed.await;
        }
    }

    /// Whether the driver has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Subscribe to connection-level events
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Node this connection talks to
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Timeout and sweep settings in effect
    pub fn settings(&self) -> ClientSettings {
        self.settings
    }
}

struct Driver {
    params: Arc<ConnectionParams>,
    settings: ClientSettings,
    table: PendingTable,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Driver {
    async fn run<T: Transport>(
        mut self,
        transport: T,
        mut commands: mpsc::UnboundedReceiver<Command>,
        ready: oneshot::Sender<Result<()>>,
    ) {
        let params = self.params.clone();
        let keys = ClientKeyPair::generate();
        info!(
            endpoint = %params.endpoint(),
            transport = transport.transport_type(),
            "opening ledger link"
        );

        let mut closers = Vec::new();
        let mut open = transport.open(&params, &keys);
        let opened = loop {
            tokio::select! {
                opened = &mut open => break Some(opened),
                // Send and Ping wait on `ready`, so only Close can arrive before the link is up
                command = commands.recv() => match command {
                    Some(Command::Close { done }) => {
                        closers.push(done);
                        break None;
                    }
                    Some(command) => command.abort(LedgerError::network("link is not open")),
                    None => break None,
                },
            }
        };
        drop(open);

        let link = match opened {
            Some(Ok(link)) => {
                info!(endpoint = %params.endpoint(), "ledger link open");
                let _ = ready.send(Ok(()));
                link
            }
            Some(Err(err)) => {
                warn!(endpoint = %params.endpoint(), error = %err, "ledger link failed to open");
                let _ = ready.send(Err(err.clone()));
                self.emit(ConnectionEvent::Error(err));
                self.shutdown(commands, closers);
                return;
            }
            None => {
                debug!("closed before the link opened");
                let _ = ready.send(Err(LedgerError::closed()));
                self.shutdown(commands, closers);
                return;
            }
        };

        let Link {
            outbound,
            mut inbound,
        } = link;

        let mut sweep = tokio::time::interval(self.settings.sweep_interval.max(MIN_SWEEP_INTERVAL));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(done) = self.handle(command, &outbound) {
                            closers.push(done);
                            break;
                        }
                    }
                    None => {
                        debug!("every connection handle dropped");
                        break;
                    }
                },

                frame = inbound.recv() => match frame {
                    Some(bytes) => {
                        if let Some(event) = dispatch(&mut self.table, &bytes, Instant::now()) {
                            self.emit(event);
                        }
                    }
                    None => {
                        let err = LedgerError::network("link closed by peer");
                        warn!(error = %err, pending = self.table.len(), "ledger link lost");
                        self.emit(ConnectionEvent::Error(err));
                        break;
                    }
                },

                _ = sweep.tick() => self.sweep(),
            }
        }

        drop(outbound);
        drop(inbound);
        self.shutdown(commands, closers);
    }

    fn handle(
        &mut self,
        command: Command,
        outbound: &mpsc::UnboundedSender<Vec<u8>>,
    ) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::Send {
                request_id,
                frame,
                reply,
            } => {
                // Register first so a fast reply always finds its entry
                if !self.table.register(request_id, reply, Instant::now()) {
                    warn!(request_id, "request id already pending");
                    return ControlFlow::Continue(());
                }
                if outbound.send(frame).is_err() {
                    let _ = self
                        .table
                        .reject(request_id, LedgerError::network("link is not writable"));
                } else {
                    debug!(request_id, pending = self.table.len(), "request sent");
                }
            }
            Command::Ping { done } => {
                let outcome = outbound
                    .send(PING.to_vec())
                    .map_err(|_| LedgerError::network("link is not writable"));
                let _ = done.send(outcome);
            }
            Command::Close { done } => return ControlFlow::Break(done),
        }
        ControlFlow::Continue(())
    }

    fn sweep(&mut self) {
        let timeout = self.settings.timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        for request_id in self.table.evict_expired(Instant::now(), timeout) {
            warn!(request_id, timeout_ms, "request timed out");
        }
    }

    fn shutdown(mut self, mut commands: mpsc::UnboundedReceiver<Command>, closers: Vec<oneshot::Sender<()>>) {
        commands.close();
        while let Ok(command) = commands.try_recv() {
            command.abort(LedgerError::closed());
        }

        let rejected = self.table.close_all();
        info!(endpoint = %self.params.endpoint(), rejected, "ledger connection closed");
        self.emit(ConnectionEvent::Closed);

        for done in closers {
            let _ = done.send(());
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
