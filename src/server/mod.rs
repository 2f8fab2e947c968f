//! Simulated CMPP gateway (ISMG).
//!
//! [`Gateway`] accepts SP connections, authenticates them, answers
//! submissions after a simulated network delay and pushes status reports
//! back. All sessions share one receive window and one worker pool.
//!
//! ```no_run
//! use ismg::config::Config;
//! use ismg::server::Gateway;
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::new(Config::default())?;
//! let listener = TcpListener::bind("0.0.0.0:7890").await?;
//! gateway.serve(listener).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod handler;
mod heartbeat;
mod pipeline;
pub mod pool;
pub mod session;
pub mod simulation;
pub mod window;

#[cfg(test)]
mod tests;

pub use error::{GatewayError, GatewayResult};
pub use pool::WorkerPool;
pub use session::{ConnectionHandle, JobGuard, Session, SessionState, SessionTable};
pub use simulation::Simulator;
pub use window::{ReceiveWindow, WindowStatistics};

use crate::config::Config;
use crate::datatypes::Terminate;
use crate::sequence::{SequenceGenerator, Sequences};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// State shared by every task of one gateway
#[derive(Debug)]
pub(crate) struct GatewayContext {
    pub(crate) config: Config,
    pub(crate) sessions: SessionTable,
    pub(crate) window: ReceiveWindow,
    pub(crate) pool: WorkerPool,
    pub(crate) simulator: Simulator,
    pub(crate) sequences: Sequences,
}

#[derive(Debug, Clone)]
pub struct Gateway {
    ctx: Arc<GatewayContext>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Gateway {
    pub fn new(config: Config) -> GatewayResult<Self> {
        config.validate()?;

        let gateway = &config.gateway;
        let ctx = GatewayContext {
            sessions: SessionTable::new(),
            window: ReceiveWindow::new(gateway.receive_window_size),
            pool: WorkerPool::new(gateway.worker_pool_size),
            simulator: Simulator::new(config.simulation.clone()),
            sequences: Sequences::new(gateway.datacenter_id, gateway.worker_id),
            config,
        };
        let (shutdown, _) = watch::channel(false);

        Ok(Gateway {
            ctx: Arc::new(ctx),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Accept connections on `listener` until [`Gateway::shutdown`] is called
    pub async fn serve(&self, listener: TcpListener) -> GatewayResult<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        tokio::spawn(heartbeat::run(self.ctx.clone(), self.shutdown.subscribe()));
        info!(
            addr = %listener.local_addr()?,
            version = %self.ctx.config.gateway.version,
            "gateway listening"
        );

        loop {
            let (socket, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("accept failed: {}", e);
                        continue;
                    }
                },
                _ = shutdown.changed() => break,
            };

            let gateway = &self.ctx.config.gateway;
            if self.ctx.sessions.len() >= gateway.max_connections {
                warn!(
                    %peer,
                    limit = gateway.max_connections,
                    "connection limit reached, rejecting"
                );
                drop(socket);
                continue;
            }
            if self.ctx.window.is_full() {
                warn!(%peer, "receive window full, rejecting connection");
                drop(socket);
                continue;
            }

            if let Err(e) = socket.set_nodelay(true) {
                debug!(%peer, "set_nodelay: {}", e);
            }
            tokio::spawn(handler::run(self.ctx.clone(), socket, peer));
        }

        info!("gateway stopped accepting connections");
        Ok(())
    }

    /// Ask one SP to end its session.
    ///
    /// Terminate goes out once every worker job already replying on the
    /// connection has queued its frames, or after the shutdown grace period.
    /// The connection is then closed when the SP answers with TerminateResp
    /// or after another grace period, whichever comes first.
    pub async fn terminate(&self, peer: SocketAddr) -> GatewayResult<()> {
        let (handle, version) = self
            .ctx
            .sessions
            .handle(&peer)
            .ok_or(GatewayError::UnknownSession(peer))?;

        self.ctx.sessions.set_state(&peer, SessionState::Closing);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let grace = ctx.config.gateway.shutdown_grace();
            if tokio::time::timeout(grace, handle.wait_idle()).await.is_err() {
                warn!(
                    %peer,
                    pending = handle.pending_jobs(),
                    "replies still pending, terminating anyway"
                );
            }

            let terminate = Terminate::new(ctx.sequences.frames.next_val());
            if !handle.send_pdu(&terminate, version).await {
                return;
            }

            tokio::time::sleep(grace).await;
            if !handle.is_closed() {
                debug!(%peer, "no terminate response, closing");
                handle.close().await;
            }
        });
        Ok(())
    }

    /// Stop accepting, terminate every session and wait for them to go away
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        for peer in self.ctx.sessions.peers() {
            if let Err(e) = self.terminate(peer).await {
                debug!(%peer, "terminate during shutdown: {}", e);
            }
        }

        // One grace period for pending replies, one for TerminateResp
        let grace = self.ctx.config.gateway.shutdown_grace() * 2;
        let drained = tokio::time::timeout(grace, async {
            while !self.ctx.sessions.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        })
        .await;

        if drained.is_err() {
            for peer in self.ctx.sessions.peers() {
                if let Some((handle, _)) = self.ctx.sessions.handle(&peer) {
                    handle.close().await;
                }
            }
        }
        info!("gateway shut down");
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.ctx.sessions
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.ctx.sessions.peers()
    }

    pub fn window_statistics(&self) -> WindowStatistics {
        self.ctx.window.statistics()
    }
}

/// Bind `0.0.0.0:port` and serve until `signal` resolves, then shut down
pub async fn run(config: Config, port: u16, signal: impl Future) -> GatewayResult<()> {
    let gateway = Gateway::new(config)?;
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;

    let server = gateway.clone();
    let serving = tokio::spawn(async move { server.serve(listener).await });

    signal.await;
    info!("shutdown requested");
    gateway.shutdown().await;

    match serving.await {
        Ok(result) => result,
        Err(e) => {
            error!("accept loop failed: {}", e);
            Ok(())
        }
    }
}
