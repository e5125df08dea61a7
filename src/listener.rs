use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{FutureExt, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_semantic_conventions as semconv;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use ulid::Ulid;

use crate::handler::AssociationHandler;
use crate::negotiator::RejectReason;
use crate::service::ServiceProvider;

/// How long a connection turned down for capacity reasons may take to send its
/// association request.
const REJECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How many over-capacity connections may wait for their A-ASSOCIATE-RJ at once. Beyond
/// that, connections are closed as soon as they are accepted.
pub const MAX_PENDING_REJECTS: usize = 4;

/// Pause after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Listen for incoming associations on a TCP port.
///
/// Every connection is handled by an [AssociationHandler] in its own task, as long as
/// fewer than `max_associations` are active. Connections beyond that are answered with
/// an A-ASSOCIATE-RJ (local limit exceeded), up to [MAX_PENDING_REJECTS] of them at a
/// time. The rest are closed right away.
pub struct Listener<P> {
    listener: TcpListener,
    handler: Arc<AssociationHandler<P>>,
    permits: Arc<Semaphore>,
    reject_permits: Arc<Semaphore>,
    max_associations: NonZeroUsize,
}

impl<P: ServiceProvider> Listener<P> {
    pub async fn bind<A: ToSocketAddrs>(
        address: A,
        handler: AssociationHandler<P>,
        max_associations: NonZeroUsize,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
            permits: Arc::new(Semaphore::new(max_associations.get())),
            reject_permits: Arc::new(Semaphore::new(MAX_PENDING_REJECTS)),
            max_associations,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of associations currently being handled.
    pub fn active_associations(&self) -> usize {
        self.max_associations.get() - self.permits.available_permits()
    }

    /// Accept connections until the task is cancelled.
    ///
    /// `finite_connections` is only used for testing. It tells the listener to stop
    /// accepting after the given number of connections, or on the first error. In that
    /// case, returns after every accepted connection was handled.
    pub async fn run(&self, finite_connections: Option<usize>) -> anyhow::Result<()> {
        let tracer = global::tracer(env!("CARGO_PKG_NAME"));
        let mut tasks = JoinSet::new();
        let mut remaining = finite_connections;
        while remaining != Some(0) {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("could not accept connection: {}", e);
                    if finite_connections.is_some() {
                        return Err(e.into());
                    }
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };
            remaining = remaining.map(|n| n - 1);

            let ulid = Ulid::new();
            let cx = Context::current_with_span(tracer.start("association"));
            cx.span().set_attributes([
                KeyValue::new("association_ulid", ulid.to_string()),
                KeyValue::new(semconv::trace::CLIENT_ADDRESS, peer.ip().to_string()),
                KeyValue::new(semconv::trace::CLIENT_PORT, peer.port() as i64),
            ]);
            let handler = Arc::clone(&self.handler);
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => {
                    tasks.spawn(async move {
                        let result = handler
                            .handle(stream, ulid, Some(peer))
                            .with_context(cx.clone())
                            .await;
                        drop(permit);
                        match result {
                            Ok(_) => cx.span().set_status(Status::Ok),
                            Err(e) => cx.span().set_status(Status::error(e.to_string())),
                        }
                    });
                }
                Err(_) => match Arc::clone(&self.reject_permits).try_acquire_owned() {
                    Ok(reject_permit) => {
                        tracing::warn!(
                            association = %ulid,
                            "Maximum associations reached, rejecting connection from {}",
                            peer
                        );
                        tasks.spawn(async move {
                            handler
                                .reject(
                                    stream,
                                    ulid,
                                    Some(peer),
                                    RejectReason::LocalLimitExceeded,
                                    REJECT_TIMEOUT,
                                )
                                .with_context(cx.clone())
                                .await;
                            drop(reject_permit);
                            cx.span().set_status(Status::error(
                                RejectReason::LocalLimitExceeded.to_string(),
                            ));
                        });
                    }
                    Err(_) => {
                        tracing::warn!(
                            association = %ulid,
                            "Too many pending rejections, closing connection from {}",
                            peer
                        );
                        drop(stream);
                        cx.span()
                            .set_status(Status::error("connection refused".to_string()));
                    }
                },
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!("association task failed: {}", e);
                }
            }
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("association task failed: {}", e);
            }
        }
        Ok(())
    }
}
