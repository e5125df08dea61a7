use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::config::settings_from_env;
use crate::event::EventSink;
use crate::handler::AssociationHandler;
use crate::listener::Listener;
use crate::service::{AcknowledgeProvider, ServiceProvider};
use crate::settings::ScpSettings;
use crate::storage::FilesystemStorage;

/// Calls [run_server] using configuration from environment variables.
///
/// Received instances are written to `files_root` if it is configured, and discarded
/// otherwise.
///
/// `finite_connections`: shut down the server after the given number of connections.
pub async fn run_server_from_env(finite_connections: Option<usize>) -> anyhow::Result<()> {
    let settings = settings_from_env()?;
    let on_start: Option<fn(SocketAddr)> = None;
    match settings.files_root.clone() {
        Some(files_root) => {
            let provider = FilesystemStorage::new(files_root);
            run_server(settings, provider, EventSink::none(), finite_connections, on_start).await
        }
        None => {
            tracing::warn!("files_root is not set, received instances will be discarded");
            run_server(
                settings,
                AcknowledgeProvider,
                EventSink::none(),
                finite_connections,
                on_start,
            )
            .await
        }
    }
}

/// Listen for associations on the configured port, serving them with `provider`.
///
/// `on_start` is called with the bound address once the server is ready for connections.
/// `finite_connections` is only used for testing, see [Listener::run].
pub async fn run_server<P, F>(
    settings: ScpSettings,
    provider: P,
    events: EventSink,
    finite_connections: Option<usize>,
    on_start: Option<F>,
) -> anyhow::Result<()>
where
    P: ServiceProvider,
    F: FnOnce(SocketAddr),
{
    settings.validate()?;
    let handler = AssociationHandler::new(settings.negotiator(), Arc::new(provider), events)
        .strict(settings.strict)
        .idle_timeout(settings.idle_timeout);
    let address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, settings.port);
    let listener = Listener::bind(address, handler, settings.max_associations).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(
        aet = settings.aet.as_str(),
        max_associations = settings.max_associations.get(),
        "listening on: tcp://{}",
        local_addr
    );
    if let Some(f) = on_start {
        f(local_addr)
    }
    listener.run(finite_connections).await
}
