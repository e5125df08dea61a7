use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Once;
use std::time::Duration;

use dicom_ul::pdu::{AssociationRQ, PresentationContextProposed, UserVariableItem};
use oxiscp::{
    DICOM_APPLICATION_CONTEXT, EventSink, PduStream, ScpSettings, ServiceProvider, run_server,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub(crate) const CALLING_AE_TITLE: &str = "OXISCPTEST";
pub(crate) const CALLED_AE_TITLE: &str = "ANY-SCP";

static INIT_LOGGING: Once = Once::new();

pub(crate) fn init_logging() {
    INIT_LOGGING.call_once(|| {
        tracing::subscriber::set_global_default(
            tracing_subscriber::FmtSubscriber::builder()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .finish(),
        )
        .unwrap()
    })
}

/// Settings for a server listening on an ephemeral port.
pub(crate) fn create_test_settings() -> ScpSettings {
    ScpSettings {
        port: 0,
        ..Default::default()
    }
}

/// Start the server in the background, returning once it is ready for connections.
pub(crate) async fn start_server<P: ServiceProvider>(
    settings: ScpSettings,
    provider: P,
    events: EventSink,
    finite_connections: Option<usize>,
) -> (SocketAddr, JoinHandle<anyhow::Result<()>>) {
    init_logging();
    let (start_tx, mut start_rx) = tokio::sync::mpsc::unbounded_channel();
    let on_start = move |x: SocketAddr| start_tx.send(x).unwrap();
    let server = run_server(settings, provider, events, finite_connections, Some(on_start));
    let server_handle = tokio::spawn(server);
    // wait for message from `on_start` indicating server is ready for connections
    let bound = start_rx.recv().await.unwrap();
    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, bound.port()));
    (address, server_handle)
}

/// A client speaking raw PDUs, able to do what a well-behaved SCU would not.
pub(crate) async fn raw_client(address: SocketAddr) -> PduStream<TcpStream> {
    let stream = TcpStream::connect(address).await.unwrap();
    PduStream::new(stream, 16384).idle_timeout(Some(Duration::from_secs(10)))
}

pub(crate) fn association_rq(
    called_ae_title: &str,
    contexts: &[(u8, &str, &[&str])],
) -> AssociationRQ {
    AssociationRQ {
        protocol_version: 1,
        calling_ae_title: CALLING_AE_TITLE.to_string(),
        called_ae_title: called_ae_title.to_string(),
        application_context_name: DICOM_APPLICATION_CONTEXT.to_string(),
        presentation_contexts: contexts
            .iter()
            .map(|(id, abstract_syntax, transfer_syntaxes)| PresentationContextProposed {
                id: *id,
                abstract_syntax: abstract_syntax.to_string(),
                transfer_syntaxes: transfer_syntaxes.iter().map(|ts| ts.to_string()).collect(),
            })
            .collect(),
        user_variables: vec![
            UserVariableItem::MaxLength(16384),
            UserVariableItem::ImplementationClassUID("1.2.3.4.5".to_string()),
        ],
    }
}
