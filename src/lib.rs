mod ae_title;
mod assembler;
mod association;
mod config;
mod dimse;
mod dispatcher;
mod error;
mod event;
mod handler;
mod listener;
mod negotiator;
mod resolver;
mod sanitize;
mod server;
mod service;
mod settings;
mod sop_class;
mod storage;
mod transfer_syntax;
mod transport;

pub use ae_title::{AeTitlePolicy, ClientAETitle, InvalidAeTitle, OurAETitle};
pub use assembler::{DimseMessage, MessageAssembler};
pub use association::{
    Association, AssociationState, ContextRejection, ContextResult, PresentationContext,
};
pub use config::{get_config, settings_from_env};
pub use dimse::{C_ECHO_RQ, C_STORE_RQ, Command};
pub use dispatcher::{Dispatcher, Reply};
pub use error::{AssociationError, ErrorKind, SettingsError, StorageError};
pub use event::{AssociationEvent, CloseReason, EventSink};
pub use handler::AssociationHandler;
pub use listener::{Listener, MAX_PENDING_REJECTS};
pub use negotiator::{
    DICOM_APPLICATION_CONTEXT, IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME,
    Negotiation, Negotiator, RejectReason,
};
pub use resolver::resolve_transfer_syntax;
pub use server::{run_server, run_server_from_env};
pub use service::{
    AcknowledgeProvider, ServiceProvider, ServiceRequest, ServiceResponse, Status, StoreFailure,
    StoreRequest,
};
pub use settings::ScpSettings;
pub use sop_class::{ServiceCategory, VERIFICATION};
pub use storage::FilesystemStorage;
pub use transfer_syntax::*;
pub use transport::PduStream;
