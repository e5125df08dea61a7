//! The contract between the association handler and the application providing the
//! Verification and Storage services.

use std::future::Future;

use bytes::Bytes;

use crate::association::Association;
use crate::negotiator::RejectReason;

/// A received C-STORE request, complete with its data set.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// AE title of the peer which sent the instance.
    pub calling_ae_title: String,
    pub presentation_context_id: u8,
    pub message_id: u16,
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    /// Transfer syntax of `dataset`, as agreed for the presentation context.
    pub transfer_syntax: String,
    /// The encoded data set, without file meta information.
    pub dataset: Bytes,
}

/// A storage provider's explanation for why an instance was not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    pub reason: String,
}

impl StoreFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl<E: std::error::Error> From<E> for StoreFailure {
    fn from(e: E) -> Self {
        Self::new(e.to_string())
    }
}

/// The application side of an association.
///
/// One value is shared by every association, so implementations must be [Sync] and
/// keep any per-request state inside the futures they return.
pub trait ServiceProvider: Send + Sync + 'static {
    /// Called once per association, after the AE title checks passed and before the
    /// presentation contexts are negotiated. Returning `Err` rejects the association.
    fn accept_association(&self, _association: &Association) -> Result<(), RejectReason> {
        Ok(())
    }

    /// Called once per C-ECHO request.
    fn echo(&self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called once per C-STORE request on an accepted storage presentation context.
    fn store(&self, request: StoreRequest) -> impl Future<Output = Result<(), StoreFailure>> + Send;
}

/// Acknowledges every request without doing anything with the data.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgeProvider;

impl ServiceProvider for AcknowledgeProvider {
    async fn store(&self, request: StoreRequest) -> Result<(), StoreFailure> {
        tracing::debug!(
            sop_instance_uid = request.sop_instance_uid,
            bytes = request.dataset.len(),
            "acknowledged instance"
        );
        Ok(())
    }
}

/// DIMSE operations we understand.
#[derive(Debug, Clone)]
pub enum ServiceRequest {
    Echo {
        presentation_context_id: u8,
        message_id: u16,
        sop_class_uid: String,
    },
    Store(StoreRequest),
}

impl ServiceRequest {
    pub fn presentation_context_id(&self) -> u8 {
        match self {
            ServiceRequest::Echo {
                presentation_context_id,
                ..
            } => *presentation_context_id,
            ServiceRequest::Store(request) => request.presentation_context_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceRequest::Echo { .. } => "C-ECHO",
            ServiceRequest::Store(_) => "C-STORE",
        }
    }
}

/// Status of a DIMSE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Coercion of data elements.
    Warning,
    /// Processing failure.
    Failure,
    /// Out of resources.
    Refused,
    UnrecognizedOperation,
}

impl Status {
    /// The value of the (0000,0900) Status element.
    pub fn code(&self) -> u16 {
        match self {
            Status::Success => 0x0000,
            Status::Warning => 0xB000,
            Status::Failure => 0x0110,
            Status::Refused => 0xA700,
            Status::UnrecognizedOperation => 0x0211,
        }
    }
}

/// Outcome of a service request, sent back to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResponse {
    pub status: Status,
    /// Sent as the (0000,0902) Error Comment element.
    pub reason: Option<String>,
}

impl ServiceResponse {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            reason: Some(reason.into()),
        }
    }
}
