use std::time::Duration;

use dicom::core::{DataDictionary, Tag};
use dicom::dictionary_std::StandardDataDictionary;

use crate::association::AssociationState;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classes of failure during an association, which decide how the failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Answered with an association reject, or a per-context rejection.
    NegotiationFailure,
    /// Answered with a failure status; the association stays open.
    ServiceLevelFailure,
    /// Fatal to the association. Answered with an abort when the protocol allows it.
    ProtocolViolation,
    /// Fatal to the association. Nothing more is written to the connection.
    TransportFailure,
}

/// Error which ends an association.
#[derive(thiserror::Error, Debug)]
pub enum AssociationError {
    #[error("unexpected {pdu} PDU while association is {state:?}")]
    UnexpectedPdu {
        pdu: &'static str,
        state: AssociationState,
    },

    #[error("unrecognized PDU type {0:#04x}")]
    UnrecognizedPdu(u8),

    #[error("association is closed")]
    Closed,

    #[error("malformed DIMSE message: {0}")]
    MalformedMessage(&'static str),

    #[error("Failed to read incoming DICOM command")]
    FailedToReadCommand(#[source] dicom::object::ReadError),

    #[error("Missing {}", name_of(.0))]
    MissingTag(Tag),

    #[error("Value for {} is not a number", name_of(.0))]
    InvalidNumber(Tag),

    #[error("Could not retrieve {}", name_of(.0))]
    CouldNotRetrieve(Tag),

    #[error("{0}")]
    CannotRespond(&'static str),

    #[error("no PDU received within {0:?}")]
    IdleTimeout(Duration),

    #[error("could not decode PDU")]
    ReadPdu(#[source] BoxError),

    #[error("malformed PDU of type {0:#04x}: an item is longer than the PDU")]
    MalformedPdu(u8),

    #[error("could not encode PDU")]
    WritePdu(#[source] BoxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AssociationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssociationError::UnexpectedPdu { .. }
            | AssociationError::UnrecognizedPdu(_)
            | AssociationError::Closed
            | AssociationError::MalformedMessage(_)
            | AssociationError::FailedToReadCommand(_)
            | AssociationError::MissingTag(_)
            | AssociationError::InvalidNumber(_)
            | AssociationError::CouldNotRetrieve(_)
            | AssociationError::ReadPdu(_)
            | AssociationError::MalformedPdu(_) => ErrorKind::ProtocolViolation,
            AssociationError::CannotRespond(_)
            | AssociationError::IdleTimeout(_)
            | AssociationError::WritePdu(_)
            | AssociationError::Io(_) => ErrorKind::TransportFailure,
        }
    }
}

/// Error which might happen while writing a received DICOM instance to storage.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error("transfer syntax {0} is not supported")]
    UnsupportedTransferSyntax(String),

    #[error("Failed to read DICOM data object")]
    FailedToReadObject(#[from] dicom::object::ReadError),

    #[error("failed to build DICOM meta file information")]
    FailedToBuildMeta(#[from] dicom::object::meta::Error),

    #[error(transparent)]
    Write(#[from] dicom::object::WriteError),

    #[error("DICOM data set does not have the required tag: \"{}\"", name_of(.0))]
    MissingTag(Tag),

    #[error("storage task panicked")]
    Join(#[from] tokio::task::JoinError),
}

/// Invalid configuration, detected before the server starts.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("max PDU length {0} is outside of the range 4096..=131072")]
    MaxPduLength(u32),

    #[error("no {0} transfer syntaxes are configured")]
    NoTransferSyntaxes(&'static str),

    #[error("\"{0}\" is not a valid UID")]
    InvalidUid(String),

    #[error("\"{0}\" is not a valid AE title")]
    InvalidAeTitle(String),
}

/// Get the standard name of a tag.
fn name_of(tag: &Tag) -> &'static str {
    StandardDataDictionary
        .by_tag(*tag)
        .map(|e| e.alias)
        .unwrap_or("unknown tag")
}
