//! The state of one association, owned by its association handler.

use dicom_ul::pdu::{PresentationContextProposed, PresentationContextResultReason};
use ulid::Ulid;

use crate::ae_title::{ClientAETitle, OurAETitle, trim_ae_title};
use crate::sop_class::ServiceCategory;
use crate::transfer_syntax::trim_uid;

/// Lifecycle of an association.
///
/// ```text
/// Idle -> Connecting -> Associated -> Releasing -> Closed
///            |              |
///            +--> Closed    +--> Closed (abort or error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    /// Connection accepted, nothing received yet.
    Idle,
    /// Association request received, negotiation in progress.
    Connecting,
    /// Negotiation accepted, service requests may be exchanged.
    Associated,
    /// Release request received, release response not yet sent.
    Releasing,
    /// Terminal state.
    Closed,
}

/// Why a presentation context was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRejection {
    AbstractSyntaxNotSupported,
    NoAcceptableTransferSyntax,
    /// Provider rejection without a specific reason, e.g. a duplicate context ID.
    NoReason,
}

impl ContextRejection {
    pub fn pdu_reason(&self) -> PresentationContextResultReason {
        match self {
            ContextRejection::AbstractSyntaxNotSupported => {
                PresentationContextResultReason::AbstractSyntaxNotSupported
            }
            ContextRejection::NoAcceptableTransferSyntax => {
                PresentationContextResultReason::TransferSyntaxesNotSupported
            }
            ContextRejection::NoReason => PresentationContextResultReason::NoReason,
        }
    }
}

impl std::fmt::Display for ContextRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            ContextRejection::AbstractSyntaxNotSupported => "abstract syntax not supported",
            ContextRejection::NoAcceptableTransferSyntax => "no acceptable transfer syntax",
            ContextRejection::NoReason => "no reason",
        };
        f.write_str(reason)
    }
}

/// Outcome of negotiating one presentation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextResult {
    Proposed,
    Accepted { transfer_syntax: String },
    Rejected(ContextRejection),
}

/// One negotiable unit within an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
    pub category: ServiceCategory,
    pub result: ContextResult,
}

impl PresentationContext {
    pub(crate) fn proposed(pc: &PresentationContextProposed, category: ServiceCategory) -> Self {
        Self {
            id: pc.id,
            abstract_syntax: trim_uid(&pc.abstract_syntax).to_string(),
            transfer_syntaxes: pc
                .transfer_syntaxes
                .iter()
                .map(|ts| trim_uid(ts).to_string())
                .collect(),
            category,
            result: ContextResult::Proposed,
        }
    }

    /// The agreed transfer syntax, if this context was accepted.
    pub fn transfer_syntax(&self) -> Option<&str> {
        match &self.result {
            ContextResult::Accepted { transfer_syntax } => Some(transfer_syntax),
            _ => None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.result, ContextResult::Accepted { .. })
    }
}

/// A negotiated session with one peer over one connection.
#[derive(Debug)]
pub struct Association {
    /// Identifies this association in logs and events.
    pub ulid: Ulid,
    pub calling_ae_title: ClientAETitle,
    pub called_ae_title: OurAETitle,
    pub presentation_contexts: Vec<PresentationContext>,
    pub state: AssociationState,
    /// Maximum length of P-DATA PDUs the peer is able to receive. 0 means unlimited.
    pub peer_max_pdu_length: u32,
}

impl Association {
    pub fn new(ulid: Ulid) -> Self {
        Self {
            ulid,
            calling_ae_title: ClientAETitle::from_static(""),
            called_ae_title: OurAETitle::from_static(""),
            presentation_contexts: Vec::new(),
            state: AssociationState::Idle,
            peer_max_pdu_length: 0,
        }
    }

    pub(crate) fn set_titles(&mut self, calling: &str, called: &str) {
        self.calling_ae_title = ClientAETitle::from(trim_ae_title(calling));
        self.called_ae_title = OurAETitle::from(trim_ae_title(called));
    }

    pub fn presentation_context(&self, id: u8) -> Option<&PresentationContext> {
        self.presentation_contexts.iter().find(|pc| pc.id == id)
    }

    /// An accepted storage context with the given ID.
    pub fn accepted_storage_context(&self, id: u8) -> Option<&PresentationContext> {
        self.presentation_context(id)
            .filter(|pc| pc.category == ServiceCategory::Storage && pc.is_accepted())
    }

    pub fn is_closed(&self) -> bool {
        self.state == AssociationState::Closed
    }

    /// Move to [AssociationState::Closed]. No transition leaves it.
    pub(crate) fn close(&mut self) {
        self.state = AssociationState::Closed;
    }
}
