use std::net::SocketAddr;

use tokio::sync::mpsc::UnboundedSender;
use ulid::Ulid;

use crate::ae_title::ClientAETitle;
use crate::association::ContextResult;
use crate::negotiator::RejectReason;
use crate::service::Status;

/// How an association ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly release requested by the peer.
    Release,
    /// The association request was rejected.
    Rejected,
    /// Aborted by the peer.
    Abort,
    /// Protocol violation or transport failure.
    Error,
}

/// Events which occur during an association.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationEvent {
    /// TCP connection accepted.
    Opened {
        /// ULID uniquely identifying the association
        ulid: Ulid,
        /// Address of the peer
        peer: Option<SocketAddr>,
    },
    /// Association request accepted.
    Accepted {
        ulid: Ulid,
        /// AE title of the peer
        aec: ClientAETitle,
        /// Outcome of every proposed presentation context, by context ID, in proposal order
        contexts: Vec<(u8, ContextResult)>,
    },
    /// Association request rejected.
    Rejected { ulid: Ulid, reason: RejectReason },
    /// A complete DIMSE request was received.
    RequestReceived {
        ulid: Ulid,
        operation: &'static str,
        presentation_context_id: u8,
        message_id: u16,
    },
    /// A DIMSE response was sent.
    ResponseSent {
        ulid: Ulid,
        operation: &'static str,
        message_id: u16,
        status: Status,
    },
    /// The association is over and its connection closed.
    Closed { ulid: Ulid, reason: CloseReason },
}

/// Where association events go: the log, and optionally a channel.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<UnboundedSender<AssociationEvent>>);

impl EventSink {
    pub fn new(sender: UnboundedSender<AssociationEvent>) -> Self {
        Self(Some(sender))
    }

    /// Log only.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: AssociationEvent) {
        log_event(&event);
        if let Some(sender) = &self.0 {
            // a dropped receiver means nobody is interested anymore
            let _ = sender.send(event);
        }
    }
}

fn log_event(event: &AssociationEvent) {
    match event {
        AssociationEvent::Opened { ulid, peer } => {
            tracing::info!(association = %ulid, peer = ?peer, "association opened")
        }
        AssociationEvent::Accepted {
            ulid,
            aec,
            contexts,
        } => {
            let accepted = contexts
                .iter()
                .filter(|(_, r)| matches!(r, ContextResult::Accepted { .. }))
                .count();
            tracing::info!(
                association = %ulid,
                aec = aec.as_str(),
                accepted,
                rejected = contexts.len() - accepted,
                "association accepted"
            );
            for (id, result) in contexts {
                tracing::debug!(association = %ulid, presentation_context = id, result = ?result);
            }
        }
        AssociationEvent::Rejected { ulid, reason } => {
            tracing::warn!(association = %ulid, reason = %reason, "association rejected")
        }
        AssociationEvent::RequestReceived {
            ulid,
            operation,
            presentation_context_id,
            message_id,
        } => tracing::debug!(
            association = %ulid,
            operation,
            presentation_context = presentation_context_id,
            message_id,
            "request received"
        ),
        AssociationEvent::ResponseSent {
            ulid,
            operation,
            message_id,
            status,
        } => tracing::debug!(
            association = %ulid,
            operation,
            message_id,
            status = ?status,
            "response sent"
        ),
        AssociationEvent::Closed { ulid, reason } => {
            tracing::info!(association = %ulid, reason = ?reason, "association closed")
        }
    }
}
