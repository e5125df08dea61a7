//! Handles one connection, from the association request to the closed connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dicom_ul::Pdu;
use dicom_ul::pdu::{AbortRQServiceProviderReason, AbortRQSource};
use opentelemetry::KeyValue;
use opentelemetry::trace::TraceContextExt;
use tokio::io::{AsyncRead, AsyncWrite};
use ulid::Ulid;

use crate::association::{Association, AssociationState};
use crate::dispatcher::{Dispatcher, pdu_name};
use crate::error::{AssociationError, ErrorKind};
use crate::event::{AssociationEvent, CloseReason, EventSink};
use crate::negotiator::{Negotiation, Negotiator, RejectReason};
use crate::service::ServiceProvider;
use crate::transport::PduStream;

/// Drives associations through their lifecycle.
///
/// One handler is shared by every connection of a listener.
pub struct AssociationHandler<P> {
    negotiator: Negotiator,
    dispatcher: Dispatcher<P>,
    provider: Arc<P>,
    events: EventSink,
    strict: bool,
    idle_timeout: Option<Duration>,
}

impl<P: ServiceProvider> AssociationHandler<P> {
    pub fn new(negotiator: Negotiator, provider: Arc<P>, events: EventSink) -> Self {
        Self {
            negotiator,
            dispatcher: Dispatcher::new(Arc::clone(&provider), events.clone()),
            provider,
            events,
            strict: false,
            idle_timeout: None,
        }
    }

    /// Whether incoming PDUs longer than our maximum PDU length are a protocol error.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Abort associations on which nothing was received for this long.
    pub fn idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Handle an association over the given connection.
    ///
    /// Always ends with the association closed and the connection shut down. The returned
    /// error, if any, is what brought the association down.
    pub async fn handle<S>(
        &self,
        stream: S,
        ulid: Ulid,
        peer: Option<SocketAddr>,
    ) -> Result<CloseReason, AssociationError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.events.emit(AssociationEvent::Opened { ulid, peer });
        let mut stream = PduStream::new(stream, self.negotiator.max_pdu_length())
            .strict(self.strict)
            .idle_timeout(self.idle_timeout);
        let mut association = Association::new(ulid);

        let result = self.run(&mut association, &mut stream).await;
        let reason = match &result {
            Ok(reason) => *reason,
            Err(e) => {
                self.on_error(&association, &mut stream, e).await;
                CloseReason::Error
            }
        };
        association.close();
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(association = %ulid, error = %e, "could not shut down connection");
        }
        self.events.emit(AssociationEvent::Closed { ulid, reason });
        result
    }

    /// Turn down a connection without negotiating, e.g. because too many associations are
    /// active. The peer's association request is answered with an A-ASSOCIATE-RJ.
    ///
    /// Waits at most `timeout` for the association request.
    pub async fn reject<S>(
        &self,
        stream: S,
        ulid: Ulid,
        peer: Option<SocketAddr>,
        reason: RejectReason,
        timeout: Duration,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.events.emit(AssociationEvent::Opened { ulid, peer });
        let mut stream = PduStream::new(stream, self.negotiator.max_pdu_length())
            .strict(self.strict)
            .idle_timeout(Some(timeout));
        let close_reason = match stream.read_pdu().await {
            Ok(Some(Pdu::AssociationRQ(_))) => {
                match stream.write_pdu(&Pdu::AssociationRJ(reason.to_pdu())).await {
                    Ok(()) => {
                        self.events
                            .emit(AssociationEvent::Rejected { ulid, reason });
                        CloseReason::Rejected
                    }
                    Err(e) => {
                        tracing::warn!(association = %ulid, error = %e, "could not send A-ASSOCIATE-RJ");
                        CloseReason::Error
                    }
                }
            }
            Ok(_) => CloseReason::Error,
            Err(e) => {
                tracing::warn!(association = %ulid, error = %e, "no association request received");
                CloseReason::Error
            }
        };
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(association = %ulid, error = %e, "could not shut down connection");
        }
        self.events.emit(AssociationEvent::Closed {
            ulid,
            reason: close_reason,
        });
    }

    async fn run<S>(
        &self,
        association: &mut Association,
        stream: &mut PduStream<S>,
    ) -> Result<CloseReason, AssociationError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let rq = match stream.read_pdu().await? {
            Some(Pdu::AssociationRQ(rq)) => rq,
            Some(Pdu::Unknown { pdu_type, .. }) => {
                return Err(AssociationError::UnrecognizedPdu(pdu_type));
            }
            Some(pdu) => {
                return Err(AssociationError::UnexpectedPdu {
                    pdu: pdu_name(&pdu),
                    state: association.state,
                });
            }
            None => {
                return Err(AssociationError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "connection closed before an association was requested",
                )));
            }
        };

        match self
            .negotiator
            .negotiate(&rq, association, self.provider.as_ref())
        {
            Negotiation::Accept(ac) => {
                stream.write_pdu(&Pdu::AssociationAC(ac)).await?;
                opentelemetry::Context::current().span().set_attribute(KeyValue::new(
                    "aec",
                    association.calling_ae_title.to_string(),
                ));
                self.events.emit(AssociationEvent::Accepted {
                    ulid: association.ulid,
                    aec: association.calling_ae_title.clone(),
                    contexts: association
                        .presentation_contexts
                        .iter()
                        .map(|pc| (pc.id, pc.result.clone()))
                        .collect(),
                });
                self.dispatcher.serve(association, stream).await
            }
            Negotiation::Reject(reason) => {
                tracing::warn!(
                    association = %association.ulid,
                    kind = ?ErrorKind::NegotiationFailure,
                    "association rejected: {}",
                    reason
                );
                stream
                    .write_pdu(&Pdu::AssociationRJ(reason.to_pdu()))
                    .await?;
                self.events.emit(AssociationEvent::Rejected {
                    ulid: association.ulid,
                    reason,
                });
                Ok(CloseReason::Rejected)
            }
        }
    }

    /// Protocol violations are answered with an A-ABORT. Transport failures are not
    /// answered at all.
    async fn on_error<S>(
        &self,
        association: &Association,
        stream: &mut PduStream<S>,
        error: &AssociationError,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let kind = error.kind();
        tracing::error!(
            association = %association.ulid,
            state = ?association.state,
            kind = ?kind,
            "{}",
            error
        );
        if kind != ErrorKind::ProtocolViolation || association.state == AssociationState::Closed {
            return;
        }
        let abort = Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(abort_reason(error)),
        };
        if let Err(e) = stream.write_pdu(&abort).await {
            tracing::debug!(association = %association.ulid, error = %e, "could not send A-ABORT");
        }
    }
}

fn abort_reason(error: &AssociationError) -> AbortRQServiceProviderReason {
    match error {
        AssociationError::UnrecognizedPdu(_) => AbortRQServiceProviderReason::UnrecognizedPdu,
        AssociationError::UnexpectedPdu { .. } | AssociationError::Closed => {
            AbortRQServiceProviderReason::UnexpectedPdu
        }
        _ => AbortRQServiceProviderReason::InvalidPduParameter,
    }
}
