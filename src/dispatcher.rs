//! Serving DIMSE requests on an established association.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use dicom_ul::Pdu;
use dicom_ul::pdu::PDataValueType;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::assembler::{DimseMessage, MessageAssembler};
use crate::association::{Association, AssociationState};
use crate::dimse::{C_ECHO_RQ, C_STORE_RQ, Command, create_response, pdata_pdus, write_command};
use crate::error::{AssociationError, ErrorKind};
use crate::event::{AssociationEvent, CloseReason, EventSink};
use crate::service::{ServiceProvider, ServiceRequest, ServiceResponse, Status, StoreRequest};
use crate::transport::PduStream;

/// The response to one DIMSE request, ready to be sent.
#[derive(Debug)]
pub struct Reply {
    pub operation: &'static str,
    pub message_id: u16,
    pub response: ServiceResponse,
    pub pdus: Vec<Pdu>,
}

/// Routes the requests of an association to a [ServiceProvider].
///
/// One dispatcher is shared by all associations. The [Association] it works on is
/// only borrowed for the duration of each call.
pub struct Dispatcher<P> {
    provider: Arc<P>,
    events: EventSink,
}

impl<P: ServiceProvider> Dispatcher<P> {
    pub fn new(provider: Arc<P>, events: EventSink) -> Self {
        Self { provider, events }
    }

    /// Serve requests until the peer releases or aborts the association.
    ///
    /// Messages are handled strictly one at a time: the response to a request is
    /// written before the next request is looked at.
    pub async fn serve<S>(
        &self,
        association: &mut Association,
        stream: &mut PduStream<S>,
    ) -> Result<CloseReason, AssociationError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut assembler = MessageAssembler::default();
        while let Some(pdu) = stream.read_pdu().await? {
            tracing::trace!(association = %association.ulid, "scu ----> scp: {}", pdu.short_description());
            match pdu {
                Pdu::PData { data } => {
                    if data.is_empty() {
                        tracing::debug!("Ignoring empty PData PDU");
                        continue;
                    }
                    for pdv in data {
                        if let Some(message) = assembler.push(pdv)? {
                            let reply = self.dispatch(association, message).await?;
                            for pdu in &reply.pdus {
                                stream.write_pdu(pdu).await?;
                            }
                            self.events.emit(AssociationEvent::ResponseSent {
                                ulid: association.ulid,
                                operation: reply.operation,
                                message_id: reply.message_id,
                                status: reply.response.status,
                            });
                        }
                    }
                }
                Pdu::ReleaseRQ => {
                    association.state = AssociationState::Releasing;
                    if assembler.is_incomplete() {
                        tracing::warn!(
                            association = %association.ulid,
                            "Released association in the middle of a message"
                        );
                    }
                    stream.write_pdu(&Pdu::ReleaseRP).await?;
                    association.close();
                    tracing::info!(
                        "Released association with {}",
                        association.calling_ae_title
                    );
                    return Ok(CloseReason::Release);
                }
                Pdu::AbortRQ { source } => {
                    association.close();
                    tracing::info!(
                        association = %association.ulid,
                        source = ?source,
                        "Association aborted by {}",
                        association.calling_ae_title
                    );
                    return Ok(CloseReason::Abort);
                }
                Pdu::Unknown { pdu_type, .. } => {
                    return Err(AssociationError::UnrecognizedPdu(pdu_type));
                }
                other => {
                    return Err(AssociationError::UnexpectedPdu {
                        pdu: pdu_name(&other),
                        state: association.state,
                    });
                }
            }
        }
        association.close();
        Err(AssociationError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "connection closed without releasing the association",
        )))
    }

    /// Handle one complete DIMSE request.
    ///
    /// Failures of the provider become failure responses; only a request which is not
    /// allowed in the current state of the association is an error.
    pub async fn dispatch(
        &self,
        association: &Association,
        message: DimseMessage,
    ) -> Result<Reply, AssociationError> {
        match association.state {
            AssociationState::Associated => {}
            AssociationState::Closed => return Err(AssociationError::Closed),
            state => {
                return Err(AssociationError::UnexpectedPdu {
                    pdu: "P-DATA-TF",
                    state,
                });
            }
        }
        let DimseMessage {
            presentation_context_id,
            command,
            data,
        } = message;
        let operation = match command.command_field {
            C_ECHO_RQ => "C-ECHO",
            C_STORE_RQ => "C-STORE",
            _ => "unrecognized",
        };
        self.events.emit(AssociationEvent::RequestReceived {
            ulid: association.ulid,
            operation,
            presentation_context_id,
            message_id: command.message_id,
        });

        let response = match service_request(association, presentation_context_id, &command, data)? {
            Ok(request) => self.serve_request(association, request).await,
            Err(response) => response,
        };

        let data = write_command(&create_response(&command, &response))?;
        let pdus = pdata_pdus(
            presentation_context_id,
            PDataValueType::Command,
            &data,
            association.peer_max_pdu_length,
        );
        Ok(Reply {
            operation,
            message_id: command.message_id,
            response,
            pdus,
        })
    }

    async fn serve_request(
        &self,
        association: &Association,
        request: ServiceRequest,
    ) -> ServiceResponse {
        tracing::debug!(
            association = %association.ulid,
            operation = request.name(),
            presentation_context = request.presentation_context_id(),
            "serving request"
        );
        match request {
            ServiceRequest::Echo { .. } => self.echo().await,
            ServiceRequest::Store(request) => self.store(association, request).await,
        }
    }

    async fn echo(&self) -> ServiceResponse {
        match AssertUnwindSafe(self.provider.echo()).catch_unwind().await {
            Ok(()) => ServiceResponse::success(),
            Err(_) => {
                tracing::error!("echo provider panicked");
                ServiceResponse::failure("echo provider failed")
            }
        }
    }

    async fn store(&self, association: &Association, request: StoreRequest) -> ServiceResponse {
        let sop_instance_uid = request.sop_instance_uid.clone();
        match AssertUnwindSafe(self.provider.store(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => ServiceResponse::success(),
            Ok(Err(failure)) => {
                tracing::error!(
                    association = %association.ulid,
                    kind = ?ErrorKind::ServiceLevelFailure,
                    sop_instance_uid,
                    reason = failure.reason,
                    "could not store instance"
                );
                ServiceResponse::failure(failure.reason)
            }
            Err(_) => {
                tracing::error!(
                    association = %association.ulid,
                    kind = ?ErrorKind::ServiceLevelFailure,
                    sop_instance_uid,
                    "storage provider panicked"
                );
                ServiceResponse::failure("storage provider failed")
            }
        }
    }
}

/// The request to hand to the provider, or the response to send right away when the
/// provider has no say in it.
fn service_request(
    association: &Association,
    presentation_context_id: u8,
    command: &Command,
    data: Option<Bytes>,
) -> Result<Result<ServiceRequest, ServiceResponse>, AssociationError> {
    match command.command_field {
        C_ECHO_RQ => Ok(Ok(ServiceRequest::Echo {
            presentation_context_id,
            message_id: command.message_id,
            sop_class_uid: command.affected_sop_class_uid.clone(),
        })),
        C_STORE_RQ => {
            let dataset = data.ok_or(AssociationError::MalformedMessage(
                "C-STORE request without a data set",
            ))?;
            let Some(pc) = association.accepted_storage_context(presentation_context_id) else {
                tracing::warn!(
                    association = %association.ulid,
                    kind = ?ErrorKind::ServiceLevelFailure,
                    presentation_context = presentation_context_id,
                    "C-STORE on a presentation context which was not accepted for storage"
                );
                return Ok(Err(ServiceResponse::failure("context not accepted")));
            };
            Ok(Ok(ServiceRequest::Store(StoreRequest {
                calling_ae_title: association.calling_ae_title.to_string(),
                presentation_context_id,
                message_id: command.message_id,
                sop_class_uid: command.affected_sop_class_uid.clone(),
                sop_instance_uid: command
                    .affected_sop_instance_uid
                    .clone()
                    .unwrap_or_default(),
                transfer_syntax: pc.transfer_syntax().unwrap_or_default().to_string(),
                dataset,
            })))
        }
        command_field => {
            tracing::warn!(
                association = %association.ulid,
                "Unrecognized DIMSE command field {:#06x}",
                command_field
            );
            Ok(Err(ServiceResponse {
                status: Status::UnrecognizedOperation,
                reason: Some("operation not supported".to_string()),
            }))
        }
    }
}

pub(crate) fn pdu_name(pdu: &Pdu) -> &'static str {
    match pdu {
        Pdu::Unknown { .. } => "unknown",
        Pdu::AssociationRQ { .. } => "A-ASSOCIATE-RQ",
        Pdu::AssociationAC { .. } => "A-ASSOCIATE-AC",
        Pdu::AssociationRJ { .. } => "A-ASSOCIATE-RJ",
        Pdu::PData { .. } => "P-DATA-TF",
        Pdu::ReleaseRQ => "A-RELEASE-RQ",
        Pdu::ReleaseRP => "A-RELEASE-RP",
        Pdu::AbortRQ { .. } => "A-ABORT",
    }
}
