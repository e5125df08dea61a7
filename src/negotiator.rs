//! Association negotiation: deciding how to answer an A-ASSOCIATE-RQ.

use std::collections::HashSet;
use std::sync::Arc;

use dicom_ul::pdu::{
    AssociationAC, AssociationRJ, AssociationRJResult, AssociationRJServiceProviderASCEReason,
    AssociationRJServiceProviderPresentationReason, AssociationRJServiceUserReason,
    AssociationRJSource, AssociationRQ, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};

use crate::ae_title::AeTitlePolicy;
use crate::association::{
    Association, AssociationState, ContextRejection, ContextResult, PresentationContext,
};
use crate::resolver::resolve_transfer_syntax;
use crate::service::ServiceProvider;
use crate::sop_class::ServiceCategory;
use crate::transfer_syntax::{IMPLICIT_VR_LITTLE_ENDIAN, TransferSyntaxPolicy, trim_uid};

pub use dicom::dictionary_std::uids::DICOM_APPLICATION_CONTEXT;

/// Implementation class UID we announce during negotiation.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.248061592357011296468713954839461905122";

/// Implementation version name we announce during negotiation (at most 16 characters).
pub const IMPLEMENTATION_VERSION_NAME: &str = concat!("OXISCP_", env!("CARGO_PKG_VERSION"));

/// Reasons for rejecting a whole association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ProtocolVersionNotSupported,
    ApplicationContextNameNotSupported,
    CalledAeNotRecognized,
    CallingAeNotRecognized,
    NoReasonGiven,
    /// Too many associations are active.
    LocalLimitExceeded,
}

impl RejectReason {
    /// The A-ASSOCIATE-RJ PDU carrying this reason.
    pub fn to_pdu(self) -> AssociationRJ {
        let (result, source) = match self {
            RejectReason::ProtocolVersionNotSupported => (
                AssociationRJResult::Permanent,
                AssociationRJSource::ServiceProviderASCE(
                    AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported,
                ),
            ),
            RejectReason::ApplicationContextNameNotSupported => (
                AssociationRJResult::Permanent,
                AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                ),
            ),
            RejectReason::CalledAeNotRecognized => (
                AssociationRJResult::Permanent,
                AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                ),
            ),
            RejectReason::CallingAeNotRecognized => (
                AssociationRJResult::Permanent,
                AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::CallingAETitleNotRecognized,
                ),
            ),
            RejectReason::NoReasonGiven => (
                AssociationRJResult::Permanent,
                AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven),
            ),
            RejectReason::LocalLimitExceeded => (
                AssociationRJResult::Transient,
                AssociationRJSource::ServiceProviderPresentation(
                    AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
                ),
            ),
        };
        AssociationRJ { result, source }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            RejectReason::ProtocolVersionNotSupported => "protocol version not supported",
            RejectReason::ApplicationContextNameNotSupported => {
                "application context name not supported"
            }
            RejectReason::CalledAeNotRecognized => "called AE not recognized",
            RejectReason::CallingAeNotRecognized => "calling AE not recognized",
            RejectReason::NoReasonGiven => "no reason given",
            RejectReason::LocalLimitExceeded => "local limit exceeded",
        };
        f.write_str(reason)
    }
}

/// How to answer an association request.
#[derive(Debug, Clone, PartialEq)]
pub enum Negotiation {
    Accept(AssociationAC),
    Reject(RejectReason),
}

/// Answers association requests according to our configured policies.
///
/// Holds no per-association state: the [Association] is only borrowed for the duration
/// of [Negotiator::negotiate].
#[derive(Debug, Clone)]
pub struct Negotiator {
    policy: Arc<TransferSyntaxPolicy>,
    called_ae_policy: AeTitlePolicy,
    calling_ae_policy: AeTitlePolicy,
    max_pdu_length: u32,
    promiscuous: bool,
}

impl Negotiator {
    pub fn new(policy: Arc<TransferSyntaxPolicy>, max_pdu_length: u32) -> Self {
        Self {
            policy,
            called_ae_policy: AeTitlePolicy::Any,
            calling_ae_policy: AeTitlePolicy::Any,
            max_pdu_length,
            promiscuous: false,
        }
    }

    pub fn called_ae_policy(mut self, policy: AeTitlePolicy) -> Self {
        self.called_ae_policy = policy;
        self
    }

    pub fn calling_ae_policy(mut self, policy: AeTitlePolicy) -> Self {
        self.calling_ae_policy = policy;
        self
    }

    /// Accept abstract syntaxes we don't know as if they were storage SOP classes.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    pub fn max_pdu_length(&self) -> u32 {
        self.max_pdu_length
    }

    /// Negotiate an association request.
    ///
    /// Moves `association` from [AssociationState::Connecting] to either
    /// [AssociationState::Associated] (accept) or [AssociationState::Closed] (reject).
    /// An accept carries exactly one result per proposed presentation context, in the
    /// order they were proposed.
    pub fn negotiate<P: ServiceProvider>(
        &self,
        rq: &AssociationRQ,
        association: &mut Association,
        provider: &P,
    ) -> Negotiation {
        association.state = AssociationState::Connecting;
        association.set_titles(&rq.calling_ae_title, &rq.called_ae_title);
        association.peer_max_pdu_length = rq
            .user_variables
            .iter()
            .find_map(|item| match item {
                UserVariableItem::MaxLength(len) => Some(*len),
                _ => None,
            })
            .unwrap_or(0);

        if let Err(reason) = self.check_preconditions(rq, association, provider) {
            association.close();
            return Negotiation::Reject(reason);
        }

        let mut seen_ids = HashSet::with_capacity(rq.presentation_contexts.len());
        association.presentation_contexts = rq
            .presentation_contexts
            .iter()
            .map(|proposed| {
                let category = ServiceCategory::of(&proposed.abstract_syntax, self.promiscuous);
                let mut pc = PresentationContext::proposed(proposed, category);
                pc.result = if seen_ids.insert(pc.id) {
                    self.resolve(&pc)
                } else {
                    ContextResult::Rejected(ContextRejection::NoReason)
                };
                pc
            })
            .collect();
        association.state = AssociationState::Associated;

        let presentation_contexts = association
            .presentation_contexts
            .iter()
            .map(to_result_item)
            .collect();
        Negotiation::Accept(AssociationAC {
            protocol_version: 1,
            calling_ae_title: rq.calling_ae_title.clone(),
            called_ae_title: rq.called_ae_title.clone(),
            application_context_name: rq.application_context_name.clone(),
            presentation_contexts,
            user_variables: vec![
                UserVariableItem::MaxLength(self.max_pdu_length),
                UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
                UserVariableItem::ImplementationVersionName(
                    IMPLEMENTATION_VERSION_NAME.to_string(),
                ),
            ],
        })
    }

    /// Connection-level checks, done before looking at any presentation context.
    fn check_preconditions<P: ServiceProvider>(
        &self,
        rq: &AssociationRQ,
        association: &Association,
        provider: &P,
    ) -> Result<(), RejectReason> {
        if rq.protocol_version & 1 == 0 {
            return Err(RejectReason::ProtocolVersionNotSupported);
        }
        if trim_uid(&rq.application_context_name) != DICOM_APPLICATION_CONTEXT {
            return Err(RejectReason::ApplicationContextNameNotSupported);
        }
        if !self.called_ae_policy.accepts(&rq.called_ae_title) {
            return Err(RejectReason::CalledAeNotRecognized);
        }
        if !self.calling_ae_policy.accepts(&rq.calling_ae_title) {
            return Err(RejectReason::CallingAeNotRecognized);
        }
        provider.accept_association(association)
    }

    fn resolve(&self, pc: &PresentationContext) -> ContextResult {
        let policy = match pc.category {
            ServiceCategory::Verification => &self.policy.verification,
            ServiceCategory::Storage => &self.policy.storage,
            ServiceCategory::Unsupported => {
                return ContextResult::Rejected(ContextRejection::AbstractSyntaxNotSupported);
            }
        };
        match resolve_transfer_syntax(&pc.transfer_syntaxes, policy) {
            Some(ts) => ContextResult::Accepted {
                transfer_syntax: ts.to_string(),
            },
            None => ContextResult::Rejected(ContextRejection::NoAcceptableTransferSyntax),
        }
    }
}

fn to_result_item(pc: &PresentationContext) -> PresentationContextResult {
    match &pc.result {
        ContextResult::Accepted { transfer_syntax } => PresentationContextResult {
            id: pc.id,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: transfer_syntax.clone(),
        },
        ContextResult::Rejected(rejection) => PresentationContextResult {
            id: pc.id,
            reason: rejection.pdu_reason(),
            // not significant when rejected, but the sub-item must be present
            transfer_syntax: IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
        },
        ContextResult::Proposed => PresentationContextResult {
            id: pc.id,
            reason: PresentationContextResultReason::NoReason,
            transfer_syntax: IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
        },
    }
}
