//! Reading DIMSE command sets and writing DIMSE responses.

use dicom::core::{DataElement, VR};
use dicom::dicom_value;
use dicom::dictionary_std::{StandardDataDictionary, tags};
use dicom::object::InMemDicomObject;
use dicom_ul::Pdu;
use dicom_ul::pdu::{PDataValue, PDataValueType};

use crate::error::AssociationError::{self, *};
use crate::service::{ServiceResponse, Status};
use crate::transfer_syntax::trim_uid;

pub const C_STORE_RQ: u16 = 0x0001;
pub const C_ECHO_RQ: u16 = 0x0030;

/// Bit set in the command field of every response.
const RESPONSE_BIT: u16 = 0x8000;

/// Value of (0000,0800) Command Data Set Type when no data set follows.
pub const NO_DATA_SET: u16 = 0x0101;

/// Error comments are LO, so at most 64 characters.
const MAX_ERROR_COMMENT_LENGTH: usize = 64;

/// Size of the header of a presentation data value item: item length (4 bytes),
/// presentation context ID (1 byte) and message control header (1 byte).
const PDV_HEADER_LENGTH: u32 = 6;

/// The parts of a DIMSE command set we act upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_field: u16,
    pub message_id: u16,
    pub affected_sop_class_uid: String,
    pub affected_sop_instance_uid: Option<String>,
    pub has_data_set: bool,
}

impl Command {
    /// Decode a command set. Commands are always in implicit VR little endian.
    pub fn read(bytes: &[u8]) -> Result<Self, AssociationError> {
        let ts = dicom::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        let obj = InMemDicomObject::read_dataset_with_ts(bytes, &ts).map_err(FailedToReadCommand)?;
        let command_field = obj
            .element(tags::COMMAND_FIELD)
            .map_err(|_| MissingTag(tags::COMMAND_FIELD))?
            .uint16()
            .map_err(|_| InvalidNumber(tags::COMMAND_FIELD))?;
        let message_id = obj
            .element(tags::MESSAGE_ID)
            .map_err(|_| MissingTag(tags::MESSAGE_ID))?
            .to_int()
            .map_err(|_| InvalidNumber(tags::MESSAGE_ID))?;
        let data_set_type: u16 = obj
            .element(tags::COMMAND_DATA_SET_TYPE)
            .map_err(|_| MissingTag(tags::COMMAND_DATA_SET_TYPE))?
            .to_int()
            .map_err(|_| InvalidNumber(tags::COMMAND_DATA_SET_TYPE))?;
        let affected_sop_class_uid = match obj.element(tags::AFFECTED_SOP_CLASS_UID) {
            Ok(e) => e
                .to_str()
                .map(|s| trim_uid(&s).to_string())
                .map_err(|_| CouldNotRetrieve(tags::AFFECTED_SOP_CLASS_UID))?,
            Err(_) => String::new(),
        };
        let affected_sop_instance_uid = match obj.element(tags::AFFECTED_SOP_INSTANCE_UID) {
            Ok(e) => Some(
                e.to_str()
                    .map(|s| trim_uid(&s).to_string())
                    .map_err(|_| CouldNotRetrieve(tags::AFFECTED_SOP_INSTANCE_UID))?,
            ),
            Err(_) => None,
        };
        Ok(Self {
            command_field,
            message_id,
            affected_sop_class_uid,
            affected_sop_instance_uid,
            has_data_set: data_set_type != NO_DATA_SET,
        })
    }

    pub fn response_command_field(&self) -> u16 {
        self.command_field | RESPONSE_BIT
    }
}

/// Create the response to `request`, echoing its identifying elements.
pub fn create_response(
    request: &Command,
    response: &ServiceResponse,
) -> InMemDicomObject<StandardDataDictionary> {
    let mut elements = vec![
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, request.affected_sop_class_uid.as_str()),
        ),
        DataElement::new(
            tags::COMMAND_FIELD,
            VR::US,
            dicom_value!(U16, [request.response_command_field()]),
        ),
        DataElement::new(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            dicom_value!(U16, [request.message_id]),
        ),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [NO_DATA_SET]),
        ),
        DataElement::new(
            tags::STATUS,
            VR::US,
            dicom_value!(U16, [response.status.code()]),
        ),
    ];
    if let Some(uid) = &request.affected_sop_instance_uid {
        elements.push(DataElement::new(
            tags::AFFECTED_SOP_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, uid.as_str()),
        ));
    }
    if let Some(reason) = response.reason.as_ref().filter(|_| response.status != Status::Success)
    {
        let comment: String = reason.chars().take(MAX_ERROR_COMMENT_LENGTH).collect();
        elements.push(DataElement::new(
            tags::ERROR_COMMENT,
            VR::LO,
            dicom_value!(Str, comment),
        ));
    }
    InMemDicomObject::command_from_element_iter(elements)
}

/// Encode a command set in implicit VR little endian.
pub fn write_command(
    obj: &InMemDicomObject<StandardDataDictionary>,
) -> Result<Vec<u8>, AssociationError> {
    let ts = dicom::transfer_syntax::entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    let mut data = Vec::with_capacity(128);
    obj.write_dataset_with_ts(&mut data, &ts)
        .map_err(|_| CannotRespond("could not write response object"))?;
    Ok(data)
}

/// Split a command or data set into P-DATA-TF PDUs no longer than what the peer accepts.
///
/// `peer_max_pdu_length` is the maximum length the peer announced, 0 meaning unlimited.
pub fn pdata_pdus(
    presentation_context_id: u8,
    value_type: PDataValueType,
    data: &[u8],
    peer_max_pdu_length: u32,
) -> Vec<Pdu> {
    let max_fragment = match peer_max_pdu_length {
        0 => data.len().max(1),
        n => n.saturating_sub(PDV_HEADER_LENGTH).max(1) as usize,
    };
    let n_fragments = data.len().div_ceil(max_fragment).max(1);
    (0..n_fragments)
        .map(|i| {
            let start = i * max_fragment;
            let end = (start + max_fragment).min(data.len());
            Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id,
                    value_type: value_type.clone(),
                    is_last: i + 1 == n_fragments,
                    data: data[start..end].to_vec(),
                }],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::dictionary_std::uids;
    use pretty_assertions::assert_eq;

    fn store_rq_bytes() -> Vec<u8> {
        let cmd = InMemDicomObject::command_from_element_iter([
            DataElement::new(
                tags::AFFECTED_SOP_CLASS_UID,
                VR::UI,
                dicom_value!(Str, uids::COMPUTED_RADIOGRAPHY_IMAGE_STORAGE),
            ),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [C_STORE_RQ])),
            DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [7])),
            DataElement::new(tags::PRIORITY, VR::US, dicom_value!(U16, [0x0000])),
            DataElement::new(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                dicom_value!(U16, [0x0000]),
            ),
            DataElement::new(
                tags::AFFECTED_SOP_INSTANCE_UID,
                VR::UI,
                dicom_value!(Str, "1.2.3.4"),
            ),
        ]);
        write_command(&cmd).unwrap()
    }

    #[test]
    fn test_read_store_command() {
        let actual = Command::read(&store_rq_bytes()).unwrap();
        let expected = Command {
            command_field: C_STORE_RQ,
            message_id: 7,
            affected_sop_class_uid: uids::COMPUTED_RADIOGRAPHY_IMAGE_STORAGE.to_string(),
            affected_sop_instance_uid: Some("1.2.3.4".to_string()),
            has_data_set: true,
        };
        assert_eq!(actual, expected)
    }

    #[test]
    fn test_read_garbage() {
        assert!(Command::read(&[0xde, 0xad, 0xbe, 0xef, 0x01]).is_err())
    }

    #[test]
    fn test_failure_response_has_error_comment() {
        let request = Command::read(&store_rq_bytes()).unwrap();
        let response = create_response(&request, &ServiceResponse::failure("disk full"));
        let status: u16 = response.element(tags::STATUS).unwrap().to_int().unwrap();
        assert_eq!(status, 0x0110);
        let field: u16 = response
            .element(tags::COMMAND_FIELD)
            .unwrap()
            .to_int()
            .unwrap();
        assert_eq!(field, 0x8001);
        let responded_to: u16 = response
            .element(tags::MESSAGE_ID_BEING_RESPONDED_TO)
            .unwrap()
            .to_int()
            .unwrap();
        assert_eq!(responded_to, 7);
        let comment = response.element(tags::ERROR_COMMENT).unwrap().to_str().unwrap();
        assert_eq!(comment.trim_end(), "disk full");
    }

    #[test]
    fn test_success_response_has_no_error_comment() {
        let request = Command::read(&store_rq_bytes()).unwrap();
        let response = create_response(&request, &ServiceResponse::success());
        assert!(response.element(tags::ERROR_COMMENT).is_err());
    }

    #[test]
    fn test_pdata_fragments() {
        let data = vec![0u8; 100];
        let pdus = pdata_pdus(3, PDataValueType::Command, &data, 46);
        assert_eq!(pdus.len(), 3);
        let lasts: Vec<_> = pdus
            .iter()
            .map(|pdu| match pdu {
                Pdu::PData { data } => (data[0].data.len(), data[0].is_last),
                _ => panic!("not a P-DATA PDU"),
            })
            .collect();
        assert_eq!(lasts, vec![(40, false), (40, false), (20, true)]);
    }

    #[test]
    fn test_pdata_unlimited() {
        let data = vec![0u8; 100];
        let pdus = pdata_pdus(3, PDataValueType::Data, &data, 0);
        assert_eq!(pdus.len(), 1);
    }
}
