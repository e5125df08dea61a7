use dicom::core::{DataElement, Tag, VR};
use dicom::dicom_value;
use dicom::dictionary_std::{tags, uids};
use dicom::object::{InMemDicomObject, StandardDataDictionary};
use dicom::transfer_syntax::entries;
use dicom_ul::pdu::{PDataValue, PDataValueType};
use dicom_ul::{ClientAssociation, ClientAssociationOptions, Pdu};
use oxiscp::VERIFICATION;
use tokio::net::TcpStream;

use super::helpers::{CALLED_AE_TITLE, CALLING_AE_TITLE};

/// Establish an association using the dicom-ul client.
pub(crate) async fn connect(
    address: &str,
    abstract_syntax: &str,
    transfer_syntax: &str,
) -> ClientAssociation<TcpStream> {
    ClientAssociationOptions::new()
        .calling_ae_title(CALLING_AE_TITLE)
        .called_ae_title(CALLED_AE_TITLE)
        .max_pdu_length(16384)
        .with_presentation_context(abstract_syntax, vec![transfer_syntax])
        .establish_with_async(address)
        .await
        .unwrap()
}

/// Send a C-ECHO-RQ and return the status of its response.
pub(crate) async fn send_echo(scu: &mut ClientAssociation<TcpStream>, message_id: u16) -> u16 {
    let pc = scu.presentation_contexts()[0].clone();
    let cmd = echo_command(message_id);
    scu.send(&command_pdu(pc.id, &cmd)).await.unwrap();
    status_of(&scu.receive().await.unwrap())
}

/// Send a C-STORE-RQ with `dcm` as its data set and return the status of its response.
pub(crate) async fn send_dicom(
    scu: &mut ClientAssociation<TcpStream>,
    dcm: &InMemDicomObject,
    message_id: u16,
) -> u16 {
    let pc = scu.presentation_contexts()[0].clone();
    let sop_instance_uid = dcm
        .element(tags::SOP_INSTANCE_UID)
        .unwrap()
        .string()
        .unwrap()
        .to_string();
    let sop_class_uid = dcm
        .element(tags::SOP_CLASS_UID)
        .unwrap()
        .string()
        .unwrap()
        .to_string();
    let cmd = store_command(&sop_class_uid, &sop_instance_uid, message_id);
    let mut cmd_data = Vec::with_capacity(128);
    cmd.write_dataset_with_ts(&mut cmd_data, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .unwrap();
    let mut object_data = Vec::with_capacity(2048);
    dcm.write_dataset_with_ts(
        &mut object_data,
        &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
    )
    .unwrap();
    let pdu = Pdu::PData {
        data: vec![
            PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cmd_data,
            },
            PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: object_data,
            },
        ],
    };
    scu.send(&pdu).await.unwrap();
    status_of(&scu.receive().await.unwrap())
}

pub(crate) fn echo_command(message_id: u16) -> InMemDicomObject<StandardDataDictionary> {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, VERIFICATION),
        ),
        DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x0030])),
        DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [message_id])),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [0x0101]),
        ),
    ])
}

pub(crate) fn store_command(
    storage_sop_class_uid: &str,
    storage_sop_instance_uid: &str,
    message_id: u16,
) -> InMemDicomObject<StandardDataDictionary> {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, storage_sop_class_uid),
        ),
        DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x0001])),
        DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [message_id])),
        DataElement::new(tags::PRIORITY, VR::US, dicom_value!(U16, [0x0000])),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [0x0000]),
        ),
        DataElement::new(
            tags::AFFECTED_SOP_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, storage_sop_instance_uid),
        ),
    ])
}

/// A P-DATA-TF PDU carrying a whole command set.
pub(crate) fn command_pdu(presentation_context_id: u8, cmd: &InMemDicomObject) -> Pdu {
    let mut data = Vec::with_capacity(128);
    cmd.write_dataset_with_ts(&mut data, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .unwrap();
    Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data,
        }],
    }
}

/// A P-DATA-TF PDU carrying a whole data set.
pub(crate) fn data_pdu(presentation_context_id: u8, dcm: &InMemDicomObject) -> Pdu {
    let mut data = Vec::with_capacity(1024);
    dcm.write_dataset_with_ts(&mut data, &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .unwrap();
    Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id,
            value_type: PDataValueType::Data,
            is_last: true,
            data,
        }],
    }
}

/// Status of the DIMSE response in `pdu`.
pub(crate) fn status_of(pdu: &Pdu) -> u16 {
    response_element(pdu, tags::STATUS)
}

/// Message ID of the request which `pdu` is the response to.
pub(crate) fn responded_message_id(pdu: &Pdu) -> u16 {
    response_element(pdu, tags::MESSAGE_ID_BEING_RESPONDED_TO)
}

fn response_element(pdu: &Pdu, tag: Tag) -> u16 {
    match pdu {
        Pdu::PData { data } => {
            let cmd_obj = InMemDicomObject::read_dataset_with_ts(
                &data[0].data[..],
                &entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
            )
            .unwrap();
            cmd_obj.element(tag).unwrap().to_int::<u16>().unwrap()
        }
        pdu => panic!("Unexpected SCP response: {:?}", pdu),
    }
}

/// A small secondary capture instance.
pub(crate) fn example_instance(sop_instance_uid: &str, study_instance_uid: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
        ),
        DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, sop_instance_uid),
        ),
        DataElement::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, study_instance_uid),
        ),
        DataElement::new(tags::PATIENT_NAME, VR::PN, dicom_value!(Str, "Doe^Jane")),
        DataElement::new(tags::PATIENT_ID, VR::LO, dicom_value!(Str, "12345")),
    ])
}
