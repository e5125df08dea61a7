use bytes::Bytes;
use dicom_ul::pdu::{PDataValue, PDataValueType};

use crate::dimse::Command;
use crate::error::AssociationError;

/// A complete DIMSE message: a command set and its data set, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct DimseMessage {
    pub presentation_context_id: u8,
    pub command: Command,
    pub data: Option<Bytes>,
}

/// Reassembles DIMSE messages out of presentation data value fragments.
///
/// A message is a command set, fragmented over one or more command PDVs, optionally
/// followed by a data set, fragmented over one or more data PDVs. All fragments of a
/// message must be sent on the same presentation context. Fragments may be split
/// across P-DATA-TF PDUs arbitrarily.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    presentation_context_id: Option<u8>,
    command_buffer: Vec<u8>,
    command: Option<Command>,
    data_buffer: Vec<u8>,
}

impl MessageAssembler {
    /// Add a fragment. Returns the message it completes, if any.
    pub fn push(&mut self, pdv: PDataValue) -> Result<Option<DimseMessage>, AssociationError> {
        match self.presentation_context_id {
            Some(id) if id != pdv.presentation_context_id => {
                return Err(AssociationError::MalformedMessage(
                    "presentation context changed within a message",
                ));
            }
            _ => self.presentation_context_id = Some(pdv.presentation_context_id),
        }
        let PDataValue {
            presentation_context_id,
            value_type,
            is_last,
            mut data,
        } = pdv;
        match value_type {
            PDataValueType::Command => {
                if self.command.is_some() {
                    return Err(AssociationError::MalformedMessage(
                        "command fragment received while expecting a data set",
                    ));
                }
                self.command_buffer.append(&mut data);
                if !is_last {
                    return Ok(None);
                }
                let command = Command::read(&self.command_buffer)?;
                self.command_buffer.clear();
                if command.has_data_set {
                    self.command = Some(command);
                    Ok(None)
                } else {
                    self.presentation_context_id = None;
                    Ok(Some(DimseMessage {
                        presentation_context_id,
                        command,
                        data: None,
                    }))
                }
            }
            PDataValueType::Data => {
                if self.command.is_none() {
                    return Err(AssociationError::MalformedMessage(
                        "data set fragment received before its command",
                    ));
                }
                self.data_buffer.append(&mut data);
                if !is_last {
                    return Ok(None);
                }
                let command = self.command.take().ok_or(AssociationError::MalformedMessage(
                    "data set fragment received before its command",
                ))?;
                self.presentation_context_id = None;
                let data = Bytes::from(std::mem::take(&mut self.data_buffer));
                Ok(Some(DimseMessage {
                    presentation_context_id,
                    command,
                    data: Some(data),
                }))
            }
        }
    }

    /// Whether a message has been partially received.
    pub fn is_incomplete(&self) -> bool {
        self.presentation_context_id.is_some()
    }
}
