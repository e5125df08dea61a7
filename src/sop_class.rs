//! Classification of abstract syntaxes into the service categories we provide.

use crate::transfer_syntax::trim_uid;

/// Verification SOP class (C-ECHO).
pub use dicom::dictionary_std::uids::VERIFICATION;

/// Every standard storage SOP class UID is under this root.
const STANDARD_STORAGE_ROOT: &str = "1.2.840.10008.5.1.4.1.1.";

/// Private storage SOP classes which some modalities send.
///
/// <https://dcm4chee-arc-cs.readthedocs.io/en/latest/networking/specs/storage/storage.html>
const PRIVATE_STORAGE_SOP_CLASSES: &[&str] = &[
    // Private Siemens AX Frame Sets Storage
    "1.3.12.2.1107.5.99.3.11",
    // Private Siemens CSA Non Image Storage
    "1.3.12.2.1107.5.9.1",
    // Private Siemens CT MR Volume Storage
    "1.3.12.2.1107.5.99.3.10",
    // Private GE PET Raw Data Storage
    "1.2.840.113619.4.30",
    // Private GE 3D Model Storage
    "1.2.840.113619.4.26",
    // Private Philips 3D Object Storage
    "1.3.46.670589.5.0.1",
    // Private Toshiba US Image Storage
    "1.2.392.200036.9116.7.8.1.1.1",
];

/// The service category of an abstract syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCategory {
    Verification,
    Storage,
    Unsupported,
}

impl ServiceCategory {
    /// Determine the service category of an abstract syntax UID.
    ///
    /// When `promiscuous` is set, abstract syntaxes we know nothing about are assumed to
    /// be storage SOP classes.
    pub fn of(abstract_syntax: &str, promiscuous: bool) -> Self {
        let uid = trim_uid(abstract_syntax);
        if uid == VERIFICATION {
            ServiceCategory::Verification
        } else if is_storage_sop_class(uid) || (promiscuous && !uid.is_empty()) {
            ServiceCategory::Storage
        } else {
            ServiceCategory::Unsupported
        }
    }
}

fn is_storage_sop_class(uid: &str) -> bool {
    uid.strip_prefix(STANDARD_STORAGE_ROOT)
        .map(|rest| !rest.is_empty())
        .unwrap_or(false)
        || PRIVATE_STORAGE_SOP_CLASSES.contains(&uid)
}
