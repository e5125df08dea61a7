//! Transfer syntax UIDs and the policy of which ones we accept.

pub use dicom::dictionary_std::uids::{
    EXPLICIT_VR_BIG_ENDIAN, EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN,
    JPEG_BASELINE8_BIT as JPEG_BASELINE, JPEG_EXTENDED12_BIT as JPEG_EXTENDED, JPEG_LOSSLESS,
    JPEG_LOSSLESS_SV1, JPEG2000 as JPEG_2000, JPEG2000_LOSSLESS as JPEG_2000_LOSSLESS,
    JPEGLS_LOSSLESS as JPEG_LS_LOSSLESS, JPEGLS_NEAR_LOSSLESS as JPEG_LS_NEAR_LOSSLESS,
    MPEG2MPHL, MPEG2MPML, MPEG4HP41, MPEG4HP42STEREO, MPEG4HP422D, MPEG4HP423D, RLE_LOSSLESS,
};

/// Transfer syntaxes accepted for the Verification service class, in order of preference.
pub const DEFAULT_VERIFICATION_TRANSFER_SYNTAXES: &[&str] = &[
    EXPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_BIG_ENDIAN,
    IMPLICIT_VR_LITTLE_ENDIAN,
];

/// Transfer syntaxes accepted for storage SOP classes, in order of preference.
///
/// Lossless encodings come first, so that a peer offering both a lossless and a lossy
/// encoding of the same object sends us the lossless one.
pub const DEFAULT_STORAGE_TRANSFER_SYNTAXES: &[&str] = &[
    // lossless
    JPEG_LS_LOSSLESS,
    JPEG_2000_LOSSLESS,
    JPEG_LOSSLESS_SV1,
    JPEG_LOSSLESS,
    RLE_LOSSLESS,
    // lossy
    JPEG_LS_NEAR_LOSSLESS,
    JPEG_2000,
    JPEG_BASELINE,
    JPEG_EXTENDED,
    // uncompressed
    EXPLICIT_VR_LITTLE_ENDIAN,
    EXPLICIT_VR_BIG_ENDIAN,
    IMPLICIT_VR_LITTLE_ENDIAN,
    // video
    MPEG2MPML,
    MPEG2MPHL,
    MPEG4HP41,
    MPEG4HP422D,
    MPEG4HP423D,
    MPEG4HP42STEREO,
];

/// Ordered transfer syntax preferences per service category.
///
/// Read-only once the server is running; every association shares the same value
/// through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSyntaxPolicy {
    pub verification: Vec<String>,
    pub storage: Vec<String>,
}

impl TransferSyntaxPolicy {
    pub fn new(
        verification: impl IntoIterator<Item = impl Into<String>>,
        storage: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            verification: verification.into_iter().map(Into::into).collect(),
            storage: storage.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for TransferSyntaxPolicy {
    fn default() -> Self {
        Self {
            verification: default_verification_transfer_syntaxes(),
            storage: default_storage_transfer_syntaxes(),
        }
    }
}

pub(crate) fn default_verification_transfer_syntaxes() -> Vec<String> {
    DEFAULT_VERIFICATION_TRANSFER_SYNTAXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn default_storage_transfer_syntaxes() -> Vec<String> {
    DEFAULT_STORAGE_TRANSFER_SYNTAXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// UIDs are padded to an even length with a trailing NUL on the wire.
pub(crate) fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c: char| c == '\0' || c == ' ')
}
