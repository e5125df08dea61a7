pub(crate) mod helpers;
pub(crate) mod send_dicom;
