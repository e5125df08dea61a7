//! A [ServiceProvider] writing received instances to the filesystem.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use dicom::dictionary_std::tags;
use dicom::encoding::TransferSyntaxIndex;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::TransferSyntaxRegistry;

use crate::error::StorageError;
use crate::negotiator::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};
use crate::sanitize::sanitize;
use crate::service::{ServiceProvider, StoreFailure, StoreRequest};
use crate::transfer_syntax::trim_uid;

/// Writes every received instance as a DICOM file to
/// `<files_root>/<calling AE title>/<StudyInstanceUID>/<SOPInstanceUID>.dcm`.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    files_root: Arc<Utf8PathBuf>,
}

impl FilesystemStorage {
    pub fn new(files_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            files_root: Arc::new(files_root.into()),
        }
    }

    pub fn files_root(&self) -> &Utf8Path {
        self.files_root.as_path()
    }
}

impl ServiceProvider for FilesystemStorage {
    async fn store(&self, request: StoreRequest) -> Result<(), StoreFailure> {
        let files_root = Arc::clone(&self.files_root);
        let sop_instance_uid = request.sop_instance_uid.clone();
        let result = tokio::task::spawn_blocking(move || write_instance(&files_root, request))
            .await
            .map_err(StorageError::from)
            .and_then(|r| r);
        match result {
            Ok(path) => {
                tracing::info!(event = "storage", path = path.into_string());
                Ok(())
            }
            Err(e) => {
                tracing::error!(event = "storage", sop_instance_uid, error = e.to_string());
                Err(e.into())
            }
        }
    }
}

/// Decode the data set of `request` and write it to a file under `files_root`.
fn write_instance(files_root: &Utf8Path, request: StoreRequest) -> Result<Utf8PathBuf, StorageError> {
    let ts = TransferSyntaxRegistry
        .get(&request.transfer_syntax)
        .filter(|ts| !ts.is_unsupported())
        .ok_or_else(|| StorageError::UnsupportedTransferSyntax(request.transfer_syntax.clone()))?;
    let obj = InMemDicomObject::read_dataset_with_ts(request.dataset.as_ref(), ts)?;

    let study_instance_uid = string_of(&obj, tags::STUDY_INSTANCE_UID)?;
    let sop_instance_uid = if request.sop_instance_uid.is_empty() {
        string_of(&obj, tags::SOP_INSTANCE_UID)?
    } else {
        request.sop_instance_uid
    };
    let sop_class_uid = if request.sop_class_uid.is_empty() {
        string_of(&obj, tags::SOP_CLASS_UID)?
    } else {
        request.sop_class_uid
    };

    let output_path = files_root
        .join(sanitize(&request.calling_ae_title))
        .join(sanitize(&study_instance_uid))
        .join(format!("{}.dcm", sanitize(&sop_instance_uid)));

    let file_meta = FileMetaTableBuilder::new()
        .media_storage_sop_class_uid(sop_class_uid)
        .media_storage_sop_instance_uid(sop_instance_uid)
        .transfer_syntax(ts.uid())
        .implementation_class_uid(IMPLEMENTATION_CLASS_UID)
        .implementation_version_name(IMPLEMENTATION_VERSION_NAME)
        .source_application_entity_title(request.calling_ae_title)
        .build()?;
    let file_obj = obj.with_exact_meta(file_meta);

    if let Some(parent_dir) = output_path.parent() {
        fs_err::create_dir_all(parent_dir)?;
    }
    file_obj.write_to_file(&output_path)?;
    Ok(output_path)
}

fn string_of(obj: &InMemDicomObject, tag: dicom::core::Tag) -> Result<String, StorageError> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| trim_uid(&s).to_string())
        .filter(|s| !s.is_empty())
        .ok_or(StorageError::MissingTag(tag))
}
