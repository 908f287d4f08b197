use actix_multipart::form::{MultipartForm, tempfile::TempFile, text::Text};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessFolderForm {
    /// Folder relative to the upload directory.
    #[validate(length(min = 1, max = 4096))]
    pub folder: String,
}

/// [`ProcessFolderForm`] sent as `multipart/form-data`.
#[derive(MultipartForm)]
pub struct ProcessFolderMultipartForm {
    pub folder: Text<String>,
}

impl From<ProcessFolderMultipartForm> for ProcessFolderForm {
    fn from(form: ProcessFolderMultipartForm) -> Self {
        Self {
            folder: form.folder.into_inner(),
        }
    }
}

#[derive(MultipartForm)]
pub struct SearchByUploadForm {
    #[multipart(limit = "20MB")]
    pub file: TempFile,
    pub top_k: Option<Text<usize>>,
}
