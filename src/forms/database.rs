use actix_multipart::form::{MultipartForm, text::Text};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct RestoreForm {
    /// Backup to restore; the newest one when absent or blank.
    pub filename: Option<String>,
}

impl RestoreForm {
    pub fn requested(self) -> Option<String> {
        self.filename
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// [`RestoreForm`] sent as `multipart/form-data`.
#[derive(MultipartForm)]
pub struct RestoreMultipartForm {
    pub filename: Option<Text<String>>,
}

impl From<RestoreMultipartForm> for RestoreForm {
    fn from(form: RestoreMultipartForm) -> Self {
        Self {
            filename: form.filename.map(Text::into_inner),
        }
    }
}
