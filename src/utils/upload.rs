// src/utils/upload.rs

use std::collections::HashMap;

use axum::{body::Bytes, extract::Multipart};

use crate::error::AppError;

/// A fully buffered `multipart/form-data` body: text fields and file parts.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<Bytes>>,
}

impl FormData {
    /// Drains `multipart`. Parts carrying a file name are files, the rest text.
    /// File parts with an empty body (an untouched file input) are skipped.
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.files.entry(name).or_default().push(bytes);
                }
            } else {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    /// Text value of `name`, `None` when missing or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Untrimmed text value of `name`, `None` when missing or empty.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn files(&self, name: &str) -> &[Bytes] {
        self.files.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Parses a JSON encoded text field.
    pub fn json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.text(name)
            .map(|raw| {
                serde_json::from_str(raw).map_err(|e| {
                    AppError::BadRequest(format!("Field '{name}' is not valid JSON: {e}"))
                })
            })
            .transpose()
    }

    #[cfg(test)]
    pub(crate) fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}
