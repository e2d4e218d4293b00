//! Buffered multipart/form-data bodies for the admin upload endpoints

use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{http::StatusCode, HttpResponse};
use futures_util::TryStreamExt;

use super::error_response;

pub struct UploadedFile {
    /// Name as sent by the client, not yet sanitized
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Default)]
pub struct FormData {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// First value of a text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of a repeated field
    pub fn all(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A file part; parts sent with an empty filename count as absent
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }
}

/// Read the whole form. Bodies over `max_bytes` in total are refused with 413.
pub async fn read_form(mut payload: Multipart, max_bytes: usize) -> Result<FormData, HttpResponse> {
    let mut form = FormData::default();
    let mut total = 0usize;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::warn!("Malformed multipart body: {}", e);
        error_response(StatusCode::BAD_REQUEST, "Malformed form data")
    })? {
        let name = field.name().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(String::from);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::warn!("Failed to read form field '{}': {}", name, e);
            error_response(StatusCode::BAD_REQUEST, "Malformed form data")
        })? {
            total += chunk.len();
            if total > max_bytes {
                return Err(error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    format!("Upload exceeds the {} byte limit", max_bytes),
                ));
            }
            data.extend_from_slice(&chunk);
        }

        match filename {
            Some(filename) if !filename.is_empty() => {
                form.files.insert(name, UploadedFile { filename, data });
            }
            // A file input left empty still sends a part with filename=""
            Some(_) => {}
            None => {
                let value = String::from_utf8_lossy(&data).into_owned();
                form.fields.entry(name).or_default().push(value);
            }
        }
    }

    Ok(form)
}

#[cfg(test)]
pub(crate) mod test_body {
    pub const BOUNDARY: &str = "----persona-test-boundary";

    pub enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    /// (content-type header, body) for a multipart request
    pub fn multipart(parts: &[Part<'_>]) -> ((&'static str, String), Vec<u8>) {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let header = (
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
        (header, body)
    }
}
