use std::collections::HashMap;
use std::time::Duration;

use actix_multipart::Multipart;
use futures_util::StreamExt;

use crate::error::ApiError;
use crate::security::secure_error;
use crate::submissions::models::UploadedFile;

/// Ceiling for plain text parts.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
const MAX_TEXT_FIELDS: usize = 16;

#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl MultipartForm {
    pub fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }
}

/// Buffers a multipart body. The part named `file_field` is kept as a file
/// of at most `max_file_bytes`; anything past that is drained and the file
/// is flagged oversized instead of being buffered. The whole read must finish
/// within `deadline`.
pub async fn read_form(
    payload: Multipart,
    file_field: &str,
    max_file_bytes: usize,
    deadline: Duration,
) -> Result<MultipartForm, ApiError> {
    tokio::time::timeout(deadline, read_parts(payload, file_field, max_file_bytes))
        .await
        .map_err(|e| secure_error(e, "Upload timed out"))?
}

async fn read_parts(
    mut payload: Multipart,
    file_field: &str,
    max_file_bytes: usize,
) -> Result<MultipartForm, ApiError> {
    let mut form = MultipartForm::default();

    while let Some(field_result) = payload.next().await {
        let mut field = field_result
            .map_err(|e| ApiError::BadRequest(format!("Error reading form field: {e}")))?;

        let name = field.name().unwrap_or_default().to_string();

        if name == file_field {
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .unwrap_or_default()
                .to_string();
            let content_type = field
                .content_type()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default();

            let mut bytes = Vec::new();
            let mut oversized = false;
            while let Some(chunk_result) = field.next().await {
                let chunk = chunk_result
                    .map_err(|e| ApiError::BadRequest(format!("Error reading file: {e}")))?;
                if oversized || bytes.len() + chunk.len() > max_file_bytes {
                    oversized = true;
                    continue;
                }
                bytes.extend_from_slice(&chunk);
            }

            form.file = Some(UploadedFile {
                filename,
                content_type,
                bytes,
                oversized,
            });
            continue;
        }

        if form.fields.len() >= MAX_TEXT_FIELDS {
            return Err(ApiError::bad_request("Too many form fields"));
        }

        let mut value = Vec::new();
        while let Some(chunk_result) = field.next().await {
            let chunk = chunk_result
                .map_err(|e| ApiError::BadRequest(format!("Error reading form field: {e}")))?;
            if value.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                return Err(ApiError::bad_request(format!("Field {name} is too large")));
            }
            value.extend_from_slice(&chunk);
        }
        form.fields
            .insert(name, String::from_utf8_lossy(&value).into_owned());
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use actix_web::error::PayloadError;
    use actix_web::http::header::{self, HeaderMap, HeaderValue};
    use actix_web::web::Bytes;
    use futures_util::stream;

    use super::*;

    const BOUNDARY: &str = "formboundary";

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=formboundary"),
        );
        headers
    }

    fn body_with_fields(count: usize) -> Bytes {
        let mut body = String::new();
        for i in 0..count {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"f{i}\"\r\n\r\nv{i}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Bytes::from(body)
    }

    fn payload_of(body: Bytes) -> Multipart {
        Multipart::new(
            &headers(),
            stream::iter(vec![Ok::<_, PayloadError>(body)]),
        )
    }

    #[actix_web::test]
    async fn reads_text_fields() {
        let payload = payload_of(body_with_fields(2));
        let mut form = read_form(payload, "file", 1024, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(form.take("f1").as_deref(), Some("v1"));
        assert!(form.file.is_none());
    }

    #[actix_web::test]
    async fn too_many_fields_are_refused() {
        let err = read_form(
            payload_of(body_with_fields(MAX_TEXT_FIELDS + 1)),
            "file",
            1024,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Too many form fields");
    }

    #[actix_web::test]
    async fn stalled_body_hits_the_deadline() {
        let stalled = Multipart::new(&headers(), stream::pending::<Result<Bytes, PayloadError>>());
        let err = read_form(stalled, "file", 1024, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(err.to_string(), "Upload timed out");
    }
}
