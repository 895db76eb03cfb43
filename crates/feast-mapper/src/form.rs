//! Form data: fields, uploaded files, and the parsers producing them.
//!
//! URL-encoded bodies are parsed synchronously with `serde_urlencoded`.
//! `multipart/form-data` bodies are parsed with `multer`, which is async.

use std::io;

use bytes::Bytes;
use http::HeaderMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{BindError, FieldValues};

/// Largest multipart payload accepted by default, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 << 20;

/// Largest single multipart part accepted by default, in bytes.
pub const DEFAULT_MAX_FIELD_SIZE: usize = 10 << 20;

/// Number of multipart parts accepted by default.
pub const DEFAULT_MAX_FIELDS: usize = 100;

/// Ordered multi-valued field map, keyed case-sensitively.
pub type FieldMap = IndexMap<String, FieldValues>;

/// Property type for a list of uploaded files.
///
/// `None` after binding means no file was sent under either name.
pub type FormFiles = Option<Vec<FormFile>>;

/// Limits applied while reading multipart bodies.
///
/// Loaded from the `[multipart]` table of a [`MapperConfig`](crate::MapperConfig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultipartConfig {
    /// Upper bound on the whole payload.
    pub max_body_size: usize,
    /// Upper bound on one part, text or file.
    pub max_field_size: usize,
    /// Upper bound on the number of parts.
    pub max_fields: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_fields: DEFAULT_MAX_FIELDS,
        }
    }
}

impl MultipartConfig {
    /// Limits with the default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the payload limit.
    #[must_use]
    pub fn max_body_size(self, max_body_size: usize) -> Self {
        Self {
            max_body_size,
            ..self
        }
    }

    /// Overrides the per-part limit.
    #[must_use]
    pub fn max_field_size(self, max_field_size: usize) -> Self {
        Self {
            max_field_size,
            ..self
        }
    }

    /// Overrides the part count limit.
    #[must_use]
    pub fn max_fields(self, max_fields: usize) -> Self {
        Self { max_fields, ..self }
    }
}

/// A file uploaded through a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFile {
    field: String,
    file_name: Option<String>,
    media_type: Option<String>,
    data: Bytes,
}

impl FormFile {
    /// Creates a file sent under form field `field`.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        file_name: Option<String>,
        media_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name,
            media_type,
            data: data.into(),
        }
    }

    /// Form field the file was sent under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.field
    }

    /// File name supplied by the client, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Media type declared for the part.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// Raw content.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for a zero-byte upload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Text after the last `.` of the client file name.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let (_, ext) = self.file_name.as_deref()?.rsplit_once('.')?;
        Some(ext)
    }
}

/// Parsed form content: text fields and uploaded files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: FieldMap,
    files: Vec<FormFile>,
}

impl FormData {
    /// Creates empty form data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a URL-encoded body such as `a=1&b=2&a=3`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::MalformedForm`] if the body is not valid
    /// URL-encoded text.
    pub fn from_urlencoded(body: &[u8]) -> Result<Self, BindError> {
        Ok(Self {
            fields: parse_urlencoded(body)?,
            files: Vec::new(),
        })
    }

    /// Reads a `multipart/form-data` body.
    ///
    /// Parts carrying a file name become [`FormFile`]s; the others must be
    /// UTF-8 text and become fields.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnsupportedMediaType`] without a usable boundary,
    /// [`BindError::PayloadTooLarge`] past a size limit, and
    /// [`BindError::MalformedForm`] for too many parts or a broken body.
    pub async fn from_multipart(
        headers: &HeaderMap,
        body: Bytes,
        config: &MultipartConfig,
    ) -> Result<Self, BindError> {
        let boundary = boundary(headers)?;

        if body.len() > config.max_body_size {
            return Err(too_large(body.len(), config.max_body_size));
        }

        let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut form = Self::new();
        let mut parts = 0_usize;
        while let Some(part) = multipart.next_field().await.map_err(malformed)? {
            parts += 1;
            if parts > config.max_fields {
                return Err(BindError::MalformedForm {
                    reason: format!("more than {} parts", config.max_fields),
                });
            }

            let field = part.name().unwrap_or_default().to_string();
            let file_name = part.file_name().map(str::to_string);
            let media_type = part.content_type().map(ToString::to_string);
            let data = part.bytes().await.map_err(malformed)?;
            if data.len() > config.max_field_size {
                return Err(too_large(data.len(), config.max_field_size));
            }

            match file_name {
                Some(file_name) => {
                    form.add_file(FormFile::new(field, Some(file_name), media_type, data));
                }
                None => {
                    let text = String::from_utf8(data.to_vec()).map_err(|e| BindError::MalformedForm {
                        reason: format!("part `{field}` is not UTF-8: {e}"),
                    })?;
                    form.add_field(field, text);
                }
            }
        }

        Ok(form)
    }

    /// Appends a text value under `name`.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    /// Appends an uploaded file.
    pub fn add_file(&mut self, file: FormFile) {
        self.files.push(file);
    }

    /// Returns the text values sent under `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValues> {
        self.fields.get(name)
    }

    /// Returns the text fields.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Returns the first file uploaded under `name`.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field == name)
    }

    /// Returns every file uploaded under `name`.
    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormFile> + 'a {
        self.files.iter().filter(move |f| f.field == name)
    }

    /// Returns all uploaded files.
    #[must_use]
    pub fn all_files(&self) -> &[FormFile] {
        &self.files
    }
}

/// Parses URL-encoded pairs into a multi-valued map, keeping repeats.
pub(crate) fn parse_urlencoded(input: &[u8]) -> Result<FieldMap, BindError> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(input).map_err(|e| BindError::MalformedForm {
            reason: e.to_string(),
        })?;

    let mut map = FieldMap::new();
    for (key, value) in pairs {
        map.entry(key).or_default().push(value);
    }
    Ok(map)
}

fn boundary(headers: &HeaderMap) -> Result<String, BindError> {
    let Some(content_type) = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return Err(BindError::UnsupportedMediaType {
            expected: "multipart/form-data",
            actual: None,
        });
    };

    multer::parse_boundary(content_type).map_err(|_| BindError::UnsupportedMediaType {
        expected: "multipart/form-data",
        actual: Some(content_type.to_string()),
    })
}

fn too_large(size: usize, limit: usize) -> BindError {
    BindError::payload_too_large(size as u64, limit as u64)
}

fn malformed(e: multer::Error) -> BindError {
    BindError::MalformedForm {
        reason: format!("multipart parse error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "feast-boundary";

    /// Builds a multipart body from `(field, file name, content)` parts.
    fn encode(parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut body = String::new();
        for (field, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Bytes::from(body)
    }

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, content_type.parse().unwrap());
        headers
    }

    fn multipart() -> HeaderMap {
        headers(&format!("multipart/form-data; boundary={BOUNDARY}"))
    }

    #[test]
    fn test_config_overrides() {
        let config = MultipartConfig::new().max_fields(3).max_field_size(64);

        assert_eq!(config.max_fields, 3);
        assert_eq!(config.max_field_size, 64);
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
    }

    #[test]
    fn test_urlencoded_keeps_repeats() {
        let form = FormData::from_urlencoded(b"tag=a&name=alice+smith&tag=b").unwrap();

        assert_eq!(form.field("name").unwrap().joined(), "alice smith");
        assert_eq!(form.field("tag").unwrap().to_vec(), vec!["a", "b"]);
        assert!(form.field("missing").is_none());
        assert!(form.all_files().is_empty());
    }

    #[test]
    fn test_urlencoded_empty_body() {
        assert!(FormData::from_urlencoded(b"").unwrap().fields().is_empty());
    }

    #[tokio::test]
    async fn test_multipart_fields_and_files() {
        let body = encode(&[
            ("name", None, "Alice"),
            ("avatar", Some("photo.png"), "PNG_DATA"),
            ("docs", Some("a.txt"), "file a"),
            ("docs", Some("b.txt"), "file b"),
        ]);

        let form = FormData::from_multipart(&multipart(), body, &MultipartConfig::default())
            .await
            .unwrap();

        assert_eq!(form.field("name").unwrap().joined(), "Alice");

        let avatar = form.file("avatar").unwrap();
        assert_eq!(avatar.file_name(), Some("photo.png"));
        assert_eq!(avatar.content_type(), Some("application/octet-stream"));
        assert_eq!(avatar.data().as_ref(), b"PNG_DATA");
        assert_eq!(avatar.extension(), Some("png"));

        let docs: Vec<_> = form.files("docs").collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].file_name(), Some("b.txt"));
        assert_eq!(form.all_files().len(), 3);
    }

    #[tokio::test]
    async fn test_multipart_requires_content_type() {
        let result =
            FormData::from_multipart(&HeaderMap::new(), Bytes::new(), &MultipartConfig::default())
                .await;
        assert!(matches!(result, Err(BindError::UnsupportedMediaType { actual: None, .. })));
    }

    #[tokio::test]
    async fn test_multipart_requires_boundary() {
        let result = FormData::from_multipart(
            &headers("multipart/form-data"),
            Bytes::new(),
            &MultipartConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(BindError::UnsupportedMediaType { actual: Some(_), .. })));
    }

    #[tokio::test]
    async fn test_multipart_limits() {
        let body = encode(&[("a", None, "1"), ("b", None, "0123456789"), ("c", None, "3")]);

        let whole = FormData::from_multipart(
            &multipart(),
            body.clone(),
            &MultipartConfig::new().max_body_size(10),
        )
        .await;
        assert!(matches!(whole, Err(BindError::PayloadTooLarge { limit: 10, .. })));

        let part = FormData::from_multipart(
            &multipart(),
            body.clone(),
            &MultipartConfig::new().max_field_size(4),
        )
        .await;
        assert!(matches!(part, Err(BindError::PayloadTooLarge { declared: 10, limit: 4, .. })));

        let count =
            FormData::from_multipart(&multipart(), body, &MultipartConfig::new().max_fields(2)).await;
        assert!(matches!(count, Err(BindError::MalformedForm { .. })));
    }

    #[test]
    fn test_form_file_helpers() {
        let readme = FormFile::new("doc", Some("README".to_string()), None, "data");
        assert_eq!(readme.extension(), None);
        assert_eq!(readme.len(), 4);
        assert!(!readme.is_empty());
        assert_eq!(readme.name(), "doc");

        let archive = FormFile::new("doc", Some("backup.tar.gz".to_string()), None, Bytes::new());
        assert_eq!(archive.extension(), Some("gz"));
        assert!(archive.is_empty());
        assert_eq!(FormFile::new("doc", None, None, "x").extension(), None);
    }
}
