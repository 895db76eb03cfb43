//! Request access for binders.
//!
//! Binders read requests through the [`BindRequest`] trait so that any host
//! request type can be adapted. [`RequestContext`] is the bundled
//! implementation built from `http` parts.

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, Uri};

use crate::form::{parse_urlencoded, FieldMap, FormData, FormFile, MultipartConfig};
use crate::{BindError, FieldValues};

/// Read access to the parts of a request that properties can bind from.
pub trait BindRequest {
    /// Returns every value of a header.
    fn header(&self, name: &str) -> Option<FieldValues>;

    /// Returns every value of a query parameter.
    fn query(&self, name: &str) -> Option<FieldValues>;

    /// Returns every value of a form field.
    fn form(&self, name: &str) -> Option<FieldValues>;

    /// Returns the first file uploaded under `name`.
    fn file(&self, name: &str) -> Option<FormFile>;

    /// Returns every file uploaded under `name`.
    fn files(&self, name: &str) -> Vec<FormFile>;

    /// Returns the raw request payload.
    fn body(&self) -> &[u8];

    /// Returns the declared payload length.
    ///
    /// Defaults to the length of [`body`](Self::body).
    fn content_length(&self) -> Option<u64> {
        Some(self.body().len() as u64)
    }
}

/// A request prepared for binding.
///
/// Query parameters are parsed from the URI once. URL-encoded bodies populate
/// the form on construction; multipart bodies require the async
/// [`RequestContext::read`].
///
/// # Example
///
/// ```rust
/// use feast_mapper::{BindRequest, RequestContext};
/// use http::{HeaderMap, Method, Uri};
/// use bytes::Bytes;
///
/// let ctx = RequestContext::new(
///     Method::GET,
///     Uri::from_static("/users?userId=42"),
///     HeaderMap::new(),
///     Bytes::new(),
/// );
///
/// assert_eq!(ctx.query("userId").unwrap().joined(), "42");
/// assert!(ctx.query("UserId").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: FieldMap,
    form: FormData,
    body: Bytes,
}

impl RequestContext {
    /// Creates a context, parsing the query string and any URL-encoded form.
    ///
    /// Malformed query strings or forms leave the corresponding map empty.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let query = parse_query(&uri);
        let form = if is_urlencoded(&headers) {
            FormData::from_urlencoded(&body).unwrap_or_default()
        } else {
            FormData::new()
        };

        Self {
            method,
            uri,
            headers,
            query,
            form,
            body,
        }
    }

    /// Creates a context, reading multipart form bodies as well.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL-encoded or multipart body is malformed or
    /// exceeds the limits in `config`.
    pub async fn read(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        config: &MultipartConfig,
    ) -> Result<Self, BindError> {
        let form = if is_multipart(&headers) {
            FormData::from_multipart(&headers, body.clone(), config).await?
        } else if is_urlencoded(&headers) {
            FormData::from_urlencoded(&body)?
        } else {
            FormData::new()
        };

        Ok(Self {
            query: parse_query(&uri),
            method,
            uri,
            headers,
            form,
            body,
        })
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the parsed query parameters.
    #[must_use]
    pub fn query_params(&self) -> &FieldMap {
        &self.query
    }

    /// Returns the parsed form.
    #[must_use]
    pub fn form_data(&self) -> &FormData {
        &self.form
    }

    /// Replaces the form, e.g. with one parsed by the host.
    pub fn set_form_data(&mut self, form: FormData) {
        self.form = form;
    }

    /// Returns the Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        content_type(&self.headers)
    }
}

impl BindRequest for RequestContext {
    fn header(&self, name: &str) -> Option<FieldValues> {
        let values: FieldValues = self
            .headers
            .get_all(name)
            .iter()
            .map(header_text)
            .collect();
        (!values.is_empty()).then_some(values)
    }

    fn query(&self, name: &str) -> Option<FieldValues> {
        self.query.get(name).cloned()
    }

    fn form(&self, name: &str) -> Option<FieldValues> {
        self.form.field(name).cloned()
    }

    fn file(&self, name: &str) -> Option<FormFile> {
        self.form.file(name).cloned()
    }

    fn files(&self, name: &str) -> Vec<FormFile> {
        self.form.files(name).cloned().collect()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .or(Some(self.body.len() as u64))
    }
}

/// Decodes a header value as Latin-1, so opaque bytes never drop a value.
fn header_text(value: &HeaderValue) -> String {
    value.as_bytes().iter().copied().map(char::from).collect()
}

fn parse_query(uri: &Uri) -> FieldMap {
    uri.query()
        .and_then(|q| parse_urlencoded(q.as_bytes()).ok())
        .unwrap_or_default()
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

fn is_urlencoded(headers: &HeaderMap) -> bool {
    content_type(headers)
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    content_type(headers)
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .is_some_and(|m| m.essence_str() == mime::MULTIPART_FORM_DATA.essence_str())
}

/// Builder for constructing a [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    method: Option<Method>,
    uri: Option<Uri>,
    headers: HeaderMap,
    body: Bytes,
    form: Option<FormData>,
}

impl RequestContextBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP method. Defaults to `GET`.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the URI. Defaults to `/`.
    #[must_use]
    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = Some(uri);
        self
    }

    /// Sets the headers.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Appends a header value. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<header::HeaderName>(),
            value.parse::<header::HeaderValue>(),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the form directly, bypassing body parsing.
    #[must_use]
    pub fn form(mut self, form: FormData) -> Self {
        self.form = Some(form);
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        let mut ctx = RequestContext::new(
            self.method.unwrap_or(Method::GET),
            self.uri.unwrap_or_else(|| Uri::from_static("/")),
            self.headers,
            self.body,
        );
        if let Some(form) = self.form {
            ctx.form = form;
        }
        ctx
    }
}
