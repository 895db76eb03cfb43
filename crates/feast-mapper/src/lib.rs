//! # Feast Mapper
//!
//! Marker-driven binding of HTTP request data onto plain Rust types.
//!
//! A target type describes its writable properties once, through
//! [`Bindable`]. Each property carries markers naming the part of the request
//! it reads from. The first time a type is bound, a [`RequestMapper`]
//! classifies every property and compiles a [`CompiledBinder`]: an ordered
//! list of binding operations that is cached and reused for every later
//! request.
//!
//! ## Sources
//!
//! | Marker | Category | Reads |
//! |--------|----------|-------|
//! | [`FromHeader`] | [`SourceCategory::Header`] | Request headers (case-insensitive) |
//! | [`FromForm`] | [`SourceCategory::Form`] | Form fields, or uploaded files for [`FormFile`] / [`FormFiles`] properties |
//! | [`FromQuery`] | [`SourceCategory::Query`] | Query string parameters |
//! | [`FromBody`] | [`SourceCategory::Body`] | The whole payload as text |
//!
//! A property selecting several categories binds from the first in the order
//! Header, Form, Query, Body. Type-level markers apply to properties whose own
//! markers select nothing. Every field is looked up under the declared name,
//! then under the same name with its first letter's case flipped.
//!
//! Fields that are absent or fail to convert leave the property unchanged.
//!
//! ## Example
//!
//! ```rust
//! use feast_mapper::{Bindable, FromHeader, FromQuery, Properties, RequestContextBuilder};
//! use http::Uri;
//!
//! #[derive(Debug, Default)]
//! struct Session {
//!     user_id: i32,
//!     session_token: String,
//! }
//!
//! impl Bindable for Session {
//!     fn describe(props: &mut Properties<Self>) {
//!         props
//!             .property("UserId", |s: &mut Self, v: i32| s.user_id = v)
//!             .marked::<FromQuery>();
//!         props
//!             .property("SessionToken", |s: &mut Self, v: String| s.session_token = v)
//!             .marked::<FromHeader>();
//!     }
//! }
//!
//! let request = RequestContextBuilder::new()
//!     .uri(Uri::from_static("/users?userId=42"))
//!     .header("SessionToken", "abc")
//!     .build();
//!
//! let session: Session = feast_mapper::generate(&request, true).unwrap();
//! assert_eq!(session.user_id, 42);
//! assert_eq!(session.session_token, "abc");
//! ```
//!
//! ## Error Handling
//!
//! Problems with a type's design (a bound property without a converter, an
//! unbindable property name) are reported as a [`BindError`] when its binder
//! is compiled, before any request is read. Oversized payloads and malformed
//! forms are reported while binding and map onto HTTP status codes:
//!
//! ```rust
//! use feast_mapper::BindError;
//!
//! let err = BindError::payload_too_large(4096, 1024);
//! assert_eq!(err.status_code(), http::StatusCode::PAYLOAD_TOO_LARGE);
//! ```

#![doc(html_root_url = "https://docs.rs/feast-mapper/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod body;
mod compiler;
mod config;
mod context;
mod describe;
mod error;
mod field;
mod form;
mod mapper;
mod marker;
mod name;
mod parser;
mod source;
mod values;

pub use body::{BodyDecoder, BodyEncoding, Deserializer, JsonDeserializer, NoopDeserializer, MAX_TEXT_LENGTH};
pub use compiler::CompiledBinder;
pub use config::MapperConfig;
pub use context::{BindRequest, RequestContext, RequestContextBuilder};
pub use describe::{Bindable, Properties, PropertyBuilder, PropertyDescriptor};
pub use error::{BindError, ConfigError, PropertyRef};
pub use field::{BindingKind, BindingOperation};
pub use form::{
    FieldMap, FormData, FormFile, FormFiles, MultipartConfig, DEFAULT_MAX_BODY_SIZE,
    DEFAULT_MAX_FIELDS, DEFAULT_MAX_FIELD_SIZE,
};
pub use mapper::{
    bind, generate, global, init_global, map, register_converter, register_marker,
    register_marker_type, set_deserializer, MapperBuilder, RequestMapper,
};
pub use marker::{FromBody, FromForm, FromHeader, FromQuery, Marker, TypeKey};
pub use name::{alternate_case, resolve_name, ResolvedName};
pub use parser::{BoxedValue, Converter, ParserRegistry};
pub use source::{SourceCategory, SourceRegistry};
pub use values::FieldValues;
