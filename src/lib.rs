//! Field Mapper Agent for Zentinel.
//!
//! Renames or duplicates keys in a request's query string and flat JSON body
//! before the request is forwarded:
//!
//! - `copy_fields` duplicate a value under a new key, keeping the original
//! - `map_fields` move a value to a new key, deleting the original
//! - `scope` selects the pipeline phases the proxy runs the modifier in
//!
//! Copies run before renames. Bodies that are empty or not a flat object of
//! string values are forwarded unchanged.
//!
//! ## Configuration Example
//!
//! ```json
//! {
//!   "copy_fields": { "occupation": "job" },
//!   "map_fields": { "user_id": "token" },
//!   "scope": ["request"]
//! }
//! ```

pub mod config;
pub mod context;
pub mod mapper;
pub mod modifier;
pub mod request;

pub use config::{ConfigError, MapperConfig, Phase};
pub use context::RequestView;
pub use mapper::{FieldMapper, MappingDefinition};
pub use modifier::{MapperModifier, ModifyError, ParsedModifier, RequestModifier};
pub use request::ProxyRequest;
