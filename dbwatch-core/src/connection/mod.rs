//! Connection descriptors and their vendor renderings.
//!
//! # Module Structure
//! - `descriptor`: vendor-neutral `ConnectionDescriptor` and legacy URL parsing
//! - `string`: `ConnectionString` key/value syntax with redaction
//! - `builder`: pure rendering of a descriptor plus credential per backend

mod builder;
mod descriptor;
mod string;

pub use builder::{
    AUTH_PLUGIN_PARAM, build_connection_string, normalize_firebird_path,
    split_server_port,
};
pub use descriptor::ConnectionDescriptor;
pub use string::ConnectionString;
