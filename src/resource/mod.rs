//! The editable view over an apk's resources.
//!
//! Files are opened through [container::Resources::open_file], which picks a
//! [backend::FileBackend] for the path, decodes the stored content and hands out a
//! [resource_file::ResourceFile]. Closing the file encodes the edited content back through
//! the same backend.

pub mod backend;
pub mod container;
pub mod deferral;
pub mod encode_materials;
pub mod entry_store;
pub mod framework;
pub mod global;
pub mod path_resolver;
pub mod resource_file;
pub mod value;
pub mod value_codec;
pub mod values;

use thiserror::Error;

use crate::table::config::ConfigError;
use crate::table::TableError;
use crate::xml::axml::AxmlError;
use crate::xml::XmlError;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource table error: {0}")]
    Table(#[from] TableError),

    #[error("Invalid qualifiers: {0}")]
    Config(#[from] ConfigError),

    #[error("Xml error: {0}")]
    Xml(#[from] XmlError),

    #[error("Binary xml error: {0}")]
    Axml(#[from] AxmlError),

    #[error("Invalid value: {0}")]
    Value(#[from] value_codec::ValueError),

    #[error("Reference {reference} could not be resolved")]
    Reference { reference: String },

    #[error("{0} is a view over the resource table and cannot be opened as a file")]
    ReservedPath(String),

    #[error("Apk does not have a resource table")]
    NoResourceTable,

    #[error("Invalid values document: {0}")]
    InvalidDocument(String),
}

impl ResourceError {
    pub(crate) fn reference(reference: &str) -> Self {
        ResourceError::Reference {
            reference: reference.to_string(),
        }
    }
}
