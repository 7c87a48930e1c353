//! Schema loading, field coercion, and document validation

mod coerce;
mod loader;
mod types;
mod validator;

pub use coerce::{coerce_value, guess_value, strip_wiki_brackets};
pub use loader::{create_default_schema, load_schema, load_schema_str};
pub use types::{
    FieldDefinition, FieldKind, FieldValue, Schema, TraitDefinition, TypeDefinition, ValueKind,
    BUILTIN_TYPES,
};
pub use validator::{validate_document, validate_ref_targets};
