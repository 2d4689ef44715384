//! Marker format-string parsing.
//!
//! A format string is a comma-separated list of `name:type` descriptors,
//! e.g. `"cpu_id:uint32,comm:string"`. This is a simplified, explicit
//! re-expression of the original's embedded-printf format language (see
//! `marker.c`'s `marker_parse_format`), dropping the printf conversion
//! characters themselves since this engine never re-renders events as text
//! through libc's `printf` — it only needs the wire layout they describe.

use super::field::{FieldSpec, FieldType};
use crate::domain::errors::SchemaError;

#[derive(Debug, Clone, Default)]
pub struct MarkerFormat {
    pub fields: Vec<FieldSpec>,
}

impl MarkerFormat {
    /// Parse a format string declared by a `marker_format_declare` event.
    pub fn parse(name: &str, format: &str) -> Result<MarkerFormat, SchemaError> {
        let mut fields = Vec::new();
        for token in format.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let (field_name, type_name) = token.split_once(':').ok_or_else(|| {
                SchemaError::MalformedFormat {
                    name: name.to_owned(),
                    reason: format!("field descriptor {token:?} is missing ':'"),
                }
            })?;
            let ty = FieldType::from_name(type_name.trim()).ok_or_else(|| {
                SchemaError::MalformedFormat {
                    name: name.to_owned(),
                    reason: format!("unknown field type {type_name:?}"),
                }
            })?;
            fields.push(FieldSpec { name: field_name.trim().to_owned(), ty });
        }
        Ok(MarkerFormat { fields })
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
