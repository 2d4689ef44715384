//! Marker and format-string registry (C3), grounded on the original
//! `marker.c`: maps numeric event ids to names and parsed field layouts,
//! populated from `marker_id_declare`/`marker_format_declare` events
//! encountered while decoding.

pub mod field;
pub mod format;
pub mod registry;

pub use field::{resolve_offsets, FieldSpec, FieldType, ResolvedField};
pub use format::MarkerFormat;
pub use registry::{MarkerInfo, MarkerRegistry};
