//! Leaf value types stored in the attribute tree.

use std::any::Any;
use std::sync::Arc;

use crate::domain::types::Tsc;

/// One leaf value. `Child` is not a variant here: a node is either `Leaf`
/// or `Branch` at the [`super::tree::Node`] level: a node is either a leaf
/// value or an internal node, never both.
#[derive(Clone)]
pub enum AttributeValue {
    Int32(i32),
    UInt32(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Time(Tsc),
    String(String),
    /// Opaque consumer payload (e.g. a GUI widget handle in the original);
    /// kept as a type-erased `Arc` so the attribute tree need not know about
    /// consumer-specific types. Cloning an `Opaque` leaf shares the payload.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int32(v) => write!(f, "Int32({v})"),
            Self::UInt32(v) => write!(f, "UInt32({v})"),
            Self::Long(v) => write!(f, "Long({v})"),
            Self::ULong(v) => write!(f, "ULong({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Double(v) => write!(f, "Double({v})"),
            Self::Time(v) => write!(f, "Time({v})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

/// Type discriminant, independent of any particular value — used by
/// `find_or_create` to check an existing leaf's type before reusing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Int32,
    UInt32,
    Long,
    ULong,
    Float,
    Double,
    Time,
    String,
    Opaque,
}

impl AttributeValue {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int32(_) => ValueKind::Int32,
            Self::UInt32(_) => ValueKind::UInt32,
            Self::Long(_) => ValueKind::Long,
            Self::ULong(_) => ValueKind::ULong,
            Self::Float(_) => ValueKind::Float,
            Self::Double(_) => ValueKind::Double,
            Self::Time(_) => ValueKind::Time,
            Self::String(_) => ValueKind::String,
            Self::Opaque(_) => ValueKind::Opaque,
        }
    }
}

impl ValueKind {
    /// Build the zero/empty value for this kind, used by `find_or_create`
    /// when a leaf does not yet exist.
    #[must_use]
    pub fn default_value(self) -> AttributeValue {
        match self {
            ValueKind::Int32 => AttributeValue::Int32(0),
            ValueKind::UInt32 => AttributeValue::UInt32(0),
            ValueKind::Long => AttributeValue::Long(0),
            ValueKind::ULong => AttributeValue::ULong(0),
            ValueKind::Float => AttributeValue::Float(0.0),
            ValueKind::Double => AttributeValue::Double(0.0),
            ValueKind::Time => AttributeValue::Time(Tsc::ZERO),
            ValueKind::String => AttributeValue::String(String::new()),
            ValueKind::Opaque => AttributeValue::Opaque(Arc::new(())),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Int32 => "int32",
            ValueKind::UInt32 => "uint32",
            ValueKind::Long => "long",
            ValueKind::ULong => "ulong",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Time => "time",
            ValueKind::String => "string",
            ValueKind::Opaque => "opaque",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_kind() {
        assert_eq!(ValueKind::Int32.default_value().kind(), ValueKind::Int32);
        assert!(matches!(ValueKind::String.default_value(), AttributeValue::String(s) if s.is_empty()));
    }
}
