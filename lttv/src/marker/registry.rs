//! Marker registry (C3): tracks the id→name and id→format declarations a
//! trace makes for itself before any event of that id can be decoded,
//! grounded on the original `marker.c`'s global marker table re-scoped to
//! one registry per trace instead of one process-wide table.

use std::collections::HashMap;

use super::format::MarkerFormat;
use crate::domain::errors::SchemaError;
use crate::domain::types::EventId;

#[derive(Debug, Clone)]
pub struct MarkerInfo {
    pub name: String,
    pub format: Option<MarkerFormat>,
}

#[derive(Debug, Default)]
pub struct MarkerRegistry {
    by_id: HashMap<EventId, MarkerInfo>,
    id_by_name: HashMap<String, EventId>,
}

impl MarkerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a `marker_id_declare` event: binds `id` to `name`.
    pub fn declare_id(&mut self, id: EventId, name: &str) -> Result<(), SchemaError> {
        if let Some(existing) = self.id_by_name.get(name) {
            if *existing != id {
                return Err(SchemaError::FormatStringConflict { name: name.to_owned() });
            }
        }
        self.id_by_name.insert(name.to_owned(), id);
        self.by_id.entry(id).or_insert_with(|| MarkerInfo { name: name.to_owned(), format: None });
        Ok(())
    }

    /// Handle a `marker_format_declare` event: parses and attaches the
    /// format string for an already-declared id.
    pub fn declare_format(&mut self, id: EventId, format: &str) -> Result<(), SchemaError> {
        let info = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SchemaError::MarkerUsedBeforeDeclared(id))?;
        info.format = Some(MarkerFormat::parse(&info.name, format)?);
        Ok(())
    }

    /// Look up the declared marker for `id`. Callers decoding a non-special
    /// event whose id has no entry here should raise
    /// [`SchemaError::MarkerUsedBeforeDeclared`].
    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&MarkerInfo> {
        self.by_id.get(&id)
    }

    #[must_use]
    pub fn id_for_name(&self, name: &str) -> Option<EventId> {
        self.id_by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_id_then_format_round_trips() {
        let mut reg = MarkerRegistry::new();
        let id = EventId(10);
        reg.declare_id(id, "sched_switch").unwrap();
        reg.declare_format(id, "prev_pid:uint32,next_pid:uint32").unwrap();

        let info = reg.get(id).unwrap();
        assert_eq!(info.name, "sched_switch");
        assert_eq!(info.format.as_ref().unwrap().fields.len(), 2);
        assert_eq!(reg.id_for_name("sched_switch"), Some(id));
    }

    #[test]
    fn format_before_id_is_rejected() {
        let mut reg = MarkerRegistry::new();
        let err = reg.declare_format(EventId(1), "a:int8").unwrap_err();
        assert!(matches!(err, SchemaError::MarkerUsedBeforeDeclared(_)));
    }

    #[test]
    fn redeclaring_name_under_different_id_conflicts() {
        let mut reg = MarkerRegistry::new();
        reg.declare_id(EventId(1), "irq_entry").unwrap();
        let err = reg.declare_id(EventId(2), "irq_entry").unwrap_err();
        assert!(matches!(err, SchemaError::FormatStringConflict { .. }));
    }

    #[test]
    fn redeclaring_same_id_and_name_is_idempotent() {
        let mut reg = MarkerRegistry::new();
        reg.declare_id(EventId(1), "irq_entry").unwrap();
        reg.declare_id(EventId(1), "irq_entry").unwrap();
        assert_eq!(reg.get(EventId(1)).unwrap().name, "irq_entry");
    }
}
