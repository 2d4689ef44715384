//! Sparse per-event-id hook table: rather than scanning the full 16-bit
//! event-id space, chains are allocated lazily into a growable slot vector
//! and a compact side array records which indices are in use.

use super::chain::HookChain;

pub struct HookTable<D> {
    slots: Vec<Option<HookChain<D>>>,
    used: Vec<u16>,
}

impl<D> Default for HookTable<D> {
    fn default() -> Self {
        Self { slots: Vec::new(), used: Vec::new() }
    }
}

impl<D> HookTable<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the chain for `id`, allocating an empty one on first use.
    pub fn chain_mut(&mut self, id: u16) -> &mut HookChain<D> {
        let idx = id as usize;
        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }
        if self.slots[idx].is_none() {
            self.slots[idx] = Some(HookChain::new());
            self.used.push(id);
        }
        self.slots[idx].as_mut().expect("just allocated")
    }

    #[must_use]
    pub fn chain(&self, id: u16) -> Option<&HookChain<D>> {
        self.slots.get(id as usize).and_then(|slot| slot.as_ref())
    }

    pub fn chain_mut_existing(&mut self, id: u16) -> Option<&mut HookChain<D>> {
        self.slots.get_mut(id as usize).and_then(|slot| slot.as_mut())
    }

    /// Event ids with at least one registered hook, in registration order.
    #[must_use]
    pub fn used_ids(&self) -> &[u16] {
        &self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_mut_allocates_lazily() {
        let mut table: HookTable<()> = HookTable::new();
        assert!(table.chain(5).is_none());
        table.chain_mut(5).add(1, 0, Box::new(|_| false));
        assert_eq!(table.chain(5).unwrap().len(), 1);
        assert_eq!(table.used_ids(), &[5]);
    }

    #[test]
    fn used_ids_tracks_only_allocated_slots() {
        let mut table: HookTable<()> = HookTable::new();
        table.chain_mut(3).add(1, 0, Box::new(|_| false));
        table.chain_mut(300).add(2, 0, Box::new(|_| false));
        assert_eq!(table.used_ids(), &[3, 300]);
        assert!(table.chain(4).is_none());
    }

    #[test]
    fn repeated_chain_mut_does_not_duplicate_used_entry() {
        let mut table: HookTable<()> = HookTable::new();
        table.chain_mut(7);
        table.chain_mut(7);
        assert_eq!(table.used_ids(), &[7]);
    }
}
