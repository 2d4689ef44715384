//! Priority-ordered hook chains (C2), grounded on the original `hook.c`.
//!
//! Each chain entry carries a priority and a reference count. The original C
//! deduplicates entries by comparing raw `(function pointer, hook_data
//! pointer)` pairs; Rust closures have no such comparable identity, so
//! registration instead takes an explicit `token: u64` supplied by the
//! caller, mirroring the same pointer-keyed hash table's role with an
//! integer-keyed map instead. Registering the same token twice increments
//! the refcount instead of inserting a second entry, exactly like the
//! original.
//!
//! A chain is generic over one call-data type `D` rather than storing
//! `void*`-erased callbacks, so each chain is a typed list of that one
//! call-data shape.

/// A single hook: boxed so a chain can hold closures with distinct capture
/// environments, all sharing the call-data signature `FnMut(&mut D) -> bool`.
pub type Hook<D> = Box<dyn FnMut(&mut D) -> bool>;

struct Entry<D> {
    token: u64,
    hook: Hook<D>,
    prio: i32,
    refcount: u32,
}

/// An ordered sequence of hooks, sorted by ascending priority.
pub struct HookChain<D> {
    entries: Vec<Entry<D>>,
}

impl<D> Default for HookChain<D> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<D> HookChain<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register `hook` at `prio` under `token`. If `token` is already
    /// registered its refcount is incremented (its priority must match, as
    /// in the original's `g_assert(new_c.prio == c->prio)`); the `hook`
    /// passed in that case is dropped unused.
    ///
    /// # Panics
    /// Panics if `token` is already registered at a different priority —
    /// mirroring the original's `g_assert` on priority equality, since a
    /// consumer re-registering the same token with a different priority
    /// indicates a programming error, not recoverable input.
    pub fn add(&mut self, token: u64, prio: i32, hook: Hook<D>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.token == token) {
            assert_eq!(
                entry.prio, prio,
                "hook token {token} re-registered at a different priority"
            );
            entry.refcount += 1;
            return;
        }
        let insert_at = self.entries.iter().position(|e| prio < e.prio).unwrap_or(self.entries.len());
        self.entries.insert(insert_at, Entry { token, hook, prio, refcount: 1 });
    }

    /// Decrement `token`'s refcount, removing the entry once it reaches
    /// zero. No-op if `token` is not registered.
    pub fn remove(&mut self, token: u64) {
        if let Some(idx) = self.entries.iter().position(|e| e.token == token) {
            if self.entries[idx].refcount <= 1 {
                self.entries.remove(idx);
            } else {
                self.entries[idx].refcount -= 1;
            }
        }
    }

    /// Merge-insert every entry of `other` into `self` in priority order,
    /// deduplicating by token (`lttv_hooks_add_list`).
    pub fn extend_sorted(&mut self, other: HookChain<D>) {
        for entry in other.entries {
            if let Some(existing) = self.entries.iter_mut().find(|e| e.token == entry.token) {
                assert_eq!(existing.prio, entry.prio);
                existing.refcount += entry.refcount;
                continue;
            }
            let insert_at =
                self.entries.iter().position(|e| entry.prio < e.prio).unwrap_or(self.entries.len());
            self.entries.insert(insert_at, entry);
        }
    }

    /// Remove every token present in `tokens` (`lttv_hooks_remove_list`).
    pub fn remove_tokens(&mut self, tokens: &[u64]) {
        for &token in tokens {
            self.remove(token);
        }
    }

    /// Fire every hook in priority order; returns the logical OR of all
    /// results.
    pub fn call(&mut self, call_data: &mut D) -> bool {
        let mut sum = false;
        for entry in &mut self.entries {
            sum |= (entry.hook)(call_data);
        }
        sum
    }

    /// Fire hooks in priority order, stopping at the first one that returns
    /// `true`.
    pub fn call_check(&mut self, call_data: &mut D) -> bool {
        for entry in &mut self.entries {
            if (entry.hook)(call_data) {
                return true;
            }
        }
        false
    }
}

/// Merge-call two pre-sorted chains without allocating: walk both with two
/// cursors, always firing the lower-priority side next (`lttv_hooks_call_merge`).
/// Both chains are invoked against the same `call_data`, since in this
/// engine the by-id and general chains observe the same event context.
pub fn call_merge<D>(h1: &mut HookChain<D>, h2: &mut HookChain<D>, call_data: &mut D) -> bool {
    let mut i = 0;
    let mut j = 0;
    let mut sum = false;
    while i < h1.entries.len() && j < h2.entries.len() {
        if h1.entries[i].prio <= h2.entries[j].prio {
            sum |= (h1.entries[i].hook)(call_data);
            i += 1;
        } else {
            sum |= (h2.entries[j].hook)(call_data);
            j += 1;
        }
    }
    for entry in &mut h1.entries[i..] {
        sum |= (entry.hook)(call_data);
    }
    for entry in &mut h2.entries[j..] {
        sum |= (entry.hook)(call_data);
    }
    sum
}

/// Short-circuiting variant of [`call_merge`] (`lttv_hooks_call_check_merge`):
/// stops at the first hook, from either chain, that returns `true`.
pub fn call_check_merge<D>(h1: &mut HookChain<D>, h2: &mut HookChain<D>, call_data: &mut D) -> bool {
    let mut i = 0;
    let mut j = 0;
    while i < h1.entries.len() && j < h2.entries.len() {
        if h1.entries[i].prio <= h2.entries[j].prio {
            if (h1.entries[i].hook)(call_data) {
                return true;
            }
            i += 1;
        } else {
            if (h2.entries[j].hook)(call_data) {
                return true;
            }
            j += 1;
        }
    }
    for entry in &mut h1.entries[i..] {
        if (entry.hook)(call_data) {
            return true;
        }
    }
    for entry in &mut h2.entries[j..] {
        if (entry.hook)(call_data) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_sorts_by_priority() {
        let mut chain: HookChain<Vec<i32>> = HookChain::new();
        chain.add(1, 10, Box::new(|d| { d.push(10); false }));
        chain.add(2, 5, Box::new(|d| { d.push(5); false }));
        chain.add(3, 7, Box::new(|d| { d.push(7); false }));

        let mut data = Vec::new();
        chain.call(&mut data);
        assert_eq!(data, vec![5, 7, 10]);
    }

    #[test]
    fn duplicate_token_increments_refcount_not_entries() {
        let mut chain: HookChain<Vec<i32>> = HookChain::new();
        chain.add(1, 0, Box::new(|d| { d.push(1); false }));
        chain.add(1, 0, Box::new(|d| { d.push(99); false })); // dropped, refcount bumped
        assert_eq!(chain.len(), 1);

        let mut data = Vec::new();
        chain.call(&mut data);
        assert_eq!(data, vec![1]);
    }

    #[test]
    fn remove_decrements_then_drops() {
        let mut chain: HookChain<Vec<i32>> = HookChain::new();
        chain.add(1, 0, Box::new(|d| { d.push(1); false }));
        chain.add(1, 0, Box::new(|_| false));
        assert_eq!(chain.len(), 1);
        chain.remove(1);
        assert_eq!(chain.len(), 1); // refcount 2 -> 1, still present
        chain.remove(1);
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn call_returns_logical_or() {
        let mut chain: HookChain<()> = HookChain::new();
        chain.add(1, 0, Box::new(|_| false));
        chain.add(2, 1, Box::new(|_| true));
        chain.add(3, 2, Box::new(|_| false));
        assert!(chain.call(&mut ()));
    }

    #[test]
    fn call_check_short_circuits() {
        let mut chain: HookChain<Vec<i32>> = HookChain::new();
        chain.add(1, 0, Box::new(|d| { d.push(1); false }));
        chain.add(2, 1, Box::new(|d| { d.push(2); true }));
        chain.add(3, 2, Box::new(|d| { d.push(3); true }));

        let mut data = Vec::new();
        assert!(chain.call_check(&mut data));
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn call_merge_interleaves_by_priority() {
        let mut h1: HookChain<Vec<i32>> = HookChain::new();
        h1.add(1, 0, Box::new(|d| { d.push(10); false }));
        h1.add(2, 20, Box::new(|d| { d.push(120); false }));

        let mut h2: HookChain<Vec<i32>> = HookChain::new();
        h2.add(3, 10, Box::new(|d| { d.push(110); false }));
        h2.add(4, 30, Box::new(|d| { d.push(130); false }));

        let mut data = Vec::new();
        call_merge(&mut h1, &mut h2, &mut data);
        assert_eq!(data, vec![10, 110, 120, 130]);
    }

    #[test]
    fn call_merge_handles_one_empty_chain() {
        let mut h1: HookChain<Vec<i32>> = HookChain::new();
        h1.add(1, 0, Box::new(|d| { d.push(1); false }));
        let mut h2: HookChain<Vec<i32>> = HookChain::new();

        let mut data = Vec::new();
        call_merge(&mut h1, &mut h2, &mut data);
        assert_eq!(data, vec![1]);
    }

    #[test]
    fn call_check_merge_short_circuits_across_chains() {
        let mut h1: HookChain<Vec<i32>> = HookChain::new();
        h1.add(1, 0, Box::new(|d| { d.push(1); false }));
        let mut h2: HookChain<Vec<i32>> = HookChain::new();
        h2.add(2, 1, Box::new(|d| { d.push(2); true }));
        h2.add(3, 2, Box::new(|d| { d.push(3); true }));

        let mut data = Vec::new();
        assert!(call_check_merge(&mut h1, &mut h2, &mut data));
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn extend_sorted_merges_preserving_priority() {
        let mut h1: HookChain<()> = HookChain::new();
        h1.add(1, 5, Box::new(|_| false));
        let mut h2: HookChain<()> = HookChain::new();
        h2.add(2, 1, Box::new(|_| false));
        h1.extend_sorted(h2);
        assert_eq!(h1.len(), 2);
    }
}
