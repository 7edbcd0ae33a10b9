//! Position-hint iterators.
//!
//! Answer "first", "next after X" and "exists" against a dense, ordered array
//! without re-scanning from the start on every call of a sequential
//! traversal. A hint remembers the index of the element it last returned,
//! anchored to the identity and shape generation of the array it was computed
//! against. A hint is only trusted after the element at its index is seen to
//! be the one the caller advances from; anything else falls back to a scan.

use super::types::ClusterPath;
use log::trace;
use std::fmt::Debug;

/// Identifier with a reserved terminal sentinel.
pub trait HintId: Copy + Eq + Debug {
    const INVALID: Self;
}

impl HintId for u16 {
    const INVALID: Self = u16::MAX;
}

impl HintId for u32 {
    const INVALID: Self = u32::MAX;
}

/// How one array slot presents itself to a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<I> {
    /// Returned by traversals.
    Visible(I),
    /// Present but filtered out (disabled endpoint, client-only cluster).
    /// Still usable as the starting point of `next`.
    Hidden(I),
    /// Terminal sentinel; nothing past it is part of the array.
    End,
}

impl<I: HintId> Slot<I> {
    /// Slot for a sentinel-terminated id array.
    pub fn of(id: I) -> Self {
        if id == I::INVALID {
            Slot::End
        } else {
            Slot::Visible(id)
        }
    }

    fn id(self) -> Option<I> {
        match self {
            Slot::Visible(id) | Slot::Hidden(id) => Some(id),
            Slot::End => None,
        }
    }
}

/// Identity of one traversable array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayId {
    Endpoints,
    Clusters { endpoint: usize },
    Attributes { endpoint: usize, cluster: usize },
    AcceptedCommands { endpoint: usize, cluster: usize },
    GeneratedCommands { endpoint: usize, cluster: usize },
    DeviceTypes { endpoint: usize },
    /// A list built on demand by a server cluster implementation.
    Built { path: ClusterPath, serial: u64 },
}

/// Array identity plus the shape generation it was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayAnchor {
    pub array: ArrayId,
    pub generation: u64,
}

impl ArrayAnchor {
    pub const fn new(array: ArrayId, generation: u64) -> Self {
        Self { array, generation }
    }
}

/// Cached position for one traversal axis.
#[derive(Debug, Default)]
pub struct PositionHint {
    anchor: Option<ArrayAnchor>,
    index: usize,
    misses: u64,
}

impl PositionHint {
    pub const fn new() -> Self {
        Self {
            anchor: None,
            index: 0,
            misses: 0,
        }
    }

    /// Lookups that could not use the cached index and scanned instead.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn invalidate(&mut self) {
        self.anchor = None;
        self.index = 0;
    }

    /// Index of the first visible element.
    pub fn first<T, I, F>(
        &mut self,
        anchor: ArrayAnchor,
        items: Option<&[T]>,
        slot_of: F,
    ) -> Option<usize>
    where
        I: HintId,
        F: Fn(&T) -> Slot<I>,
    {
        self.invalidate();
        let items = items?;

        let found = scan_visible(items, 0, &slot_of)?;
        self.anchor = Some(anchor);
        self.index = found;
        Some(found)
    }

    /// Index of the first visible element after `previous`.
    pub fn next<T, I, F>(
        &mut self,
        anchor: ArrayAnchor,
        items: Option<&[T]>,
        slot_of: F,
        previous: I,
    ) -> Option<usize>
    where
        I: HintId,
        F: Fn(&T) -> Slot<I>,
    {
        if previous == I::INVALID {
            return None;
        }
        let Some(items) = items else {
            self.invalidate();
            return None;
        };

        let at = match self.validated(anchor, items, &slot_of, previous) {
            Some(index) => index,
            None => {
                trace!("Position hint miss on {:?} for {:?}", anchor.array, previous);
                self.misses += 1;
                self.invalidate();
                let index = position(items, &slot_of, previous)?;
                self.anchor = Some(anchor);
                index
            }
        };

        let found = scan_visible(items, at + 1, &slot_of);
        self.index = found.unwrap_or(at);
        found
    }

    /// Index of the visible element `id`, if any.
    pub fn find<T, I, F>(
        &mut self,
        anchor: ArrayAnchor,
        items: Option<&[T]>,
        slot_of: F,
        id: I,
    ) -> Option<usize>
    where
        I: HintId,
        F: Fn(&T) -> Slot<I>,
    {
        if id == I::INVALID {
            return None;
        }
        let Some(items) = items else {
            self.invalidate();
            return None;
        };

        if let Some(index) = self.validated(anchor, items, &slot_of, id) {
            if items.get(index).map(&slot_of) == Some(Slot::Visible(id)) {
                return Some(index);
            }
        }

        self.misses += 1;
        self.invalidate();
        let index = position(items, &slot_of, id)?;
        if items.get(index).map(&slot_of) != Some(Slot::Visible(id)) {
            return None;
        }
        self.anchor = Some(anchor);
        self.index = index;
        Some(index)
    }

    pub fn exists<T, I, F>(
        &mut self,
        anchor: ArrayAnchor,
        items: Option<&[T]>,
        slot_of: F,
        id: I,
    ) -> bool
    where
        I: HintId,
        F: Fn(&T) -> Slot<I>,
    {
        self.find(anchor, items, slot_of, id).is_some()
    }

    /// The cached index, if it is anchored to `anchor` and still holds `id`.
    fn validated<T, I, F>(
        &self,
        anchor: ArrayAnchor,
        items: &[T],
        slot_of: &F,
        id: I,
    ) -> Option<usize>
    where
        I: HintId,
        F: Fn(&T) -> Slot<I>,
    {
        if self.anchor != Some(anchor) {
            return None;
        }
        let slot = slot_of(items.get(self.index)?);
        (slot.id() == Some(id)).then_some(self.index)
    }
}

fn scan_visible<T, I, F>(items: &[T], start: usize, slot_of: &F) -> Option<usize>
where
    I: HintId,
    F: Fn(&T) -> Slot<I>,
{
    for (index, item) in items.iter().enumerate().skip(start) {
        match slot_of(item) {
            Slot::Visible(_) => return Some(index),
            Slot::Hidden(_) => continue,
            Slot::End => return None,
        }
    }
    None
}

fn position<T, I, F>(items: &[T], slot_of: &F, id: I) -> Option<usize>
where
    I: HintId,
    F: Fn(&T) -> Slot<I>,
{
    for (index, item) in items.iter().enumerate() {
        match slot_of(item).id() {
            Some(found) if found == id => return Some(index),
            Some(_) => continue,
            None => return None,
        }
    }
    None
}

/// Per-axis hints, one slot each so traversals on different axes never
/// disturb one another.
#[derive(Debug, Default)]
pub struct AxisHints {
    pub endpoints: parking_lot::Mutex<PositionHint>,
    pub clusters: parking_lot::Mutex<PositionHint>,
    pub attributes: parking_lot::Mutex<PositionHint>,
    pub accepted_commands: parking_lot::Mutex<PositionHint>,
    pub generated_commands: parking_lot::Mutex<PositionHint>,
    pub device_types: parking_lot::Mutex<PositionHint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARRAY: ArrayAnchor = ArrayAnchor::new(ArrayId::Endpoints, 0);
    const OTHER: ArrayAnchor = ArrayAnchor::new(ArrayId::DeviceTypes { endpoint: 0 }, 0);

    fn ids(slot: &u32) -> Slot<u32> {
        Slot::of(*slot)
    }

    fn walk(hint: &mut PositionHint, items: &[u32]) -> Vec<u32> {
        let mut out = Vec::new();
        let mut index = hint.first(ARRAY, Some(items), ids);
        while let Some(i) = index {
            out.push(items[i]);
            index = hint.next(ARRAY, Some(items), ids, items[i]);
        }
        out
    }

    #[test]
    fn test_first_edge_cases() {
        let mut hint = PositionHint::new();
        let empty: &[u32] = &[];
        let sentinel_first: &[u32] = &[u32::MAX, 1];
        let populated: &[u32] = &[7, 8];

        assert_eq!(hint.first::<u32, u32, _>(ARRAY, None, ids), None);
        assert_eq!(hint.first(ARRAY, Some(empty), ids), None);
        assert_eq!(hint.first(ARRAY, Some(sentinel_first), ids), None);
        assert_eq!(hint.first(ARRAY, Some(populated), ids), Some(0));
    }

    #[test]
    fn test_walk_stops_at_sentinel() {
        let mut hint = PositionHint::new();
        assert_eq!(walk(&mut hint, &[5, 3, 9, u32::MAX, 11]), vec![5, 3, 9]);
    }

    #[test]
    fn test_next_from_sentinel_is_empty() {
        let items: &[u32] = &[1, 2];
        let mut hint = PositionHint::new();
        assert_eq!(hint.next(ARRAY, Some(items), ids, u32::MAX), None);
        assert_eq!(hint.next::<u32, u32, _>(ARRAY, None, ids, 1), None);
    }

    #[test]
    fn test_next_unknown_previous() {
        let items: &[u32] = &[1, 2, 3];
        let terminated: &[u32] = &[1, u32::MAX, 3, 4];
        let mut hint = PositionHint::new();
        assert_eq!(hint.next(ARRAY, Some(items), ids, 42), None);
        // Ids past the sentinel are not part of the array
        assert_eq!(hint.next(ARRAY, Some(terminated), ids, 3), None);
    }

    #[test]
    fn test_warm_and_cold_hints_agree() {
        let items: &[u32] = &[10, 4, 7, 2, 99];
        let warm_walk = walk(&mut PositionHint::new(), items);

        let mut cold_walk = Vec::new();
        let mut current = PositionHint::new().first(ARRAY, Some(items), ids);
        while let Some(i) = current {
            cold_walk.push(items[i]);
            current = PositionHint::new().next(ARRAY, Some(items), ids, items[i]);
        }

        assert_eq!(warm_walk, cold_walk);
        assert_eq!(warm_walk, items.to_vec());
    }

    #[test]
    fn test_hidden_slots_skipped_but_resumable() {
        let items: &[(u16, bool)] = &[(1, true), (2, false), (3, true), (4, false)];
        let slot = |(id, visible): &(u16, bool)| {
            if *visible {
                Slot::Visible(*id)
            } else {
                Slot::Hidden(*id)
            }
        };
        let mut hint = PositionHint::new();
        assert_eq!(hint.first(ARRAY, Some(items), slot), Some(0));
        assert_eq!(hint.next(ARRAY, Some(items), slot, 1), Some(2));
        assert_eq!(hint.next(ARRAY, Some(items), slot, 3), None);
        // Resuming from a hidden element still works
        assert_eq!(hint.next(ARRAY, Some(items), slot, 2), Some(2));
        assert!(!hint.exists(ARRAY, Some(items), slot, 2));
        assert!(hint.exists(ARRAY, Some(items), slot, 3));
    }

    #[test]
    fn test_switching_arrays_invalidates() {
        let a: &[u32] = &[1, 2, 3];
        let b: &[u32] = &[3, 2, 1];
        let mut hint = PositionHint::new();
        assert_eq!(hint.first(ARRAY, Some(a), ids), Some(0));
        assert_eq!(hint.next(ARRAY, Some(a), ids, 1), Some(1));
        // Same previous id, different array: must be rescanned, not advanced
        assert_eq!(hint.next(OTHER, Some(b), ids, 2), Some(2));
        assert_eq!(hint.next(OTHER, Some(b), ids, 1), None);
    }

    #[test]
    fn test_stale_generation_forces_rescan() {
        let items: &[u32] = &[1, 2, 3];
        let mut hint = PositionHint::new();
        hint.first(ARRAY, Some(items), ids);

        let newer = ArrayAnchor::new(ArrayId::Endpoints, 1);
        assert_eq!(hint.next(newer, Some(items), ids, 1), Some(1));
        assert_eq!(hint.next(newer, Some(items), ids, 2), Some(2));
    }

    #[test]
    fn test_find() {
        let items: &[u32] = &[4, 5, 6];
        let mut hint = PositionHint::new();
        assert_eq!(hint.find(ARRAY, Some(items), ids, 6), Some(2));
        assert_eq!(hint.find(ARRAY, Some(items), ids, 6), Some(2));
        assert_eq!(hint.find(ARRAY, Some(items), ids, 4), Some(0));
        assert_eq!(hint.find(ARRAY, Some(items), ids, 1), None);
        assert_eq!(hint.find(ARRAY, Some(items), ids, u32::MAX), None);
        assert!(!hint.exists::<u32, u32, _>(ARRAY, None, ids, 4));
    }

    #[test]
    fn test_sequential_walk_never_rescans() {
        let items: Vec<u32> = (0..1000).collect();
        let mut hint = PositionHint::new();
        assert_eq!(walk(&mut hint, &items).len(), 1000);
        assert_eq!(hint.misses(), 0);

        // Past the end the hint still points at the last element
        assert_eq!(hint.find(ARRAY, Some(items.as_slice()), ids, 999), Some(999));
        assert_eq!(hint.misses(), 0);

        // A jump is a miss, then the walk resumes from there
        assert_eq!(hint.next(ARRAY, Some(items.as_slice()), ids, 10), Some(11));
        assert_eq!(hint.next(ARRAY, Some(items.as_slice()), ids, 11), Some(12));
        assert_eq!(hint.misses(), 1);
    }
}
