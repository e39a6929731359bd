// SPDX-License-Identifier: GPL-3.0-only

//! Mapping between device stream identifiers and dense session-local indices
//!
//! The device hands out opaque stream ids that are neither contiguous nor
//! stable across use-case changes. Publishers, parameters and cached
//! exposure state are all indexed by position in the device's enumeration
//! order instead, and this map is the single source of truth for that
//! correlation. Every use-case switch rebuilds it wholesale; lookups with an
//! id from a stale generation fail rather than silently returning a wrong
//! index.

use std::collections::HashMap;

use crate::device::StreamId;
use crate::errors::{BridgeError, BridgeResult};

#[derive(Debug, Default)]
pub struct StreamIndexMap {
    indices: HashMap<StreamId, usize>,
    ids: Vec<StreamId>,
    generation: u64,
}

impl StreamIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mapping with a freshly enumerated stream set.
    ///
    /// Index = position in `ids`. Discards the previous generation entirely.
    pub fn rebuild(&mut self, ids: Vec<StreamId>) {
        self.indices = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        self.ids = ids;
        self.generation += 1;
    }

    /// Dense index for a stream id of the current generation
    pub fn lookup(&self, id: StreamId) -> BridgeResult<usize> {
        self.indices
            .get(&id)
            .copied()
            .ok_or(BridgeError::StaleStream(id))
    }

    /// Stream id at a dense index, if the index is valid
    pub fn id_at(&self, index: usize) -> Option<StreamId> {
        self.ids.get(index).copied()
    }

    /// Stream ids in enumeration order
    pub fn ids(&self) -> &[StreamId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Incremented on every rebuild; diagnostics only
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_assigns_enumeration_order() {
        let mut map = StreamIndexMap::new();
        map.rebuild(vec![StreamId(0xB002), StreamId(0xA001), StreamId(0x0003)]);

        assert_eq!(map.len(), 3);
        assert_eq!(map.lookup(StreamId(0xB002)).unwrap(), 0);
        assert_eq!(map.lookup(StreamId(0xA001)).unwrap(), 1);
        assert_eq!(map.lookup(StreamId(0x0003)).unwrap(), 2);
        assert_eq!(map.id_at(1), Some(StreamId(0xA001)));
    }

    #[test]
    fn test_stale_id_fails_after_rebuild() {
        let mut map = StreamIndexMap::new();
        map.rebuild(vec![StreamId(1), StreamId(2)]);
        assert!(map.lookup(StreamId(2)).is_ok());

        map.rebuild(vec![StreamId(7)]);
        assert!(matches!(
            map.lookup(StreamId(2)),
            Err(BridgeError::StaleStream(StreamId(2)))
        ));
        assert_eq!(map.lookup(StreamId(7)).unwrap(), 0);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_generation_counter() {
        let mut map = StreamIndexMap::new();
        assert_eq!(map.generation(), 0);
        map.rebuild(vec![StreamId(1)]);
        map.rebuild(vec![StreamId(1)]);
        assert_eq!(map.generation(), 2);
    }
}
