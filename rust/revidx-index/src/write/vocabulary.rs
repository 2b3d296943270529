use ahash::AHashSet;
use revidx_common::{Result, error::Error};

/// An immutable, sorted set of distinct byte strings.
///
/// The identifier of an item is its rank in byte-lexicographic order, so ids are
/// dense in `[0, len)` and ascending ids enumerate the items in dictionary order.
/// Built once after vocabulary discovery and then shared read-only by all workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    items: Vec<Vec<u8>>,
}

impl Vocabulary {
    /// Creates a vocabulary from the union of the given sets.
    pub fn from_sets(sets: impl IntoIterator<Item = AHashSet<Vec<u8>>>) -> Result<Vocabulary> {
        let mut merged = AHashSet::new();
        for set in sets {
            if merged.len() < set.len() {
                let smaller = std::mem::replace(&mut merged, set);
                merged.extend(smaller);
            } else {
                merged.extend(set);
            }
        }
        let mut items = merged.into_iter().collect::<Vec<_>>();
        items.sort_unstable();
        if u32::try_from(items.len()).is_err() {
            return Err(Error::invalid_operation("vocabulary exceeds u32 id space"));
        }
        Ok(Vocabulary { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up the id of `item`.
    pub fn id_of(&self, item: &[u8]) -> Option<u32> {
        self.items
            .binary_search_by(|probe| probe.as_slice().cmp(item))
            .ok()
            .map(|pos| pos as u32)
    }

    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.items.get(id as usize).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.items.iter().map(Vec::as_slice)
    }
}
