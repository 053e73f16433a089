//! Records chosen for bulk operations.
//!
//! Select-all and clear act on the caller's visible universe (the filtered
//! grid), never on records the caller cannot see.

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct SelectionSet<T: Eq + Hash + Clone> {
    ids: HashSet<T>,
}

impl<T: Eq + Hash + Clone> Default for SelectionSet<T> {
    fn default() -> Self {
        Self {
            ids: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> SelectionSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, id: T) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn select(&mut self, id: T) {
        self.ids.insert(id);
    }

    pub fn deselect(&mut self, id: &T) {
        self.ids.remove(id);
    }

    /// Select every id in `universe`, unless all are already selected, in
    /// which case deselect them. An empty universe changes nothing.
    pub fn toggle_all(&mut self, universe: &[T]) {
        if self.is_all_selected(universe) {
            for id in universe {
                self.ids.remove(id);
            }
        } else {
            self.ids.extend(universe.iter().cloned());
        }
    }

    /// True when `universe` is non-empty and every id in it is selected.
    pub fn is_all_selected(&self, universe: &[T]) -> bool {
        !universe.is_empty() && universe.iter().all(|id| self.ids.contains(id))
    }

    /// Drop selected ids that are no longer visible.
    pub fn retain_visible(&mut self, universe: &[T]) {
        let visible: HashSet<&T> = universe.iter().collect();
        self.ids.retain(|id| visible.contains(id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn has(&self, id: &T) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.ids.iter()
    }
}

impl<T: Eq + Hash + Clone + Ord> SelectionSet<T> {
    /// Selected ids in ascending order, for deterministic dispatch.
    pub fn to_vec(&self) -> Vec<T> {
        let mut v: Vec<T> = self.ids.iter().cloned().collect();
        v.sort();
        v
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for SelectionSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
