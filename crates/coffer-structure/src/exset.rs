//! Exception-type sets over a class hierarchy.
//!
//! A [`Hierarchy`] interns catchable class names with their single
//! superclass link. An [`ExceptionSet`] is a downward-closed set of those
//! classes: membership of a type implies membership of every subtype in
//! the hierarchy. Sets are stored extensionally over the finite interned
//! universe, so union/intersection/difference are exact and the family of
//! sets forms a lattice.

use std::collections::HashMap;

/// Interned class handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(pub u32);

/// Single-inheritance class hierarchy for catchable types.
#[derive(Debug, Default)]
pub struct Hierarchy {
    names: Vec<String>,
    ids: HashMap<String, ClassId>,
    supers: Vec<Option<ClassId>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class under an optional superclass (which must already
    /// be registered). Re-adding a known name returns its existing id.
    pub fn add(&mut self, name: &str, super_: Option<ClassId>) -> ClassId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = ClassId(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        self.supers.push(super_);
        id
    }

    pub fn id(&self, name: &str) -> Option<ClassId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: ClassId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.supers[id.0 as usize]
    }

    /// `a` is `b` or a transitive subclass of `b`.
    pub fn is_subtype(&self, a: ClassId, b: ClassId) -> bool {
        let mut cur = Some(a);
        while let Some(c) = cur {
            if c == b {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// All registered classes at or below `top`.
    pub fn subtree(&self, top: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        (0..self.names.len() as u32)
            .map(ClassId)
            .filter(move |&c| self.is_subtype(c, top))
    }
}

/// A downward-closed set of catchable types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExceptionSet {
    members: std::collections::BTreeSet<ClassId>,
}

impl ExceptionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The full subtree rooted at `top`.
    pub fn from_top(hierarchy: &Hierarchy, top: ClassId) -> Self {
        Self {
            members: hierarchy.subtree(top).collect(),
        }
    }

    pub fn from_tops(hierarchy: &Hierarchy, tops: &[ClassId]) -> Self {
        let mut set = Self::empty();
        for &top in tops {
            set.members.extend(hierarchy.subtree(top));
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, class: ClassId) -> bool {
        self.members.contains(&class)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            members: self.members.union(&other.members).copied().collect(),
        }
    }

    pub fn union_with(&mut self, other: &Self) {
        self.members.extend(other.members.iter().copied());
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            members: self.members.intersection(&other.members).copied().collect(),
        }
    }

    pub fn difference(&self, other: &Self) -> Self {
        Self {
            members: self.members.difference(&other.members).copied().collect(),
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.members.is_disjoint(&other.members)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.members.is_subset(&other.members)
    }

    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.members.iter().copied()
    }

    /// Maximal representatives: members whose parent is not a member.
    pub fn tops(&self, hierarchy: &Hierarchy) -> Vec<ClassId> {
        self.members
            .iter()
            .copied()
            .filter(|&c| match hierarchy.parent(c) {
                Some(p) => !self.members.contains(&p),
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Hierarchy, ClassId, ClassId, ClassId, ClassId) {
        let mut h = Hierarchy::new();
        let throwable = h.add("java/lang/Throwable", None);
        let exception = h.add("java/lang/Exception", Some(throwable));
        let io = h.add("java/io/IOException", Some(exception));
        let eof = h.add("java/io/EOFException", Some(io));
        (h, throwable, exception, io, eof)
    }

    #[test]
    fn from_top_is_downward_closed() {
        let (h, _, exception, io, eof) = sample();
        let set = ExceptionSet::from_top(&h, exception);
        assert!(set.contains(exception));
        assert!(set.contains(io));
        assert!(set.contains(eof));
        assert!(!set.contains(h.id("java/lang/Throwable").unwrap()));
    }

    #[test]
    fn lattice_operations() {
        let (h, _, exception, io, _) = sample();
        let wide = ExceptionSet::from_top(&h, exception);
        let narrow = ExceptionSet::from_top(&h, io);
        assert!(narrow.is_subset(&wide));
        assert_eq!(narrow.union(&wide), wide);
        assert_eq!(narrow.intersection(&wide), narrow);
        let rest = wide.difference(&narrow);
        assert!(rest.contains(exception));
        assert!(!rest.contains(io));
        assert!(!rest.intersects(&narrow));
    }

    #[test]
    fn tops_are_maximal_members() {
        let (h, _, exception, io, _) = sample();
        let wide = ExceptionSet::from_top(&h, exception);
        assert_eq!(wide.tops(&h), vec![exception]);
        // Removing a subtree does not change the remaining maximum.
        let rest = wide.difference(&ExceptionSet::from_top(&h, io));
        assert_eq!(rest.tops(&h), vec![exception]);
    }
}
