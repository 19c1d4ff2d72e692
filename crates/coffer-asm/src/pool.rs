//! Constant-pool handle with labelled forward references.
//!
//! Wraps the interning pool from `coffer-classfile` and adds the label
//! table used by `.const` bindings. Label resolution threads a forbidden
//! path through recursive lookups; a label re-appearing on its own
//! resolution path is a recursive-pool-reference error naming the cycle.

use indexmap::IndexMap;
use std::collections::HashMap;

use coffer_classfile::{ConstPool, Entry};

use crate::ast::PoolRef;
use crate::error::{AsmError, AsmResult};

#[derive(Debug, Default)]
pub struct PoolHandle {
    pool: ConstPool,
    labels: IndexMap<String, PoolRef>,
    resolved: HashMap<String, u16>,
}

impl PoolHandle {
    pub fn new() -> Self {
        Self {
            pool: ConstPool::new(),
            labels: IndexMap::new(),
            resolved: HashMap::new(),
        }
    }

    /// Bind a label to a pool reference. A later binding for the same
    /// label replaces the earlier one.
    pub fn bind(&mut self, label: impl Into<String>, value: PoolRef) {
        self.labels.insert(label.into(), value);
    }

    pub fn intern(&mut self, entry: Entry) -> u16 {
        self.pool.intern(entry)
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        self.pool.utf8(s)
    }

    /// Resolve a label to a pool index. `forbidden` is the path of labels
    /// currently being resolved; re-entering one of them fails.
    pub fn resolve_label(
        &mut self,
        label: &str,
        forbidden: &mut Vec<String>,
    ) -> AsmResult<u16> {
        if forbidden.iter().any(|f| f == label) {
            let mut cycle = forbidden.clone();
            cycle.push(label.to_owned());
            return Err(AsmError::RecursivePoolReference { cycle });
        }
        if let Some(&index) = self.resolved.get(label) {
            return Ok(index);
        }
        let mut target = self
            .labels
            .get(label)
            .cloned()
            .ok_or_else(|| AsmError::UndefinedPoolLabel(label.to_owned()))?;

        forbidden.push(label.to_owned());
        let index = target.to_index_inner(self, forbidden)?;
        forbidden.pop();

        self.resolved.insert(label.to_owned(), index);
        Ok(index)
    }

    pub fn pool(&self) -> &ConstPool {
        &self.pool
    }

    pub fn into_pool(self) -> ConstPool {
        self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_chain_resolves_through() {
        let mut pool = PoolHandle::new();
        pool.bind("a", PoolRef::label("b"));
        pool.bind("b", PoolRef::utf8("hello"));
        let index = pool.resolve_label("a", &mut Vec::new()).unwrap();
        assert_eq!(index, 1);
        // Memoised on the handle side too.
        assert_eq!(pool.resolve_label("a", &mut Vec::new()).unwrap(), index);
    }

    #[test]
    fn label_cycle_is_reported_with_participants() {
        let mut pool = PoolHandle::new();
        pool.bind("a", PoolRef::label("b"));
        pool.bind("b", PoolRef::label("a"));
        let err = pool.resolve_label("a", &mut Vec::new()).unwrap_err();
        match err {
            AsmError::RecursivePoolReference { cycle } => {
                assert!(cycle.contains(&"a".to_owned()));
                assert!(cycle.contains(&"b".to_owned()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_label_errors() {
        let mut pool = PoolHandle::new();
        let err = pool.resolve_label("missing", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, AsmError::UndefinedPoolLabel(l) if l == "missing"));
    }
}
