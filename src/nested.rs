//! Auto-vivifying nested map
//!
//! [`NestedMap`] stores values under sequences of keys, creating intermediate
//! levels on demand. It is used to index CMIP5 files by
//! variable / table / model / experiment / ensemble, but is generic over key
//! and value types.
//!
//! ```rust
//! use cmip5::nested::NestedMap;
//!
//! let mut map: NestedMap<&str, bool> = NestedMap::new();
//! map.set(&["a", "b", "c", "d"], true).unwrap();
//! map.set(&["x", "y"], false).unwrap();
//! assert_eq!(map.depth(), 4);
//! assert_eq!(map.size(), 2);
//! ```

use crate::errors::{Cmip5Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// A node is either a stored value or another level of the map
#[derive(Debug, Clone, PartialEq)]
pub enum Node<K: Ord, V> {
    Leaf(V),
    Branch(NestedMap<K, V>),
}

impl<K: Ord, V> Node<K, V> {
    pub fn as_leaf(&self) -> Option<&V> {
        match self {
            Node::Leaf(v) => Some(v),
            Node::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&NestedMap<K, V>> {
        match self {
            Node::Branch(m) => Some(m),
            Node::Leaf(_) => None,
        }
    }
}

/// Restriction on the keys traversed at one level of a walk
#[derive(Debug, Clone, PartialEq)]
pub enum KeySubset<K> {
    /// Visit whichever of these keys are present
    Any(Vec<K>),
    /// Visit these keys only if every one of them is present
    All(Vec<K>),
}

impl<K: Ord> KeySubset<K> {
    fn keys(&self) -> &[K] {
        match self {
            KeySubset::Any(keys) | KeySubset::All(keys) => keys,
        }
    }
}

/// Per-level subsets, keyed by depth (0 = top level)
pub type Subset<K> = BTreeMap<usize, KeySubset<K>>;

#[derive(Debug, Clone, PartialEq)]
pub struct NestedMap<K: Ord, V> {
    entries: BTreeMap<K, Node<K, V>>,
}

impl<K: Ord, V> Default for NestedMap<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K, V> NestedMap<K, V>
where
    K: Ord + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Node<K, V>)> {
        self.entries.iter()
    }

    /// Return the map stored under `keys`, creating every missing level.
    ///
    /// A leaf found on the way is replaced by a new level.
    pub fn entry_path(&mut self, keys: &[K]) -> &mut NestedMap<K, V> {
        let mut node = self;
        for key in keys {
            let slot = node
                .entries
                .entry(key.clone())
                .or_insert_with(|| Node::Branch(NestedMap::new()));
            if let Node::Leaf(_) = slot {
                *slot = Node::Branch(NestedMap::new());
            }
            node = match slot {
                Node::Branch(map) => map,
                Node::Leaf(_) => unreachable!("leaf replaced by branch above"),
            };
        }
        node
    }

    /// Store `value` under the key sequence, creating intermediate levels
    pub fn set(&mut self, keys: &[K], value: V) -> Result<()> {
        let (last, parents) = keys
            .split_last()
            .ok_or_else(|| Cmip5Error::Generic("Cannot set a value under an empty key sequence".to_string()))?;
        self.entry_path(parents)
            .entries
            .insert(last.clone(), Node::Leaf(value));
        Ok(())
    }

    /// Return the node stored under the key sequence
    pub fn get(&self, keys: &[K]) -> Result<&Node<K, V>> {
        let (first, rest) = keys
            .split_first()
            .ok_or_else(|| Cmip5Error::Generic("Cannot look up an empty key sequence".to_string()))?;
        let mut node = self.entries.get(first).ok_or_else(|| missing(first))?;
        for key in rest {
            node = node
                .as_branch()
                .and_then(|map| map.entries.get(key))
                .ok_or_else(|| missing(key))?;
        }
        Ok(node)
    }

    /// Return the value stored under the key sequence
    pub fn get_leaf(&self, keys: &[K]) -> Result<&V> {
        self.get(keys)?.as_leaf().ok_or_else(|| {
            Cmip5Error::Generic(format!("Keys {:?} lead to a nested level, not a value", keys))
        })
    }

    pub fn get_leaf_mut(&mut self, keys: &[K]) -> Option<&mut V> {
        let (last, parents) = keys.split_last()?;
        let mut node = self;
        for key in parents {
            node = match node.entries.get_mut(key)? {
                Node::Branch(map) => map,
                Node::Leaf(_) => return None,
            };
        }
        match node.entries.get_mut(last)? {
            Node::Leaf(v) => Some(v),
            Node::Branch(_) => None,
        }
    }

    /// All keys found at the given level
    pub fn keys_at_level(&self, level: usize) -> BTreeSet<K> {
        if level == 0 {
            return self.entries.keys().cloned().collect();
        }
        self.entries
            .values()
            .filter_map(Node::as_branch)
            .flat_map(|map| map.keys_at_level(level - 1))
            .collect()
    }

    /// Maximum number of levels
    pub fn depth(&self) -> usize {
        let mut level = 0;
        while !self.keys_at_level(level).is_empty() {
            level += 1;
        }
        level
    }

    /// Total number of values stored
    pub fn size(&self) -> usize {
        self.walk(&Subset::new()).len()
    }

    /// Every `(key sequence, value)` pair, depth first in key order.
    ///
    /// `subset` restricts the keys visited at given levels; see [`KeySubset`].
    pub fn walk(&self, subset: &Subset<K>) -> Vec<(Vec<K>, &V)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.walk_into(subset, 0, &mut prefix, &mut out);
        out
    }

    fn walk_into<'a>(
        &'a self,
        subset: &Subset<K>,
        level: usize,
        prefix: &mut Vec<K>,
        out: &mut Vec<(Vec<K>, &'a V)>,
    ) {
        let valid = subset.get(&level);
        if let Some(KeySubset::All(required)) = valid {
            if !required.iter().all(|k| self.entries.contains_key(k)) {
                return;
            }
        }

        for (key, node) in &self.entries {
            if let Some(valid) = valid {
                if !valid.keys().contains(key) {
                    continue;
                }
            }
            prefix.push(key.clone());
            match node {
                Node::Leaf(value) => out.push((prefix.clone(), value)),
                Node::Branch(map) => map.walk_into(subset, level + 1, prefix, out),
            }
            prefix.pop();
        }
    }

    /// Insert every value of `other` at the same key sequence
    pub fn update(&mut self, other: &NestedMap<K, V>) -> Result<()>
    where
        V: Clone,
    {
        for (keys, value) in other.walk(&Subset::new()) {
            self.set(&keys, value.clone())?;
        }
        Ok(())
    }
}

impl<K, V> NestedMap<K, V>
where
    K: Ord + Clone + Debug,
    V: Clone,
{
    /// Deep copy of the entries selected by `subset`
    pub fn copy(&self, subset: &Subset<K>) -> Result<Self> {
        let mut out = Self::new();
        for (keys, value) in self.walk(subset) {
            out.set(&keys, value.clone())?;
        }
        Ok(out)
    }
}

fn missing<K: Debug>(key: &K) -> Cmip5Error {
    Cmip5Error::KeyNotFound {
        key: format!("{:?}", key),
    }
}
