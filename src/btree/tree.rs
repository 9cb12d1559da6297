//! B+ tree over an arena of nodes

use std::fmt::Write as _;

use crate::config::MIN_BTREE_ORDER;
use crate::error::{CellarError, Result};

use super::node::{InternalNode, LeafNode, Node, NodeId};

/// Ordered `key → offset` index
///
/// Every node holds at most `order - 1` keys. Full nodes are split on the
/// way down during insert, so an insert never has to walk back up.
#[derive(Debug, Clone)]
pub struct BPlusTree {
    order: usize,
    nodes: Vec<Node>,
    root: NodeId,
    len: usize,
}

impl BPlusTree {
    /// Create an empty tree whose root is a single empty leaf
    ///
    /// Orders below the minimum are raised to it.
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(MIN_BTREE_ORDER),
            nodes: vec![Node::Leaf(LeafNode::default())],
            root: 0,
            len: 0,
        }
    }

    /// Build a tree by inserting pairs one by one
    pub fn from_entries(order: usize, entries: impl IntoIterator<Item = (u32, u64)>) -> Result<Self> {
        let mut tree = Self::new(order);
        for (key, offset) in entries {
            tree.insert(key, offset)?;
        }
        Ok(tree)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every node and start over with an empty root leaf
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::Leaf(LeafNode::default()));
        self.root = 0;
        self.len = 0;
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Insert a new key. Inserting a key that is already present is an error.
    pub fn insert(&mut self, key: u32, offset: u64) -> Result<()> {
        if self.search(key).is_some() {
            return Err(CellarError::duplicate("index", key));
        }

        if self.is_full(self.root) {
            let old_root = self.root;
            let new_root = self.alloc(Node::Internal(InternalNode {
                keys: Vec::new(),
                children: vec![old_root],
            }));
            self.root = new_root;
            self.split_child(new_root, 0);
        }

        let mut current = self.root;
        loop {
            let (idx, child) = match &self.nodes[current] {
                Node::Leaf(_) => break,
                Node::Internal(node) => {
                    let idx = node.child_index(key);
                    (idx, node.children[idx])
                }
            };

            current = if self.is_full(child) {
                let (separator, sibling) = self.split_child(current, idx);
                if key >= separator {
                    sibling
                } else {
                    child
                }
            } else {
                child
            };
        }

        if let Node::Leaf(leaf) = &mut self.nodes[current] {
            let pos = leaf.entries.partition_point(|(k, _)| *k < key);
            leaf.entries.insert(pos, (key, offset));
            self.len += 1;
        }
        Ok(())
    }

    /// Offset stored for `key`
    pub fn search(&self, key: u32) -> Option<u64> {
        match &self.nodes[self.find_leaf(key)] {
            Node::Leaf(leaf) => leaf
                .entries
                .binary_search_by_key(&key, |(k, _)| *k)
                .ok()
                .map(|pos| leaf.entries[pos].1),
            Node::Internal(_) => None,
        }
    }

    /// Remove `key`, returning the offset it pointed at
    ///
    /// The leaf may underflow; nodes are never merged.
    pub fn delete(&mut self, key: u32) -> Option<u64> {
        let leaf_id = self.find_leaf(key);
        let Node::Leaf(leaf) = &mut self.nodes[leaf_id] else {
            return None;
        };

        let pos = leaf.entries.binary_search_by_key(&key, |(k, _)| *k).ok()?;
        let (_, offset) = leaf.entries.remove(pos);
        self.len -= 1;
        Some(offset)
    }

    /// All pairs in ascending key order
    pub fn get_all(&self) -> Vec<(u32, u64)> {
        self.iter().collect()
    }

    /// Walk the leaf chain from the leftmost leaf
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            nodes: &self.nodes,
            leaf: Some(self.leftmost_leaf()),
            pos: 0,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Levels from root to leaves (1 for a lone root leaf)
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(node) = &self.nodes[current] {
            current = node.children[0];
            height += 1;
        }
        height
    }

    /// Key count of every leaf, in chain order
    pub fn leaf_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut leaf = Some(self.leftmost_leaf());
        while let Some(id) = leaf {
            match &self.nodes[id] {
                Node::Leaf(node) => {
                    sizes.push(node.entries.len());
                    leaf = node.next;
                }
                Node::Internal(_) => break,
            }
        }
        sizes
    }

    /// Human-readable dump, one line per level
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "B+ tree: order={} keys={} height={} nodes={}",
            self.order,
            self.len,
            self.height(),
            self.nodes.len()
        );

        let mut level = vec![self.root];
        let mut depth = 0;
        while !level.is_empty() {
            let _ = write!(out, "L{}:", depth);
            let mut next_level = Vec::new();
            for id in &level {
                match &self.nodes[*id] {
                    Node::Internal(node) => {
                        let keys: Vec<String> = node.keys.iter().map(|k| k.to_string()).collect();
                        let _ = write!(out, " [{}]", keys.join(" | "));
                        next_level.extend_from_slice(&node.children);
                    }
                    Node::Leaf(leaf) => {
                        let entries: Vec<String> = leaf
                            .entries
                            .iter()
                            .map(|(k, off)| format!("{}@{}", k, off))
                            .collect();
                        let _ = write!(out, " {{{}}}", entries.join(", "));
                        if leaf.next.is_some() {
                            out.push_str(" ->");
                        }
                    }
                }
            }
            out.push('\n');
            level = next_level;
            depth += 1;
        }
        out
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn is_full(&self, id: NodeId) -> bool {
        self.nodes[id].key_count() >= self.order - 1
    }

    fn find_leaf(&self, key: u32) -> NodeId {
        let mut current = self.root;
        while let Node::Internal(node) = &self.nodes[current] {
            current = node.children[node.child_index(key)];
        }
        current
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut current = self.root;
        while let Node::Internal(node) = &self.nodes[current] {
            current = node.children[0];
        }
        current
    }

    /// Split the full child at `idx` of `parent`
    ///
    /// Leaf: the upper half moves to a new right sibling that is linked into
    /// the leaf chain; its first key is copied up. Internal: the median key
    /// moves up and the children are divided around it. Returns the
    /// separator pushed into `parent` and the new sibling's id.
    fn split_child(&mut self, parent: NodeId, idx: usize) -> (u32, NodeId) {
        let child = match &self.nodes[parent] {
            Node::Internal(node) => node.children[idx],
            Node::Leaf(_) => unreachable!("split_child called on a leaf parent"),
        };
        let sibling_id = self.nodes.len();

        let (separator, sibling) = match &mut self.nodes[child] {
            Node::Leaf(leaf) => {
                let mid = leaf.entries.len() / 2;
                let right = LeafNode {
                    entries: leaf.entries.split_off(mid),
                    next: leaf.next,
                };
                leaf.next = Some(sibling_id);
                (right.entries[0].0, Node::Leaf(right))
            }
            Node::Internal(node) => {
                let mid = node.keys.len() / 2;
                let separator = node.keys[mid];
                let right = InternalNode {
                    keys: node.keys.split_off(mid + 1),
                    children: node.children.split_off(mid + 1),
                };
                node.keys.truncate(mid);
                (separator, Node::Internal(right))
            }
        };
        self.nodes.push(sibling);

        if let Node::Internal(node) = &mut self.nodes[parent] {
            node.keys.insert(idx, separator);
            node.children.insert(idx + 1, sibling_id);
        }
        (separator, sibling_id)
    }
}

/// Ordered iterator over `(key, offset)` pairs
pub struct Iter<'a> {
    nodes: &'a [Node],
    leaf: Option<NodeId>,
    pos: usize,
}

impl Iterator for Iter<'_> {
    type Item = (u32, u64);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Node::Leaf(leaf) = &self.nodes[self.leaf?] else {
                return None;
            };

            if let Some(entry) = leaf.entries.get(self.pos) {
                self.pos += 1;
                return Some(*entry);
            }
            self.leaf = leaf.next;
            self.pos = 0;
        }
    }
}
