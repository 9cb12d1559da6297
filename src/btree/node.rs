//! Arena node types

/// Index of a node inside the tree's arena
pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// Sorted `(key, offset)` pairs plus a link to the next leaf
#[derive(Debug, Clone, Default)]
pub(crate) struct LeafNode {
    pub(crate) entries: Vec<(u32, u64)>,
    pub(crate) next: Option<NodeId>,
}

/// `keys.len() + 1` children; child `i` holds keys in `[keys[i-1], keys[i])`
#[derive(Debug, Clone, Default)]
pub(crate) struct InternalNode {
    pub(crate) keys: Vec<u32>,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.entries.len(),
            Node::Internal(node) => node.keys.len(),
        }
    }
}

impl InternalNode {
    /// Child to descend into: the first key strictly greater than `key`
    /// selects it.
    pub(crate) fn child_index(&self, key: u32) -> usize {
        self.keys.partition_point(|k| *k <= key)
    }
}
