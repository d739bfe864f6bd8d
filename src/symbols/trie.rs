/// Arena-backed prefix trie over lowercased symbol names.
///
/// Nodes live in a `Vec` and link to each other by index, so removal never
/// has to reason about pointer validity: pruned nodes go on a free list and
/// get recycled by later inserts. Each terminal node holds the ids of every
/// symbol sharing that name.
use std::collections::{HashMap, HashSet};

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, NodeId>,
    ids: HashSet<String>,
}

#[derive(Debug)]
pub struct NameTrie {
    nodes: Vec<TrieNode>,
    free: Vec<NodeId>,
}

impl NameTrie {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            free: Vec::new(),
        }
    }

    /// Insert a symbol id under the given name. The name is lowercased by
    /// the caller; the trie stores it as-is.
    pub fn insert(&mut self, name: &str, id: &str) {
        let mut current = ROOT;
        for ch in name.chars() {
            current = match self.nodes[current].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.alloc_node();
                    self.nodes[current].children.insert(ch, next);
                    next
                }
            };
        }
        self.nodes[current].ids.insert(id.to_string());
    }

    /// Remove a symbol id from under the given name, pruning any node left
    /// with no ids and no children so churn does not grow the arena.
    pub fn remove(&mut self, name: &str, id: &str) {
        // Walk down recording the path so we can prune bottom-up.
        let mut path: Vec<(NodeId, char)> = Vec::with_capacity(name.chars().count());
        let mut current = ROOT;
        for ch in name.chars() {
            match self.nodes[current].children.get(&ch) {
                Some(&next) => {
                    path.push((current, ch));
                    current = next;
                }
                None => return,
            }
        }

        self.nodes[current].ids.remove(id);

        while let Some((parent, ch)) = path.pop() {
            let node = self.nodes[parent].children[&ch];
            if self.nodes[node].ids.is_empty() && self.nodes[node].children.is_empty() {
                self.nodes[parent].children.remove(&ch);
                self.nodes[node] = TrieNode::default();
                self.free.push(node);
            } else {
                break;
            }
        }
    }

    /// Collect ids of all names starting with `prefix`, up to `limit`.
    #[must_use]
    pub fn collect_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        let mut current = ROOT;
        for ch in prefix.chars() {
            match self.nodes[current].children.get(&ch) {
                Some(&next) => current = next,
                None => return Vec::new(),
            }
        }

        let mut out = Vec::new();
        self.collect_subtree(current, limit, &mut out);
        out
    }

    fn collect_subtree(&self, node: NodeId, limit: usize, out: &mut Vec<String>) {
        if out.len() >= limit {
            return;
        }

        let mut ids: Vec<&String> = self.nodes[node].ids.iter().collect();
        ids.sort();
        for id in ids {
            if out.len() >= limit {
                return;
            }
            out.push(id.clone());
        }

        // Deterministic traversal order regardless of hash-map layout.
        let mut children: Vec<(&char, &NodeId)> = self.nodes[node].children.iter().collect();
        children.sort_by_key(|(ch, _)| **ch);
        for (_, &child) in children {
            self.collect_subtree(child, limit, out);
        }
    }

    /// Number of live nodes (excluding the root and freed slots).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len() - 1
    }

    pub fn clear(&mut self) {
        self.nodes = vec![TrieNode::default()];
        self.free.clear();
    }

    fn alloc_node(&mut self) -> NodeId {
        match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.nodes.push(TrieNode::default());
                self.nodes.len() - 1
            }
        }
    }
}

impl Default for NameTrie {
    fn default() -> Self {
        Self::new()
    }
}
