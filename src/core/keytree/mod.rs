// src/core/keytree/mod.rs

//! The Key-Tree cache (KT): deduplicates and parent-validates configuration
//! nodes reported by drivers during audit or commit driver-result, so that a
//! single coherent subtree per `(controller, key-type path)` reaches LP/PP.
//!
//! Nodes are identified by the pair `(key_type, key)`, not `key` alone: two
//! different key types are free to reuse the same key string without
//! colliding. A `ROOT` sentinel node is seeded at construction, node identity
//! is resolved through a static `key_type -> parent key_type` table, and a
//! duplicate `(key_type, key)` insert discards-and-reuses the existing node
//! rather than erroring. Parent lookup fails closed (`OrphanChild`) when the
//! declared parent isn't present in the tree yet.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::errors::TcError;

pub const ROOT_KEY: &str = "ROOT";
const ROOT_TYPE: &str = "ROOT";

type NodeId = (String, String);

/// The static parent-type table. An illustrative sample of the full domain
/// table; unknown key types resolve to the root type so an unrecognized type
/// is still anchored somewhere instead of silently becoming un-appendable.
fn parent_type_of(key_type: &str) -> &'static str {
    match key_type {
        "CONTROLLER" => "ROOT",
        "VTN" => "ROOT",
        "VBRIDGE" => "VTN",
        "VBR_IF" => "VBRIDGE",
        _ => "ROOT",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyNode {
    pub key_type: String,
    pub key: String,
    pub parent_key: String,
    pub value: Vec<u8>,
    children: Vec<NodeId>,
}

impl KeyNode {
    pub fn new(key_type: impl Into<String>, key: impl Into<String>, parent_key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key_type: key_type.into(),
            key: key.into(),
            parent_key: parent_key.into(),
            value,
            children: Vec::new(),
        }
    }

    fn id(&self) -> NodeId {
        (self.key_type.clone(), self.key.clone())
    }
}

/// A rooted tree indexed by `(key_type, key)`. Single-writer: one coordinator
/// run owns the tree for the duration of a commit or audit, then calls
/// `clear()`.
#[derive(Debug)]
pub struct KeyTree {
    nodes: HashMap<NodeId, KeyNode>,
    /// key_type -> ordered keys of that type, insertion order preserved so
    /// `traverse()` can reproduce a stable depth-first pre-order walk.
    by_type: HashMap<String, Vec<String>>,
    insertion_order: Vec<NodeId>,
}

impl Default for KeyTree {
    fn default() -> Self {
        Self::new()
    }
}

fn root_id() -> NodeId {
    (ROOT_TYPE.to_string(), ROOT_KEY.to_string())
}

impl KeyTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(root_id(), KeyNode::new(ROOT_TYPE, ROOT_KEY, "", Vec::new()));
        Self {
            nodes,
            by_type: HashMap::new(),
            insertion_order: vec![root_id()],
        }
    }

    /// Inserts `node`. If `(key_type, key)` is already present, the incoming
    /// node is discarded and the existing one returned unchanged; otherwise
    /// the node is attached under its parent and indexed. Fails `OrphanChild`
    /// if the parent named by `node.parent_key` doesn't exist under the
    /// expected parent type, and reports a type mismatch distinctly when a
    /// node with that key exists but under a different type.
    pub fn insert(&mut self, node: KeyNode) -> Result<KeyNode, TcError> {
        if self.is_already_present(&node.key_type, &node.key) {
            return Ok(self.nodes[&node.id()].clone());
        }

        let parent_id: NodeId = if node.key_type == ROOT_TYPE {
            root_id()
        } else {
            (parent_type_of(&node.key_type).to_string(), node.parent_key.clone())
        };

        if !self.nodes.contains_key(&parent_id) {
            let found_type = self
                .nodes
                .keys()
                .find(|(_, key)| key == &node.parent_key)
                .map(|(key_type, _)| key_type.clone());
            return Err(match found_type {
                Some(found_type) => TcError::InvalidKeyType(format!(
                    "key type {} expects parent type {}, found {}",
                    node.key_type, parent_id.0, found_type
                )),
                None => TcError::InvalidKeyType(format!(
                    "orphan child: parent key '{}' not present for {}/{}",
                    node.parent_key, node.key_type, node.key
                )),
            });
        }

        self.nodes.get_mut(&parent_id).unwrap().children.push(node.id());
        self.by_type
            .entry(node.key_type.clone())
            .or_default()
            .push(node.key.clone());
        let id = node.id();
        self.insertion_order.push(id.clone());

        let inserted = node.clone();
        self.nodes.insert(id, node);
        Ok(inserted)
    }

    pub fn lookup(&self, key_type: &str, key: &str) -> Option<&KeyNode> {
        self.nodes.get(&(key_type.to_string(), key.to_string()))
    }

    pub fn is_already_present(&self, key_type: &str, key: &str) -> bool {
        self.nodes.contains_key(&(key_type.to_string(), key.to_string()))
    }

    /// Depth-first pre-order traversal starting at `ROOT`, siblings in
    /// insertion order.
    pub fn traverse(&self) -> Vec<&KeyNode> {
        let mut out = Vec::new();
        self.visit(&root_id(), &mut out);
        out
    }

    fn visit<'a>(&'a self, id: &NodeId, out: &mut Vec<&'a KeyNode>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if *id != root_id() {
            out.push(node);
        }
        for child in &node.children {
            self.visit(child, out);
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_type.clear();
        self.insertion_order.clear();
        self.nodes.insert(root_id(), KeyNode::new(ROOT_TYPE, ROOT_KEY, "", Vec::new()));
        self.insertion_order.push(root_id());
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - 1 // exclude the ROOT sentinel
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_traverse_preorder() {
        let mut kt = KeyTree::new();
        kt.insert(KeyNode::new("VTN", "v1", ROOT_KEY, vec![])).unwrap();
        kt.insert(KeyNode::new("VBRIDGE", "b1", "v1", vec![])).unwrap();
        let order: Vec<_> = kt.traverse().into_iter().map(|n| n.key.clone()).collect();
        assert_eq!(order, vec!["v1".to_string(), "b1".to_string()]);
    }

    #[test]
    fn duplicate_insert_discards_incoming_node() {
        let mut kt = KeyTree::new();
        kt.insert(KeyNode::new("VTN", "v1", ROOT_KEY, vec![1])).unwrap();
        let returned = kt.insert(KeyNode::new("VTN", "v1", ROOT_KEY, vec![2])).unwrap();
        assert_eq!(returned.value, vec![1]);
        assert_eq!(kt.len(), 1);
    }

    #[test]
    fn orphan_child_is_rejected() {
        let mut kt = KeyTree::new();
        let err = kt
            .insert(KeyNode::new("VBRIDGE", "b1", "v-missing", vec![]))
            .unwrap_err();
        assert!(matches!(err, TcError::InvalidKeyType(_)));
    }

    #[test]
    fn audit_duplicate_stream_collapses_to_two_nodes() {
        let mut kt = KeyTree::new();
        kt.insert(KeyNode::new("VTN", "v1", ROOT_KEY, vec![])).unwrap();
        kt.insert(KeyNode::new("VBRIDGE", "b1", "v1", vec![])).unwrap();
        kt.insert(KeyNode::new("VBRIDGE", "b1", "v1", vec![])).unwrap();
        assert_eq!(kt.len(), 2);
    }

    #[test]
    fn clear_drops_everything_but_root() {
        let mut kt = KeyTree::new();
        kt.insert(KeyNode::new("VTN", "v1", ROOT_KEY, vec![])).unwrap();
        kt.clear();
        assert!(kt.is_empty());
        assert!(kt.traverse().is_empty());
    }

    #[test]
    fn distinct_key_types_sharing_a_key_string_both_survive() {
        let mut kt = KeyTree::new();
        kt.insert(KeyNode::new("VTN", "ab", ROOT_KEY, vec![1])).unwrap();
        let inserted = kt
            .insert(KeyNode::new("CONTROLLER", "ab", ROOT_KEY, vec![2]))
            .unwrap();
        assert_eq!(inserted.value, vec![2]);
        assert_eq!(kt.len(), 2);
        assert_eq!(kt.lookup("VTN", "ab").unwrap().value, vec![1]);
        assert_eq!(kt.lookup("CONTROLLER", "ab").unwrap().value, vec![2]);
    }
}
