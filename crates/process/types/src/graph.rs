//! The node arena shared by dependency and control-flow graphs
//!
//! Nodes are addressed by [`NodeId`] (an arena slot). Removing a node
//! leaves a tombstone so identifiers held elsewhere never alias a
//! different node. Adjacency is kept on both ends:
//! `child ∈ a.children ⇔ a ∈ child.parents`.

use crate::{Element, ElementId, ElementKind, GatewayKind, GatewayRole, ProcessError, ProcessResult, TaskTag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

static NO_NEIGHBOURS: BTreeSet<NodeId> = BTreeSet::new();

// ── Identifiers ──────────────────────────────────────────────────────

/// Arena index of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ── Node ─────────────────────────────────────────────────────────────

/// A graph node: one wrapped element plus its adjacency
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    element: Element,
    children: BTreeSet<NodeId>,
    parents: BTreeSet<NodeId>,
}

impl Node {
    fn new(element: Element) -> Self {
        Self {
            element,
            children: BTreeSet::new(),
            parents: BTreeSet::new(),
        }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    pub fn parents(&self) -> &BTreeSet<NodeId> {
        &self.parents
    }
}

/// How a structural copy treats the wrapped elements
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyMode {
    /// Reuse the element identity
    Weak,
    /// Clone the element under a fresh identity
    Deep,
}

/// Old node → new node correspondence produced by a structural copy
pub type NodeMap = BTreeMap<NodeId, NodeId>;

// ── Graph ────────────────────────────────────────────────────────────

/// A mutable directed graph of process elements
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    next_element: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Node management ──────────────────────────────────────────────

    /// Add a node wrapping a fresh element of the given kind
    pub fn add(&mut self, kind: ElementKind) -> NodeId {
        let element = Element::new(self.allocate_element_id(), kind);
        self.add_element(element)
    }

    /// Add a node wrapping an existing element (shared identity)
    pub fn add_element(&mut self, element: Element) -> NodeId {
        if element.id.0 >= self.next_element {
            self.next_element = element.id.0 + 1;
        }
        self.nodes.push(Some(Node::new(element)));
        NodeId(self.nodes.len() - 1)
    }

    /// Add a declared activity
    pub fn add_task(&mut self, name: impl Into<String>) -> NodeId {
        self.add(ElementKind::Task {
            name: name.into(),
            tag: TaskTag::Activity,
        })
    }

    /// Add an internal placeholder task
    pub fn add_placeholder(&mut self, name: impl Into<String>, tag: TaskTag) -> NodeId {
        self.add(ElementKind::Task {
            name: name.into(),
            tag,
        })
    }

    pub fn add_gateway(&mut self, kind: GatewayKind, role: GatewayRole) -> NodeId {
        self.add(ElementKind::Gateway { kind, role })
    }

    pub fn add_start(&mut self) -> NodeId {
        self.add(ElementKind::Start)
    }

    pub fn add_end(&mut self) -> NodeId {
        self.add(ElementKind::End)
    }

    /// Remove a node and every edge touching it
    pub fn remove(&mut self, id: NodeId) -> ProcessResult<Element> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(ProcessError::NodeNotFound(id))?;
        for child in &node.children {
            if let Some(Some(c)) = self.nodes.get_mut(child.0) {
                c.parents.remove(&id);
            }
        }
        for parent in &node.parents {
            if let Some(Some(p)) = self.nodes.get_mut(parent.0) {
                p.children.remove(&id);
            }
        }
        Ok(node.element)
    }

    fn allocate_element_id(&mut self) -> ElementId {
        let id = ElementId(self.next_element);
        self.next_element += 1;
        id
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).map(Node::element)
    }

    /// Whether `id` is a gateway of the given kind and role
    pub fn is_gateway_of(&self, id: NodeId, kind: GatewayKind, role: GatewayRole) -> bool {
        self.element(id)
            .map(|e| e.is_gateway_of(kind, role))
            .unwrap_or(false)
    }

    /// Replace the kind of a node's element in place, keeping its identity
    pub fn set_kind(&mut self, id: NodeId, kind: ElementKind) -> ProcessResult<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ProcessError::NodeNotFound(id))?;
        node.element.kind = kind;
        Ok(())
    }

    /// Children of a node (empty for unknown nodes)
    pub fn children(&self, id: NodeId) -> &BTreeSet<NodeId> {
        self.node(id).map(Node::children).unwrap_or(&NO_NEIGHBOURS)
    }

    /// Parents of a node (empty for unknown nodes)
    pub fn parents(&self, id: NodeId) -> &BTreeSet<NodeId> {
        self.node(id).map(Node::parents).unwrap_or(&NO_NEIGHBOURS)
    }

    /// Live node identifiers in arena order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|_| NodeId(i)))
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All edges in (parent, child) order
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.node_ids()
            .flat_map(|id| self.children(id).iter().map(move |c| (id, *c)))
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.node_ids().map(|id| self.children(id).len()).sum()
    }

    /// First declared activity with the given name
    pub fn find_task(&self, name: &str) -> Option<NodeId> {
        self.node_ids()
            .find(|id| self.element(*id).and_then(Element::activity_name) == Some(name))
    }

    /// First node wrapping the given element identity
    pub fn find_element(&self, element: ElementId) -> Option<NodeId> {
        self.node_ids()
            .find(|id| self.element(*id).map(|e| e.id) == Some(element))
    }

    /// Nodes without parents
    pub fn sources(&self) -> BTreeSet<NodeId> {
        self.node_ids().filter(|id| self.parents(*id).is_empty()).collect()
    }

    /// Nodes without children
    pub fn sinks(&self) -> BTreeSet<NodeId> {
        self.node_ids().filter(|id| self.children(*id).is_empty()).collect()
    }

    /// Label used in diagnostics: the task name or the gateway tag
    pub fn label(&self, id: NodeId) -> String {
        self.element(id)
            .map(|e| e.to_string())
            .unwrap_or_else(|| id.to_string())
    }

    // ── Edges ────────────────────────────────────────────────────────

    /// Link `from → to`, updating both sides. Returns false if the edge existed.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> ProcessResult<bool> {
        if !self.contains(from) || !self.contains(to) {
            return Err(ProcessError::InvalidLink { from, to });
        }
        let added = self.node_mut(from).children.insert(to);
        self.node_mut(to).parents.insert(from);
        Ok(added)
    }

    /// Remove the edge `from → to`. Returns false if there was none.
    pub fn unlink(&mut self, from: NodeId, to: NodeId) -> bool {
        let removed = match self.nodes.get_mut(from.0) {
            Some(Some(node)) => node.children.remove(&to),
            _ => false,
        };
        if let Some(Some(node)) = self.nodes.get_mut(to.0) {
            node.parents.remove(&from);
        }
        removed
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.children(from).contains(&to)
    }

    /// Sever every outgoing edge of `node`. Returns the former children.
    pub fn cut(&mut self, node: NodeId) -> BTreeSet<NodeId> {
        let children = self.children(node).clone();
        for child in &children {
            self.unlink(node, *child);
        }
        children
    }

    /// Move every child of `from` under `to`
    pub fn move_children(&mut self, from: NodeId, to: NodeId) -> ProcessResult<()> {
        for child in self.cut(from) {
            self.link(to, child)?;
        }
        Ok(())
    }

    /// Move every parent of `from` onto `to`
    pub fn move_parents(&mut self, from: NodeId, to: NodeId) -> ProcessResult<()> {
        let parents = self.parents(from).clone();
        for parent in parents {
            self.unlink(parent, from);
            self.link(parent, to)?;
        }
        Ok(())
    }

    /// Insert a new node between `node` and all of its children
    pub fn insert_after(&mut self, node: NodeId, kind: ElementKind) -> ProcessResult<NodeId> {
        if !self.contains(node) {
            return Err(ProcessError::NodeNotFound(node));
        }
        let inserted = self.add(kind);
        self.move_children(node, inserted)?;
        self.link(node, inserted)?;
        Ok(inserted)
    }

    /// Insert a new node between all parents of `node` and `node`
    pub fn insert_before(&mut self, node: NodeId, kind: ElementKind) -> ProcessResult<NodeId> {
        if !self.contains(node) {
            return Err(ProcessError::NodeNotFound(node));
        }
        let inserted = self.add(kind);
        self.move_parents(node, inserted)?;
        self.link(inserted, node)?;
        Ok(inserted)
    }

    /// Remove `node` and link each of its parents to each of its children.
    /// Self edges on `node` are dropped.
    pub fn splice_out(&mut self, node: NodeId) -> ProcessResult<()> {
        let parents: Vec<NodeId> = self.parents(node).iter().copied().filter(|p| *p != node).collect();
        let children: Vec<NodeId> = self.children(node).iter().copied().filter(|c| *c != node).collect();
        self.remove(node)?;
        for parent in &parents {
            for child in &children {
                self.link(*parent, *child)?;
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => unreachable!("node {} checked by caller", id),
        }
    }

    // ── Structure ────────────────────────────────────────────────────

    /// Copy every node reachable from `roots` into a fresh graph.
    ///
    /// New identifiers are assigned in depth-first discovery order, so the
    /// copy is compact. The returned map translates old identifiers.
    pub fn structural_copy(&self, roots: &[NodeId], mode: CopyMode) -> (Graph, NodeMap) {
        let mut copy = Graph {
            nodes: Vec::new(),
            next_element: self.next_element,
        };
        let mut map = NodeMap::new();

        let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if map.contains_key(&current) {
                continue;
            }
            let Some(element) = self.element(current) else {
                continue;
            };
            let new_id = match mode {
                CopyMode::Weak => copy.add_element(element.clone()),
                CopyMode::Deep => copy.add(element.kind.clone()),
            };
            map.insert(current, new_id);
            for child in self.children(current).iter().rev() {
                if !map.contains_key(child) {
                    stack.push(*child);
                }
            }
        }

        for (old, new) in &map {
            for child in self.children(*old) {
                if let Some(new_child) = map.get(child) {
                    copy.node_mut(*new).children.insert(*new_child);
                    copy.node_mut(*new_child).parents.insert(*new);
                }
            }
        }

        (copy, map)
    }

    /// Verify `child ∈ a.children ⇔ a ∈ child.parents` for every edge
    pub fn check_consistency(&self) -> ProcessResult<()> {
        for id in self.node_ids() {
            for child in self.children(id) {
                if !self.parents(*child).contains(&id) {
                    return Err(ProcessError::ValidationError(format!(
                        "{} lists child {} which does not list it as parent",
                        id, child
                    )));
                }
            }
            for parent in self.parents(id) {
                if !self.children(*parent).contains(&id) {
                    return Err(ProcessError::ValidationError(format!(
                        "{} lists parent {} which does not list it as child",
                        id, parent
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> (Graph, Vec<NodeId>) {
        let mut g = Graph::new();
        let ids: Vec<NodeId> = names.iter().map(|n| g.add_task(*n)).collect();
        for pair in ids.windows(2) {
            g.link(pair[0], pair[1]).unwrap();
        }
        (g, ids)
    }

    #[test]
    fn test_link_updates_both_sides() {
        let (g, ids) = chain(&["A", "B"]);
        assert!(g.children(ids[0]).contains(&ids[1]));
        assert!(g.parents(ids[1]).contains(&ids[0]));
        assert!(g.check_consistency().is_ok());
    }

    #[test]
    fn test_link_twice_reports_existing_edge() {
        let (mut g, ids) = chain(&["A", "B"]);
        assert!(!g.link(ids[0], ids[1]).unwrap());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_link_to_missing_node() {
        let (mut g, ids) = chain(&["A"]);
        let result = g.link(ids[0], NodeId(42));
        assert!(matches!(result, Err(ProcessError::InvalidLink { .. })));
    }

    #[test]
    fn test_unlink_and_remove() {
        let (mut g, ids) = chain(&["A", "B", "C"]);
        assert!(g.unlink(ids[0], ids[1]));
        assert!(!g.unlink(ids[0], ids[1]));
        g.remove(ids[2]).unwrap();
        assert!(g.children(ids[1]).is_empty());
        assert!(!g.contains(ids[2]));
        assert_eq!(g.len(), 2);
        assert!(g.check_consistency().is_ok());
    }

    #[test]
    fn test_cut_severs_outgoing_edges() {
        let mut g = Graph::new();
        let a = g.add_task("A");
        let b = g.add_task("B");
        let c = g.add_task("C");
        g.link(a, b).unwrap();
        g.link(a, c).unwrap();
        g.link(b, a).unwrap();

        let severed = g.cut(a);
        assert_eq!(severed, [b, c].into_iter().collect());
        assert!(g.children(a).is_empty());
        assert_eq!(g.parents(a).len(), 1);
        assert!(g.parents(c).is_empty());
    }

    #[test]
    fn test_insert_after_and_before() {
        let (mut g, ids) = chain(&["A", "B"]);
        let split = g
            .insert_after(
                ids[0],
                ElementKind::Gateway {
                    kind: GatewayKind::Exclusive,
                    role: GatewayRole::Split,
                },
            )
            .unwrap();
        assert_eq!(g.children(ids[0]).iter().copied().collect::<Vec<_>>(), vec![split]);
        assert!(g.has_edge(split, ids[1]));

        let merge = g
            .insert_before(
                ids[1],
                ElementKind::Gateway {
                    kind: GatewayKind::Exclusive,
                    role: GatewayRole::Merge,
                },
            )
            .unwrap();
        assert!(g.has_edge(split, merge));
        assert!(g.has_edge(merge, ids[1]));
        assert!(g.check_consistency().is_ok());
    }

    #[test]
    fn test_splice_out() {
        let (mut g, ids) = chain(&["A", "B", "C"]);
        g.splice_out(ids[1]).unwrap();
        assert!(g.has_edge(ids[0], ids[2]));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn test_splice_out_links_every_parent_to_every_child() {
        let mut g = Graph::new();
        let a = g.add_task("A");
        let b = g.add_task("B");
        let via = g.add_task("via");
        let c = g.add_task("C");
        let d = g.add_task("D");
        for parent in [a, b] {
            g.link(parent, via).unwrap();
        }
        for child in [c, d] {
            g.link(via, child).unwrap();
        }
        g.link(a, c).unwrap();

        g.splice_out(via).unwrap();
        assert!(!g.contains(via));
        for parent in [a, b] {
            for child in [c, d] {
                assert!(g.has_edge(parent, child));
            }
        }
        assert_eq!(g.children(a).len(), 2);
        assert!(g.check_consistency().is_ok());
    }

    #[test]
    fn test_weak_copy_shares_elements() {
        let (g, ids) = chain(&["A", "B", "C"]);
        let (copy, map) = g.structural_copy(&[ids[0]], CopyMode::Weak);
        assert_eq!(copy.len(), 3);
        for (old, new) in &map {
            assert_eq!(g.element(*old).unwrap().id, copy.element(*new).unwrap().id);
        }
        assert!(copy.has_edge(map[&ids[0]], map[&ids[1]]));
        assert!(copy.check_consistency().is_ok());
    }

    #[test]
    fn test_deep_copy_allocates_fresh_elements() {
        let (g, ids) = chain(&["A", "B"]);
        let (copy, map) = g.structural_copy(&[ids[0]], CopyMode::Deep);
        for (old, new) in &map {
            let original = g.element(*old).unwrap();
            let cloned = copy.element(*new).unwrap();
            assert_ne!(original.id, cloned.id);
            assert_eq!(original.kind, cloned.kind);
        }
    }

    #[test]
    fn test_copy_only_takes_reachable_nodes() {
        let mut g = Graph::new();
        let a = g.add_task("A");
        let b = g.add_task("B");
        let orphan = g.add_task("Orphan");
        g.link(a, b).unwrap();
        g.link(b, a).unwrap();

        let (copy, map) = g.structural_copy(&[a], CopyMode::Weak);
        assert_eq!(copy.len(), 2);
        assert!(!map.contains_key(&orphan));
        assert!(copy.has_edge(map[&b], map[&a]));
    }

    #[test]
    fn test_find_task_ignores_placeholders() {
        let mut g = Graph::new();
        g.add_placeholder("A", TaskTag::Synchronization);
        let real = g.add_task("A");
        assert_eq!(g.find_task("A"), Some(real));
    }
}
