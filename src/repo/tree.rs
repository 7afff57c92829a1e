//! Study tree storage and structural algorithms.
//!
//! Each study owns one [`StudyTree`], an arena of nodes keyed by id where
//! parent and children are stored as id references. Structural edits take the
//! tree's write lock, so insertions, deletions and moves on one study are
//! serialized while different studies proceed independently.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{InsertMode, Node, NodeId, NodeSpec, StudyId};
use crate::error::{StudyError, StudyResult};

/// Outcome of placing a node in the tree
#[derive(Debug, Clone)]
pub struct Insertion {
    pub node: Node,
    /// Pre-existing nodes whose ancestry now goes through the placed node
    pub displaced: Vec<NodeId>,
}

/// Outcome of removing a single node while keeping its children
#[derive(Debug, Clone)]
pub struct NodeRemoval {
    pub removed: Node,
    /// Former children, now attached to the removed node's parent
    pub reattached: Vec<NodeId>,
}

/// Outcome of moving a single node to another position
#[derive(Debug, Clone)]
pub struct NodeMove {
    pub reattached: Vec<NodeId>,
    pub displaced: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct StudyTree {
    study_id: StudyId,
    root_id: NodeId,
    nodes: HashMap<NodeId, Node>,
}

impl StudyTree {
    pub fn new(study_id: StudyId) -> Self {
        let root = Node::root();
        let root_id = root.id;
        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        Self {
            study_id,
            root_id,
            nodes,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> StudyResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| StudyError::not_found("node", id))
    }

    fn node_mut(&mut self, id: NodeId) -> StudyResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| StudyError::not_found("node", id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Path from the root down to `id`, both included
    pub fn ancestors(&self, id: NodeId) -> StudyResult<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            path.push(cur);
            current = self.node(cur)?.parent_id;
        }
        path.reverse();
        Ok(path)
    }

    pub fn is_proper_ancestor(&self, ancestor: NodeId, of: NodeId) -> StudyResult<bool> {
        if ancestor == of {
            self.node(of)?;
            return Ok(false);
        }
        Ok(self.ancestors(of)?.contains(&ancestor))
    }

    /// Topmost nodes whose subtrees cover both `a` and `b` without overlap.
    pub fn highest_nodes(&self, a: NodeId, b: NodeId) -> StudyResult<Vec<&Node>> {
        let node_a = self.node(a)?;
        let node_b = self.node(b)?;
        if a == b {
            return Ok(vec![node_a]);
        }
        if self.ancestors(b)?.contains(&a) {
            return Ok(vec![node_a]);
        }
        if self.ancestors(a)?.contains(&b) {
            return Ok(vec![node_b]);
        }
        Ok(vec![node_a, node_b])
    }

    /// Reduces a set of nodes to the minimal set of subtree roots covering it,
    /// folding [`Self::highest_nodes`] pairwise.
    pub fn covering_nodes(&self, ids: &[NodeId]) -> StudyResult<Vec<NodeId>> {
        let mut covering: Vec<NodeId> = Vec::new();
        'ids: for &id in ids {
            self.node(id)?;
            let mut kept = Vec::with_capacity(covering.len() + 1);
            for &c in &covering {
                match self.highest_nodes(c, id)?.as_slice() {
                    [top] if top.id == c => continue 'ids,
                    [_] => {}
                    _ => kept.push(c),
                }
            }
            kept.push(id);
            covering = kept;
        }
        Ok(covering)
    }

    /// Pre-order listing of `id` and all its descendants
    pub fn subtree(&self, id: NodeId) -> StudyResult<Vec<NodeId>> {
        self.node(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            if let Some(node) = self.nodes.get(&cur) {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(out)
    }

    fn check_placement(&self, reference: NodeId, mode: InsertMode) -> StudyResult<()> {
        let reference_node = self.node(reference)?;
        if reference_node.stashed {
            return Err(StudyError::forbidden(
                "NODE_STASHED",
                format!("node {} is stashed", reference),
            ));
        }
        if mode == InsertMode::Before && reference_node.is_root() {
            return Err(StudyError::forbidden(
                "CANNOT_INSERT_BEFORE_ROOT",
                "no node can be inserted before the root node",
            ));
        }
        Ok(())
    }

    /// Places a detached node relative to `reference`, returning displaced nodes
    fn attach(&mut self, mut node: Node, reference: NodeId, mode: InsertMode) -> StudyResult<Insertion> {
        self.check_placement(reference, mode)?;
        let displaced = match mode {
            InsertMode::Child => {
                node.parent_id = Some(reference);
                self.node_mut(reference)?.children.push(node.id);
                Vec::new()
            }
            InsertMode::Before => {
                let parent = self.node(reference)?.parent_id.ok_or_else(|| {
                    StudyError::forbidden("CANNOT_INSERT_BEFORE_ROOT", "reference has no parent")
                })?;
                node.parent_id = Some(parent);
                node.children = vec![reference];
                let siblings = &mut self.node_mut(parent)?.children;
                if let Some(pos) = siblings.iter().position(|c| *c == reference) {
                    siblings[pos] = node.id;
                }
                self.node_mut(reference)?.parent_id = Some(node.id);
                vec![reference]
            }
            InsertMode::After => {
                let adopted = std::mem::take(&mut self.node_mut(reference)?.children);
                for child in &adopted {
                    self.node_mut(*child)?.parent_id = Some(node.id);
                }
                node.parent_id = Some(reference);
                node.children = adopted.clone();
                self.node_mut(reference)?.children.push(node.id);
                adopted
            }
        };
        self.nodes.insert(node.id, node.clone());
        Ok(Insertion { node, displaced })
    }

    pub fn insert(&mut self, reference: NodeId, mode: InsertMode, spec: NodeSpec) -> StudyResult<Insertion> {
        let inserted = self.attach(Node::modification(spec), reference, mode)?;
        debug!(study_id = %self.study_id, node_id = %inserted.node.id, ?mode, "node inserted");
        Ok(inserted)
    }

    fn reject_root(&self, id: NodeId, code: &'static str) -> StudyResult<()> {
        if self.node(id)?.is_root() {
            return Err(StudyError::forbidden(code, "the root node cannot be changed"));
        }
        Ok(())
    }

    /// Removes `id` and every descendant, returning the removed nodes
    pub fn remove_subtree(&mut self, id: NodeId) -> StudyResult<Vec<Node>> {
        self.reject_root(id, "CANNOT_DELETE_ROOT")?;
        let ids = self.subtree(id)?;
        if let Some(parent) = self.node(id)?.parent_id {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        Ok(ids.iter().filter_map(|i| self.nodes.remove(i)).collect())
    }

    /// Unlinks one node, splicing its children into its parent's child list
    fn detach_node(&mut self, id: NodeId) -> StudyResult<NodeRemoval> {
        let (parent, children) = {
            let node = self.node(id)?;
            let parent = node.parent_id.ok_or_else(|| {
                StudyError::forbidden("CANNOT_DELETE_ROOT", "the root node cannot be changed")
            })?;
            (parent, node.children.clone())
        };
        for child in &children {
            self.node_mut(*child)?.parent_id = Some(parent);
        }
        let siblings = &mut self.node_mut(parent)?.children;
        if let Some(pos) = siblings.iter().position(|c| *c == id) {
            siblings.splice(pos..=pos, children.iter().copied());
        }
        let mut removed = self
            .nodes
            .remove(&id)
            .ok_or_else(|| StudyError::not_found("node", id))?;
        removed.parent_id = None;
        removed.children.clear();
        Ok(NodeRemoval {
            removed,
            reattached: children,
        })
    }

    pub fn remove_node(&mut self, id: NodeId) -> StudyResult<NodeRemoval> {
        self.reject_root(id, "CANNOT_DELETE_ROOT")?;
        self.detach_node(id)
    }

    /// Moves `id` with all its descendants under `new_parent`
    pub fn move_subtree(&mut self, id: NodeId, new_parent: NodeId) -> StudyResult<()> {
        self.reject_root(id, "CANNOT_MOVE_ROOT")?;
        if self.subtree(id)?.contains(&new_parent) {
            return Err(StudyError::forbidden(
                "MOVE_INTO_OWN_SUBTREE",
                format!("node {} cannot be moved below itself", id),
            ));
        }
        self.check_placement(new_parent, InsertMode::Child)?;
        if let Some(old_parent) = self.node(id)?.parent_id {
            self.node_mut(old_parent)?.children.retain(|c| *c != id);
        }
        self.node_mut(new_parent)?.children.push(id);
        self.node_mut(id)?.parent_id = Some(new_parent);
        Ok(())
    }

    /// Moves a single node; its children stay at its former position
    pub fn move_node(&mut self, id: NodeId, reference: NodeId, mode: InsertMode) -> StudyResult<NodeMove> {
        self.reject_root(id, "CANNOT_MOVE_ROOT")?;
        if id == reference {
            return Err(StudyError::forbidden(
                "MOVE_INTO_OWN_SUBTREE",
                "a node cannot be placed relative to itself",
            ));
        }
        self.check_placement(reference, mode)?;
        let removal = self.detach_node(id)?;
        let placed = self.attach(removal.removed, reference, mode)?;
        Ok(NodeMove {
            reattached: removal.reattached,
            displaced: placed.displaced,
        })
    }

    fn set_stashed(&mut self, id: NodeId, stashed: bool) -> StudyResult<Vec<NodeId>> {
        let ids = self.subtree(id)?;
        for i in &ids {
            self.node_mut(*i)?.stashed = stashed;
        }
        Ok(ids)
    }

    pub fn stash(&mut self, id: NodeId) -> StudyResult<Vec<NodeId>> {
        self.reject_root(id, "CANNOT_STASH_ROOT")?;
        self.set_stashed(id, true)
    }

    pub fn restore(&mut self, id: NodeId) -> StudyResult<Vec<NodeId>> {
        if let Some(parent) = self.node(id)?.parent_id {
            if self.node(parent)?.stashed {
                return Err(StudyError::forbidden(
                    "NODE_STASHED",
                    format!("parent {} of node {} is stashed", parent, id),
                ));
            }
        }
        self.set_stashed(id, false)
    }
}

/// All study trees, plus a node → study index for routing inbound events
#[derive(Default)]
pub struct TreeStore {
    trees: RwLock<HashMap<StudyId, Arc<RwLock<StudyTree>>>>,
    node_index: RwLock<HashMap<NodeId, StudyId>>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_root(&self, study_id: StudyId) -> StudyResult<Node> {
        let tree = StudyTree::new(study_id);
        let root = tree.node(tree.root_id())?.clone();
        {
            let mut trees = self.trees.write();
            if trees.contains_key(&study_id) {
                return Err(StudyError::forbidden(
                    "STUDY_ALREADY_EXISTS",
                    format!("study {} already has a tree", study_id),
                ));
            }
            trees.insert(study_id, Arc::new(RwLock::new(tree)));
        }
        self.node_index.write().insert(root.id, study_id);
        Ok(root)
    }

    fn tree(&self, study_id: StudyId) -> StudyResult<Arc<RwLock<StudyTree>>> {
        self.trees
            .read()
            .get(&study_id)
            .cloned()
            .ok_or_else(|| StudyError::not_found("study", study_id))
    }

    pub fn read<R>(&self, study_id: StudyId, f: impl FnOnce(&StudyTree) -> StudyResult<R>) -> StudyResult<R> {
        let tree = self.tree(study_id)?;
        let guard = tree.read();
        f(&guard)
    }

    fn write<R>(&self, study_id: StudyId, f: impl FnOnce(&mut StudyTree) -> StudyResult<R>) -> StudyResult<R> {
        let tree = self.tree(study_id)?;
        let mut guard = tree.write();
        f(&mut guard)
    }

    /// Runs `f` under the tree's write lock without editing the tree, so that
    /// `f` is serialized with structural edits of the study
    pub fn exclusive<R>(&self, study_id: StudyId, f: impl FnOnce(&StudyTree) -> StudyResult<R>) -> StudyResult<R> {
        self.write(study_id, |t| f(t))
    }

    pub fn study_of(&self, node_id: NodeId) -> Option<StudyId> {
        self.node_index.read().get(&node_id).copied()
    }

    pub fn node(&self, study_id: StudyId, node_id: NodeId) -> StudyResult<Node> {
        self.read(study_id, |t| t.node(node_id).cloned())
    }

    pub fn root(&self, study_id: StudyId) -> StudyResult<Node> {
        self.read(study_id, |t| t.node(t.root_id()).cloned())
    }

    pub fn nodes(&self, study_id: StudyId) -> StudyResult<Vec<Node>> {
        self.read(study_id, |t| {
            let mut nodes = Vec::with_capacity(t.len());
            for id in t.subtree(t.root_id())? {
                nodes.push(t.node(id)?.clone());
            }
            Ok(nodes)
        })
    }

    pub fn subtree(&self, study_id: StudyId, node_id: NodeId) -> StudyResult<Vec<NodeId>> {
        self.read(study_id, |t| t.subtree(node_id))
    }

    pub fn highest_nodes(&self, study_id: StudyId, a: NodeId, b: NodeId) -> StudyResult<Vec<Node>> {
        self.read(study_id, |t| {
            Ok(t.highest_nodes(a, b)?.into_iter().cloned().collect())
        })
    }

    pub fn covering_nodes(&self, study_id: StudyId, ids: &[NodeId]) -> StudyResult<Vec<NodeId>> {
        self.read(study_id, |t| t.covering_nodes(ids))
    }

    pub fn insert(
        &self,
        study_id: StudyId,
        reference: NodeId,
        mode: InsertMode,
        spec: NodeSpec,
    ) -> StudyResult<Insertion> {
        self.insert_with(study_id, reference, mode, spec, |_| ())
            .map(|(inserted, ())| inserted)
    }

    /// Inserts a node and runs `f` on it before the tree lock is released
    pub fn insert_with<R>(
        &self,
        study_id: StudyId,
        reference: NodeId,
        mode: InsertMode,
        spec: NodeSpec,
        f: impl FnOnce(&Insertion) -> R,
    ) -> StudyResult<(Insertion, R)> {
        let (inserted, extra) = self.write(study_id, |t| {
            let inserted = t.insert(reference, mode, spec)?;
            let extra = f(&inserted);
            Ok((inserted, extra))
        })?;
        self.node_index.write().insert(inserted.node.id, study_id);
        Ok((inserted, extra))
    }

    pub fn delete_subtree(&self, study_id: StudyId, node_id: NodeId) -> StudyResult<Vec<Node>> {
        let removed = self.write(study_id, |t| t.remove_subtree(node_id))?;
        let mut index = self.node_index.write();
        for node in &removed {
            index.remove(&node.id);
        }
        Ok(removed)
    }

    pub fn delete_node(&self, study_id: StudyId, node_id: NodeId) -> StudyResult<NodeRemoval> {
        let removal = self.write(study_id, |t| t.remove_node(node_id))?;
        self.node_index.write().remove(&node_id);
        Ok(removal)
    }

    pub fn move_subtree(&self, study_id: StudyId, node_id: NodeId, new_parent: NodeId) -> StudyResult<()> {
        self.write(study_id, |t| t.move_subtree(node_id, new_parent))
    }

    pub fn move_node(
        &self,
        study_id: StudyId,
        node_id: NodeId,
        reference: NodeId,
        mode: InsertMode,
    ) -> StudyResult<NodeMove> {
        self.write(study_id, |t| t.move_node(node_id, reference, mode))
    }

    pub fn stash(&self, study_id: StudyId, node_id: NodeId) -> StudyResult<Vec<NodeId>> {
        self.write(study_id, |t| t.stash(node_id))
    }

    pub fn restore(&self, study_id: StudyId, node_id: NodeId) -> StudyResult<Vec<NodeId>> {
        self.write(study_id, |t| t.restore(node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeSubtype;
    use proptest::prelude::*;
    use proptest::sample::Index;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn spec(name: &str) -> NodeSpec {
        NodeSpec::named(name, NodeSubtype::Construction)
    }

    fn child(tree: &mut StudyTree, parent: NodeId, name: &str) -> NodeId {
        tree.insert(parent, InsertMode::Child, spec(name)).unwrap().node.id
    }

    /// root → N1 → {N2, N3 → N4}
    fn sample() -> (StudyTree, [NodeId; 5]) {
        let mut tree = StudyTree::new(Uuid::new_v4());
        let root = tree.root_id();
        let n1 = child(&mut tree, root, "N1");
        let n2 = child(&mut tree, n1, "N2");
        let n3 = child(&mut tree, n1, "N3");
        let n4 = child(&mut tree, n3, "N4");
        (tree, [root, n1, n2, n3, n4])
    }

    fn ids(nodes: Vec<&Node>) -> HashSet<NodeId> {
        nodes.into_iter().map(|n| n.id).collect()
    }

    #[test]
    fn highest_nodes_worked_example() {
        let (tree, [_, n1, n2, n3, n4]) = sample();
        assert_eq!(ids(tree.highest_nodes(n1, n2).unwrap()), HashSet::from([n1]));
        assert_eq!(ids(tree.highest_nodes(n1, n4).unwrap()), HashSet::from([n1]));
        assert_eq!(ids(tree.highest_nodes(n2, n3).unwrap()), HashSet::from([n2, n3]));
        assert_eq!(ids(tree.highest_nodes(n2, n4).unwrap()), HashSet::from([n2, n4]));
        assert_eq!(ids(tree.highest_nodes(n4, n1).unwrap()), HashSet::from([n1]));
        assert_eq!(ids(tree.highest_nodes(n3, n3).unwrap()), HashSet::from([n3]));
    }

    #[test]
    fn highest_nodes_unknown_node_is_not_found() {
        let (tree, [_, n1, ..]) = sample();
        let err = tree.highest_nodes(n1, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StudyError::NotFound { .. }));
    }

    #[test]
    fn covering_nodes_drops_nested_entries() {
        let (tree, [_, n1, n2, n3, n4]) = sample();
        let cover = tree.covering_nodes(&[n4, n2, n3]).unwrap();
        assert_eq!(cover.iter().copied().collect::<HashSet<_>>(), HashSet::from([n2, n3]));
        assert_eq!(tree.covering_nodes(&[n4, n1, n2]).unwrap(), vec![n1]);
    }

    #[test]
    fn subtree_is_preorder() {
        let (tree, [_, n1, n2, n3, n4]) = sample();
        assert_eq!(tree.subtree(n1).unwrap(), vec![n1, n2, n3, n4]);
    }

    #[test]
    fn insert_before_takes_reference_place() {
        let (mut tree, [_, n1, n2, n3, _]) = sample();
        let inserted = tree.insert(n3, InsertMode::Before, spec("X")).unwrap();
        let x = inserted.node.id;
        assert_eq!(inserted.displaced, vec![n3]);
        assert_eq!(tree.node(n1).unwrap().children, vec![n2, x]);
        assert_eq!(tree.node(n3).unwrap().parent_id, Some(x));
        assert_eq!(tree.node(x).unwrap().children, vec![n3]);
    }

    #[test]
    fn insert_after_adopts_children() {
        let (mut tree, [_, n1, n2, n3, _]) = sample();
        let inserted = tree.insert(n1, InsertMode::After, spec("X")).unwrap();
        let x = inserted.node.id;
        assert_eq!(inserted.displaced, vec![n2, n3]);
        assert_eq!(tree.node(n1).unwrap().children, vec![x]);
        assert_eq!(tree.node(n2).unwrap().parent_id, Some(x));
        assert_eq!(tree.node(n3).unwrap().parent_id, Some(x));
    }

    #[test]
    fn insert_before_root_is_forbidden() {
        let (mut tree, [root, ..]) = sample();
        let err = tree.insert(root, InsertMode::Before, spec("X")).unwrap_err();
        assert_eq!(err.code(), "CANNOT_INSERT_BEFORE_ROOT");
    }

    #[test]
    fn insert_under_stashed_node_is_forbidden() {
        let (mut tree, [_, _, _, n3, n4]) = sample();
        tree.stash(n3).unwrap();
        assert!(tree.node(n4).unwrap().stashed);
        let err = tree.insert(n4, InsertMode::Child, spec("X")).unwrap_err();
        assert!(matches!(err, StudyError::Forbidden { code: "NODE_STASHED", .. }));
        tree.restore(n3).unwrap();
        assert!(tree.insert(n4, InsertMode::Child, spec("X")).is_ok());
    }

    #[test]
    fn insert_under_unknown_node_is_not_found() {
        let (mut tree, _) = sample();
        let err = tree
            .insert(Uuid::new_v4(), InsertMode::Child, spec("X"))
            .unwrap_err();
        assert!(matches!(err, StudyError::NotFound { .. }));
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let (mut tree, [_, n1, n2, n3, n4]) = sample();
        let removed: HashSet<_> = tree.remove_subtree(n3).unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(removed, HashSet::from([n3, n4]));
        assert_eq!(tree.node(n1).unwrap().children, vec![n2]);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn remove_root_is_forbidden() {
        let (mut tree, [root, ..]) = sample();
        assert!(matches!(
            tree.remove_subtree(root),
            Err(StudyError::Forbidden { .. })
        ));
    }

    #[test]
    fn remove_node_reattaches_children_in_place() {
        let (mut tree, [root, n1, n2, n3, _]) = sample();
        let removal = tree.remove_node(n1).unwrap();
        assert_eq!(removal.reattached, vec![n2, n3]);
        assert_eq!(tree.node(root).unwrap().children, vec![n2, n3]);
        assert_eq!(tree.node(n2).unwrap().parent_id, Some(root));
    }

    #[test]
    fn move_subtree_below_itself_is_forbidden() {
        let (mut tree, [_, n1, _, _, n4]) = sample();
        let err = tree.move_subtree(n1, n4).unwrap_err();
        assert_eq!(err.code(), "MOVE_INTO_OWN_SUBTREE");
        assert_eq!(tree.ancestors(n4).unwrap().len(), 4);
    }

    #[test]
    fn move_subtree_relinks_parent() {
        let (mut tree, [_, n1, n2, n3, n4]) = sample();
        tree.move_subtree(n3, n2).unwrap();
        assert_eq!(tree.node(n1).unwrap().children, vec![n2]);
        assert_eq!(tree.ancestors(n4).unwrap()[1..], [n1, n2, n3, n4]);
    }

    #[test]
    fn move_node_leaves_children_behind() {
        let (mut tree, [_, n1, n2, n3, n4]) = sample();
        let moved = tree.move_node(n3, n2, InsertMode::Child).unwrap();
        assert_eq!(moved.reattached, vec![n4]);
        assert_eq!(tree.node(n4).unwrap().parent_id, Some(n1));
        assert_eq!(tree.node(n3).unwrap().parent_id, Some(n2));
        assert!(tree.node(n3).unwrap().children.is_empty());
    }

    #[test]
    fn store_indexes_nodes_by_study() {
        let store = TreeStore::new();
        let study = Uuid::new_v4();
        let root = store.create_root(study).unwrap();
        let n1 = store.insert(study, root.id, InsertMode::Child, spec("N1")).unwrap().node.id;
        assert_eq!(store.study_of(n1), Some(study));
        store.delete_subtree(study, n1).unwrap();
        assert_eq!(store.study_of(n1), None);
        assert!(store.create_root(study).is_err());
    }

    fn random_tree(parents: &[Index]) -> (StudyTree, Vec<NodeId>) {
        let mut tree = StudyTree::new(Uuid::new_v4());
        let mut ids = vec![tree.root_id()];
        for (i, p) in parents.iter().enumerate() {
            let parent = ids[p.index(ids.len())];
            ids.push(child(&mut tree, parent, &format!("n{i}")));
        }
        (tree, ids)
    }

    proptest! {
        #[test]
        fn highest_nodes_laws(
            parents in prop::collection::vec(any::<Index>(), 1..40),
            a in any::<Index>(),
            b in any::<Index>(),
        ) {
            let (tree, all) = random_tree(&parents);
            let a = all[a.index(all.len())];
            let b = all[b.index(all.len())];
            let top = ids(tree.highest_nodes(a, b).unwrap());
            prop_assert_eq!(&top, &ids(tree.highest_nodes(b, a).unwrap()));
            if a == b || tree.is_proper_ancestor(a, b).unwrap() {
                prop_assert_eq!(top, HashSet::from([a]));
            } else if tree.is_proper_ancestor(b, a).unwrap() {
                prop_assert_eq!(top, HashSet::from([b]));
            } else {
                prop_assert_eq!(top, HashSet::from([a, b]));
            }
        }
    }
}
