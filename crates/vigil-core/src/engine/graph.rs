//! Shared expression graph with structural deduplication.
//!
//! All nodes of one configuration scope live in a single arena and are
//! addressed by dense [`NodeId`]s; children are stored as ids, never as
//! references. Insertion merges bottom-up through a hash-consing table, so
//! structurally identical subtrees collapse to one node regardless of the
//! order rules were registered in.
//!
//! Because a node's children must already exist when the node is interned,
//! every child id is strictly smaller than its parent's id. That ordering
//! makes the arena acyclic by construction and is checked by the internal
//! validation report.

use std::io::{self, Write};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use vigil_frontend::ast::SexprAst;

use crate::engine::value::{Value, ValueKey};

/// Identifier of a node in one graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Inline child storage; most calls have few arguments.
pub(crate) type Children = SmallVec<[NodeId; 4]>;

/// What a node is: a call by name, or a literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Call(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    children: Children,
    /// Provenance strings, in insertion order. A node merged from several
    /// independently authored expressions carries all their origins.
    origins: Vec<String>,
}

/// Structural identity of a node: tag plus child ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    tag: KeyTag,
    children: SmallVec<[NodeId; 4]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyTag {
    Call(String),
    Literal(ValueKey),
}

/// Dense index layout computed by the indexer at scope close.
#[derive(Debug, Clone)]
pub struct NodeIndexing {
    /// Nodes in assignment order; position equals assigned index.
    pub order: Vec<NodeId>,
    /// Node id to assigned index.
    pub index_of: FxHashMap<NodeId, usize>,
}

impl NodeIndexing {
    /// One more than the maximum assigned index.
    pub fn index_limit(&self) -> usize {
        self.order.len()
    }
}

/// The shared expression graph of one configuration scope.
///
/// Mutated only during configuration; scope close extracts the frozen
/// evaluation layout and discards the graph. `Clone` is the copy-on-scope-open
/// operation: child ids are arena-relative, so a plain deep clone preserves
/// all sharing, origins, and root indices.
#[derive(Debug, Clone, Default)]
pub struct MergeGraph {
    nodes: Vec<NodeData>,
    interned: FxHashMap<NodeKey, NodeId>,
    /// Acquisition index to current root node. Indices are handed out
    /// monotonically and never reused within a scope.
    roots: Vec<NodeId>,
    root_lookup: FxHashMap<NodeId, SmallVec<[usize; 2]>>,
}

impl MergeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0 as usize].kind
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0 as usize].children
    }

    /// Interns a node whose children are already in the arena. Returns the
    /// existing structurally equal node when there is one.
    pub(crate) fn insert_parts(&mut self, kind: NodeKind, children: Children) -> NodeId {
        let key = NodeKey {
            tag: match &kind {
                NodeKind::Call(name) => KeyTag::Call(name.clone()),
                NodeKind::Literal(value) => KeyTag::Literal(ValueKey::from(value)),
            },
            children: children.clone(),
        };
        if let Some(&existing) = self.interned.get(&key) {
            return existing;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            children,
            origins: Vec::new(),
        });
        self.interned.insert(key, id);
        id
    }

    /// Inserts an expression tree bottom-up, merging equal subtrees at every
    /// depth.
    pub fn insert_ast(&mut self, ast: &SexprAst) -> NodeId {
        match ast {
            SexprAst::Literal(lit) => self.insert_parts(NodeKind::Literal(Value::from(lit)), Children::new()),
            SexprAst::Call { name, args } => {
                let children: Children = args.iter().map(|arg| self.insert_ast(arg)).collect();
                self.insert_parts(NodeKind::Call(name.clone()), children)
            }
        }
    }

    /// Registers `node` as a root and returns a fresh acquisition index.
    pub fn add_root(&mut self, node: NodeId) -> usize {
        let index = self.roots.len();
        self.roots.push(node);
        self.root_lookup.entry(node).or_default().push(index);
        index
    }

    /// Re-registers a root under a preexisting acquisition index while a
    /// transform pass rebuilds the graph. Indices must arrive in order.
    pub(crate) fn restore_root(&mut self, index: usize, node: NodeId) {
        debug_assert_eq!(self.roots.len(), index);
        self.roots.push(node);
        self.root_lookup.entry(node).or_default().push(index);
    }

    /// Appends a provenance string to `node`. Duplicates are kept.
    pub fn add_origin(&mut self, node: NodeId, origin: impl Into<String>) {
        self.nodes[node.0 as usize].origins.push(origin.into());
    }

    pub fn origins(&self, node: NodeId) -> &[String] {
        &self.nodes[node.0 as usize].origins
    }

    pub fn is_root(&self, node: NodeId) -> bool {
        self.root_lookup.contains_key(&node)
    }

    /// All acquisition indices currently mapped to `node`.
    pub fn root_indices(&self, node: NodeId) -> &[usize] {
        self.root_lookup.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Roots by acquisition index. The same node appears once per index that
    /// merged to it.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Deterministic top-down traversal from all roots in acquisition order.
    /// Each node is visited exactly once even when shared.
    pub fn traverse_down(&self) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        for &root in &self.roots {
            if !visited[root.0 as usize] {
                visited[root.0 as usize] = true;
                queue.push_back(root);
            }
        }
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &child in self.children(node) {
                if !visited[child.0 as usize] {
                    visited[child.0 as usize] = true;
                    queue.push_back(child);
                }
            }
        }
        order
    }

    /// Assigns each reachable node a dense index in `0..index_limit`.
    /// The order is stable for a given graph shape.
    pub fn assign_indices(&self) -> NodeIndexing {
        let order = self.traverse_down();
        let index_of = order
            .iter()
            .enumerate()
            .map(|(index, &node)| (node, index))
            .collect();
        NodeIndexing { order, index_of }
    }

    /// Distinct roots that have `node` as a descendant, for diagnostics.
    pub fn roots_over(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        for &root in &self.roots {
            if result.contains(&root) {
                continue;
            }
            if self.reaches(root, node) {
                result.push(root);
            }
        }
        result
    }

    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        if from == target {
            return true;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        visited[from.0 as usize] = true;
        while let Some(node) = stack.pop() {
            for &child in self.children(node) {
                if child == target {
                    return true;
                }
                if !visited[child.0 as usize] {
                    visited[child.0 as usize] = true;
                    stack.push(child);
                }
            }
        }
        false
    }

    /// Renders `node` as canonical s-expression text. Shared subtrees are
    /// rendered in full at each occurrence.
    pub fn render(&self, node: NodeId) -> String {
        match self.kind(node) {
            NodeKind::Literal(value) => value.to_string(),
            NodeKind::Call(name) => {
                let mut out = format!("({}", name);
                for &child in self.children(node) {
                    out.push(' ');
                    out.push_str(&self.render(child));
                }
                out.push(')');
                out
            }
        }
    }

    /// Dumps the graph structure: every reachable node with its children,
    /// origins, and acquisition indices.
    pub fn write_debug_report(&self, out: &mut dyn Write) -> io::Result<()> {
        for node in self.traverse_down() {
            let label = match self.kind(node) {
                NodeKind::Call(name) => format!("({})", name),
                NodeKind::Literal(value) => value.to_string(),
            };
            write!(out, "#{} {}", node.0, label)?;
            let children = self.children(node);
            if !children.is_empty() {
                write!(out, " children")?;
                for child in children {
                    write!(out, " #{}", child.0)?;
                }
            }
            let indices = self.root_indices(node);
            if !indices.is_empty() {
                write!(out, " roots {:?}", indices)?;
            }
            writeln!(out)?;
            for origin in self.origins(node) {
                writeln!(out, "  origin {}", origin)?;
            }
        }
        Ok(())
    }

    /// Checks the graph's own bookkeeping: arena bounds, child ordering
    /// (acyclicity), dedup-table coherence, root maps, and reachability.
    ///
    /// Writes one line per failure and returns whether the graph is valid.
    /// A failure here is an engine defect, not a configuration error.
    pub fn write_validation_report(&self, out: &mut dyn Write) -> io::Result<bool> {
        let mut ok = true;
        let len = self.nodes.len() as u32;

        for (i, data) in self.nodes.iter().enumerate() {
            for &child in &data.children {
                if child.0 >= len {
                    writeln!(out, "node #{} has dangling child #{}", i, child.0)?;
                    ok = false;
                } else if child.0 as usize >= i {
                    writeln!(out, "node #{} has non-ancestral child #{}", i, child.0)?;
                    ok = false;
                }
            }
        }

        if self.interned.len() != self.nodes.len() {
            writeln!(
                out,
                "dedup table has {} entries for {} nodes",
                self.interned.len(),
                self.nodes.len()
            )?;
            ok = false;
        }
        for (key, &id) in &self.interned {
            if id.0 >= len {
                writeln!(out, "dedup table maps to dangling node #{}", id.0)?;
                ok = false;
                continue;
            }
            let data = &self.nodes[id.0 as usize];
            let tag_matches = match (&key.tag, &data.kind) {
                (KeyTag::Call(a), NodeKind::Call(b)) => a == b,
                (KeyTag::Literal(a), NodeKind::Literal(b)) => *a == ValueKey::from(b),
                _ => false,
            };
            if !tag_matches || key.children.as_slice() != data.children.as_slice() {
                writeln!(out, "dedup table entry disagrees with node #{}", id.0)?;
                ok = false;
            }
        }

        for (index, &root) in self.roots.iter().enumerate() {
            if root.0 >= len {
                writeln!(out, "root index {} maps to dangling node #{}", index, root.0)?;
                ok = false;
                continue;
            }
            let indices = self.root_indices(root);
            if !indices.contains(&index) {
                writeln!(out, "root lookup is missing index {} for node #{}", index, root.0)?;
                ok = false;
            }
        }
        for (&node, indices) in &self.root_lookup {
            for &index in indices {
                if self.roots.get(index) != Some(&node) {
                    writeln!(
                        out,
                        "root lookup claims index {} for node #{} but the root list disagrees",
                        index, node.0
                    )?;
                    ok = false;
                }
            }
        }

        let reachable = self.traverse_down().len();
        if reachable != self.nodes.len() {
            writeln!(
                out,
                "{} of {} nodes are unreachable from any root",
                self.nodes.len() - reachable,
                self.nodes.len()
            )?;
            ok = false;
        }

        Ok(ok)
    }
}
