//! Filter expression trees.
//!
//! A [`Tree`] is an arena of [`Node`]s linked into sequences ("blocks").
//! `And`/`Or` nodes may own a nested block through their `child` link.
//! Nodes are created by the insertion methods and released together with
//! the tree, so a node can never be linked twice.

/// Index of a node inside its owning [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A leaf predicate: its name and positional string parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    And,
    Or,
    Not,
    Op(Op),
}

impl NodeKind {
    /// Whether this kind may own a nested block.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, NodeKind::And | NodeKind::Or)
    }

    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            NodeKind::And => "And",
            NodeKind::Or => "Or",
            NodeKind::Not => "Not",
            NodeKind::Op(op) => &op.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    next: Option<NodeId>,
    /// Preceding sibling, or the owning `And`/`Or` for the first node of a child block.
    previous: Option<NodeId>,
    child: Option<NodeId>,
}

impl Node {
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    #[must_use]
    pub fn previous(&self) -> Option<NodeId> {
        self.previous
    }

    #[must_use]
    pub fn child(&self) -> Option<NodeId> {
        self.child
    }
}

/// One filter expression, optionally named.
///
/// # Example
///
/// ```
/// use reqfilter::Tree;
///
/// // isMethod("GET") AND (containsHeader("accept", "json") OR existsCookie("sid"))
/// let mut tree = Tree::named("api");
/// tree.add_op("isMethod", &["GET"]);
/// tree.add_or();
/// tree.add_child_op("containsHeader", &["accept", "json"]);
/// tree.add_op("existsCookie", &["sid"]);
/// tree.parent();
/// assert_eq!(tree.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    name: Option<String>,
    nodes: Vec<Node>,
    root: Option<NodeId>,
    current: Option<NodeId>,
    scopes: Vec<NodeId>,
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Nodes of the block starting at `first`, in sequence order.
    #[must_use]
    pub fn block(&self, first: NodeId) -> Block<'_> {
        Block {
            tree: self,
            next: Some(first),
        }
    }

    /// Nesting depth of the deepest block (the root block is depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        fn walk(tree: &Tree, first: NodeId) -> usize {
            tree.block(first)
                .filter_map(|id| tree.node(id).child)
                .map(|child| 1 + walk(tree, child))
                .max()
                .unwrap_or(0)
        }
        self.root.map_or(0, |root| walk(self, root))
    }

    pub fn add_and(&mut self) {
        self.insert(NodeKind::And);
    }

    pub fn add_or(&mut self) {
        self.insert(NodeKind::Or);
    }

    pub fn add_not(&mut self) {
        self.insert(NodeKind::Not);
    }

    pub fn add_op(&mut self, name: &str, params: &[&str]) {
        self.insert(make_op(name, params));
    }

    /// Open a block under the most recent `And`/`Or` whose first node is an `And`.
    pub fn add_child_and(&mut self) {
        self.insert_child(NodeKind::And);
    }

    pub fn add_child_or(&mut self) {
        self.insert_child(NodeKind::Or);
    }

    pub fn add_child_not(&mut self) {
        self.insert_child(NodeKind::Not);
    }

    pub fn add_child_op(&mut self, name: &str, params: &[&str]) {
        self.insert_child(make_op(name, params));
    }

    /// Return focus to the `And`/`Or` node owning the current block.
    ///
    /// # Panics
    ///
    /// Panics when the current block is the root block.
    pub fn parent(&mut self) {
        let owner = self
            .scopes
            .pop()
            .expect("parent() called with no enclosing block");
        self.current = Some(owner);
    }

    /// Release every node. The tree keeps its name but has no root afterwards.
    pub fn clean_all(&mut self) {
        self.nodes.clear();
        self.scopes.clear();
        self.root = None;
        self.current = None;
    }

    fn alloc(&mut self, kind: NodeKind, previous: Option<NodeId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("tree exceeds u32::MAX nodes"));
        self.nodes.push(Node {
            kind,
            next: None,
            previous,
            child: None,
        });
        id
    }

    fn insert(&mut self, kind: NodeKind) {
        match self.current {
            None => {
                assert!(self.root.is_none(), "tree has a root but no insertion point");
                let id = self.alloc(kind, None);
                self.root = Some(id);
                self.current = Some(id);
            }
            Some(current) => {
                assert!(
                    self.nodes[current.index()].next.is_none(),
                    "insertion point already has a successor"
                );
                let id = self.alloc(kind, Some(current));
                self.nodes[current.index()].next = Some(id);
                self.current = Some(id);
            }
        }
    }

    fn insert_child(&mut self, kind: NodeKind) {
        let owner = self
            .current
            .expect("child block requires a preceding And/Or node");
        let owner_node = &self.nodes[owner.index()];
        assert!(
            owner_node.kind.is_block(),
            "child block can only be attached to And/Or, found {}",
            owner_node.kind.label()
        );
        assert!(owner_node.child.is_none(), "And/Or node already owns a child block");
        let id = self.alloc(kind, Some(owner));
        self.nodes[owner.index()].child = Some(id);
        self.scopes.push(owner);
        self.current = Some(id);
    }
}

fn make_op(name: &str, params: &[&str]) -> NodeKind {
    NodeKind::Op(Op {
        name: name.to_owned(),
        params: params.iter().map(|p| (*p).to_owned()).collect(),
    })
}

/// Iterator over the node ids of one block.
#[derive(Debug, Clone)]
pub struct Block<'t> {
    tree: &'t Tree,
    next: Option<NodeId>,
}

impl Iterator for Block<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.node(id).next;
        Some(id)
    }
}

/// Ordered collection of trees compiled into one shared program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forest {
    trees: Vec<Tree>,
}

impl Forest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    #[must_use]
    pub fn with(mut self, tree: Tree) -> Self {
        self.trees.push(tree);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tree> {
        self.trees.iter()
    }

    pub fn clean_all(&mut self) {
        for tree in &mut self.trees {
            tree.clean_all();
        }
    }
}

impl FromIterator<Tree> for Forest {
    fn from_iter<T: IntoIterator<Item = Tree>>(iter: T) -> Self {
        Self {
            trees: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Forest {
    type Item = &'a Tree;
    type IntoIter = std::slice::Iter<'a, Tree>;

    fn into_iter(self) -> Self::IntoIter {
        self.trees.iter()
    }
}
