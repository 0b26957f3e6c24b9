//! Scene-graph nodes and node classes.
//!
//! The kernel knows nothing about what concrete nodes *mean* — geometry,
//! transforms, lights live outside it. What it needs from a node is its
//! [`NodeClass`] (for dispatch), its children (for descent) and whether it
//! affects traversal state (for off-path pruning). Node classes register
//! once per process and receive a dense action-method index that every
//! action's dispatch table is keyed by.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::action::{Action, PathCode};
use crate::types::TypeTag;

/// A shared handle to a node. Cloning one pins the node for as long as the
/// clone lives, which is how traversal keeps its inputs alive.
pub type NodeRef = Arc<dyn Node>;

/// The capability set of a scene-graph node, as seen by the kernel.
pub trait Node: Any + Debug + Send + Sync {
    /// The class this node was built from.
    fn class(&self) -> NodeClass;

    /// The node's children, when it is group-like.
    fn children(&self) -> Option<&ChildList> {
        None
    }

    /// Whether traversing this node can change state elements that matter to
    /// its siblings. Nodes answering `false` are skipped entirely when the
    /// traversal is off every applied path.
    fn affects_state(&self) -> bool {
        true
    }
}

impl dyn Node {
    /// Downcast a shared node reference to its concrete class.
    pub fn downcast_ref<T: Node>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }
}

/// Identity comparison between node handles.
pub fn same_node(a: &NodeRef, b: &NodeRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A stable per-process identity for a node, used to order path heads.
pub(crate) fn node_addr(node: &NodeRef) -> usize {
    Arc::as_ptr(node) as *const () as usize
}

/// The dense index node classes are dispatched by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodIndex(usize);

impl MethodIndex {
    /// The raw table slot.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Identity of a registered node class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeClass {
    tag: TypeTag,
    method_index: MethodIndex,
}

impl NodeClass {
    /// The runtime type of this node class.
    pub fn tag(self) -> TypeTag {
        self.tag
    }

    /// The action-method index assigned at registration.
    pub fn method_index(self) -> MethodIndex {
        self.method_index
    }
}

pub(crate) struct NodeClassInfo {
    pub tag: TypeTag,
    pub parent: Option<MethodIndex>,
}

struct NodeRegistry {
    by_tag: HashMap<TypeTag, MethodIndex>,
    infos: Vec<NodeClassInfo>,
}

static NODES: Lazy<RwLock<NodeRegistry>> = Lazy::new(|| {
    RwLock::new(NodeRegistry {
        by_tag: HashMap::new(),
        infos: Vec::new(),
    })
});

static NODE_VERSION: AtomicU64 = AtomicU64::new(0);

/// The root node class every other node class derives from.
pub fn base_class() -> NodeClass {
    static BASE: Lazy<NodeClass> =
        Lazy::new(|| register_with_parent("Node", TypeTag::bad(), None));
    *BASE
}

/// Register a node class, assigning it an action-method index.
///
/// Idempotent by name; parents must be registered first, which keeps the
/// method-index order topological and lets dispatch tables resolve node
/// inheritance in a single pass.
pub fn register_node_class(name: &str, parent: NodeClass) -> NodeClass {
    register_with_parent(name, parent.tag, Some(parent.method_index))
}

fn register_with_parent(name: &str, parent_tag: TypeTag, parent: Option<MethodIndex>) -> NodeClass {
    let tag = TypeTag::create(name, parent_tag);
    let mut reg = NODES.write();
    if let Some(&method_index) = reg.by_tag.get(&tag) {
        return NodeClass { tag, method_index };
    }
    let method_index = MethodIndex(reg.infos.len());
    reg.by_tag.insert(tag, method_index);
    reg.infos.push(NodeClassInfo { tag, parent });
    NODE_VERSION.fetch_add(1, Ordering::SeqCst);
    tracing::trace!(name, index = method_index.0, "registered node class");
    NodeClass { tag, method_index }
}

/// Current node-registry version; dispatch tables rebuild when it moves.
pub(crate) fn registry_version() -> u64 {
    NODE_VERSION.load(Ordering::SeqCst)
}

/// Run `f` against the registered node-class records.
pub(crate) fn with_registry<R>(f: impl FnOnce(&[NodeClassInfo]) -> R) -> R {
    f(&NODES.read().infos)
}

/// Interior-mutable child storage for group-like nodes.
///
/// Children are held in an [`im::Vector`], so traversal takes an O(1)
/// snapshot and stays well-defined even when an action method edits the
/// graph mid-walk.
#[derive(Debug, Default)]
pub struct ChildList {
    children: RwLock<im::Vector<NodeRef>>,
}

impl ChildList {
    /// An empty child list.
    pub fn new() -> ChildList {
        ChildList::default()
    }

    /// The number of children.
    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    /// Whether there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    /// Append a child.
    pub fn append(&self, child: NodeRef) {
        self.children.write().push_back(child);
    }

    /// Insert a child at `index`.
    pub fn insert(&self, index: usize, child: NodeRef) {
        self.children.write().insert(index, child);
    }

    /// Remove and return the child at `index`.
    pub fn remove(&self, index: usize) -> NodeRef {
        self.children.write().remove(index)
    }

    /// The child at `index`, if any.
    pub fn get(&self, index: usize) -> Option<NodeRef> {
        self.children.read().get(index).cloned()
    }

    /// The index of `child`, by identity.
    pub fn index_of(&self, child: &NodeRef) -> Option<usize> {
        self.children.read().iter().position(|c| same_node(c, child))
    }

    /// A cheap snapshot of the current children.
    pub fn snapshot(&self) -> im::Vector<NodeRef> {
        self.children.read().clone()
    }

    /// Traverse all children under the action's current path code.
    pub fn traverse(&self, action: &mut dyn Action) {
        let len = self.len();
        if len > 0 {
            self.traverse_range(action, 0, len - 1);
        }
    }

    /// Traverse the children in `first..=last`, honoring the path-code state
    /// machine and polling for cooperative termination between children.
    pub fn traverse_range(&self, action: &mut dyn Action, first: usize, last: usize) {
        let children = self.snapshot();
        if children.is_empty() || first >= children.len() {
            return;
        }
        let last = last.min(children.len() - 1);

        match action.cur_path_code() {
            PathCode::NoPath | PathCode::BelowPath => {
                // every child is visited; the code cannot change down here
                action.push_cur_path_all();
                for (i, child) in children.iter().enumerate().take(last + 1).skip(first) {
                    if action.has_terminated() {
                        break;
                    }
                    action.pop_push_cur_path(i, child);
                    action.traverse(child);
                }
                action.pop_cur_path_all();
            }
            PathCode::OffPath => {
                for (i, child) in children.iter().enumerate().take(last + 1).skip(first) {
                    if action.has_terminated() {
                        break;
                    }
                    if child.affects_state() {
                        let prev = action.push_cur_path(i, child);
                        action.traverse(child);
                        action.pop_cur_path(prev);
                    }
                }
            }
            PathCode::InPath => {
                let on_path = action.path_code().1.to_vec();
                let Some(&last_on_path) = on_path.last() else {
                    return;
                };
                // children past the last on-path index cannot influence
                // anything on the paths
                for (i, child) in children
                    .iter()
                    .enumerate()
                    .take(last.min(last_on_path) + 1)
                    .skip(first)
                {
                    if action.has_terminated() {
                        break;
                    }
                    if !on_path.contains(&i) && !child.affects_state() {
                        continue;
                    }
                    let prev = action.push_cur_path(i, child);
                    action.traverse(child);
                    action.pop_cur_path(prev);
                }
            }
        }
    }
}

impl FromIterator<NodeRef> for ChildList {
    fn from_iter<I: IntoIterator<Item = NodeRef>>(iter: I) -> ChildList {
        ChildList {
            children: RwLock::new(iter.into_iter().collect()),
        }
    }
}
