//! The action kernel: apply entry points, the path-code state machine, and
//! traversal dispatch.
//!
//! An action is a polymorphic operation over a scene graph. Applying one
//! seeds the kernel with a target — a node, a path, or a path list — and
//! hands control to [`Action::begin_traversal`], which walks the graph
//! depth-first through [`Action::traverse`]. Group-like nodes descend into
//! children with the `push_cur_path` family, and the kernel keeps the
//! *path code* up to date: the relation between the current position and
//! the paths the action was applied to.
//!
//! Everything an action needs at traversal time lives in its [`ActionCore`];
//! per-class data (type tag, dispatch table, enabled elements) lives in a
//! [`ActionClass`] that user code keeps in a `Lazy` static. Applying is
//! reentrant: every entry point saves and restores the applied data, so a
//! node method may apply the same action to another subgraph mid-walk.

pub mod enabled;
pub mod method_table;

pub use enabled::EnabledElementsList;
pub use method_table::{ActionMethod, ActionMethodList, null_action};

use std::any::Any;

use itertools::Itertools;
use once_cell::sync::Lazy;

use crate::element::ElementClass;
use crate::node::{NodeRef, node_addr, same_node};
use crate::path::{Path, PathList};
use crate::state::State;
use crate::types::TypeTag;

/// Where the current traversal position sits relative to the applied paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PathCode {
    /// The action was applied to a node; there are no paths.
    #[default]
    NoPath,
    /// The position lies on an applied path, above its tail.
    InPath,
    /// The position is at or below the tail of an applied path; everything
    /// underneath is visited unconditionally.
    BelowPath,
    /// The position left every applied path. Children are only entered when
    /// they affect state that on-path siblings can observe.
    OffPath,
}

/// What kind of target an action is currently applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum AppliedCode {
    /// A whole subgraph under one node.
    Node,
    /// A single path.
    Path,
    /// A list of paths.
    PathList,
}

/// The current target of a traversal.
#[derive(Clone, Debug)]
enum Applied {
    Node(NodeRef),
    Path(Path),
    PathList {
        original: PathList,
        /// The sorted, uniquified paths of the head group being traversed.
        normalized: PathList,
    },
}

impl Applied {
    fn code(&self) -> AppliedCode {
        match self {
            Applied::Node(_) => AppliedCode::Node,
            Applied::Path(_) => AppliedCode::Path,
            Applied::PathList { .. } => AppliedCode::PathList,
        }
    }
}

/// One step of the kernel's current path. Anonymous steps (no index, no
/// node) come from [`Action::push_cur_path_all`], where a group knows the
/// path code cannot change underneath it.
#[derive(Clone, Debug)]
struct CurStep {
    index: Option<usize>,
    node: Option<NodeRef>,
}

/// The kernel's lightweight current path: indices first, nodes cached where
/// known, materialized into a full [`Path`] on demand.
#[derive(Clone, Debug, Default)]
struct CurPath {
    head: Option<NodeRef>,
    steps: im::Vector<CurStep>,
}

impl CurPath {
    fn len(&self) -> usize {
        usize::from(self.head.is_some()) + self.steps.len()
    }

    fn set_head(&mut self, head: NodeRef) {
        self.head = Some(head);
        self.steps.clear();
    }

    fn materialize(&self) -> Path {
        let head = self
            .head
            .clone()
            .expect("no current path: the action is not mid-traversal");
        let mut path = Path::new(head);
        for step in self.steps.iter() {
            match (step.index, &step.node) {
                // the cached node, not a fresh lookup: the graph may have
                // been edited under the traversal since this step was pushed
                (Some(index), Some(node)) => path.append_resolved(index, node.clone()),
                // an anonymous segment ends what can be resolved
                _ => break,
            }
        }
        path
    }

    fn tail(&self) -> Option<NodeRef> {
        self.steps
            .iter()
            .rev()
            .find_map(|step| step.node.clone())
            .or_else(|| self.head.clone())
    }
}

/// Saved traversal fields, restored when an apply entry point exits.
struct SavedTraversal {
    applied: Option<Applied>,
    path_code: PathCode,
    cur_path: CurPath,
}

/// The per-instance traversal data every action carries.
#[derive(Debug)]
pub struct ActionCore {
    applied: Option<Applied>,
    path_code: PathCode,
    cur_path: CurPath,
    terminated: bool,
    state: Option<State>,
    enabled_stamp: u64,
    // per-depth scratch for path_code index derivation
    scratch: Vec<Vec<usize>>,
}

impl ActionCore {
    /// A core ready for its first apply.
    pub fn new() -> ActionCore {
        ActionCore {
            applied: None,
            path_code: PathCode::NoPath,
            cur_path: CurPath::default(),
            terminated: false,
            state: None,
            enabled_stamp: 0,
            scratch: Vec::new(),
        }
    }

    fn save(&mut self) -> SavedTraversal {
        SavedTraversal {
            applied: self.applied.clone(),
            path_code: self.path_code,
            cur_path: self.cur_path.clone(),
        }
    }

    fn restore(&mut self, saved: SavedTraversal) {
        self.applied = saved.applied;
        self.path_code = saved.path_code;
        self.cur_path = saved.cur_path;
    }

    fn seed_node(&mut self, root: &NodeRef) {
        self.applied = Some(Applied::Node(root.clone()));
        self.cur_path.set_head(root.clone());
        self.path_code = PathCode::NoPath;
    }

    fn seed_path(&mut self, path: Path) {
        self.path_code = if path.len() > 1 {
            PathCode::InPath
        } else {
            PathCode::BelowPath
        };
        self.cur_path.set_head(path.head().clone());
        self.applied = Some(Applied::Path(path));
    }

    fn seed_path_group(&mut self, original: PathList, group: PathList) {
        let head = group[0].head().clone();
        self.path_code = if group[0].len() > 1 {
            PathCode::InPath
        } else {
            PathCode::BelowPath
        };
        self.cur_path.set_head(head);
        self.applied = Some(Applied::PathList {
            original,
            normalized: group,
        });
    }

    fn ensure_state(&mut self, class: &ActionClass) {
        let version = enabled::current_version();
        if self.state.is_none() || self.enabled_stamp != version {
            self.state = Some(State::from_slots(class.merged_enabled_slots()));
            self.enabled_stamp = version;
        }
    }

    fn push_step(&mut self, index: usize, node: &NodeRef) {
        self.cur_path.steps.push_back(CurStep {
            index: Some(index),
            node: Some(node.clone()),
        });
        if self.path_code == PathCode::InPath {
            self.path_code = self.code_after_push(index);
        }
    }

    fn code_after_push(&self, index: usize) -> PathCode {
        let curlen = self.cur_path.len();
        match &self.applied {
            Some(Applied::Path(target)) => {
                if curlen > target.len() || target.get_index(curlen - 1) != index {
                    PathCode::OffPath
                } else if curlen == target.len() {
                    PathCode::BelowPath
                } else {
                    PathCode::InPath
                }
            }
            Some(Applied::PathList { normalized, .. }) => {
                match normalized.iter().find(|p| self.path_contains_cur(p)) {
                    None => PathCode::OffPath,
                    Some(p) if p.len() == curlen => PathCode::BelowPath,
                    Some(_) => PathCode::InPath,
                }
            }
            _ => self.path_code,
        }
    }

    /// Whether the current path is a prefix of `path`.
    fn path_contains_cur(&self, path: &Path) -> bool {
        let Some(head) = &self.cur_path.head else {
            return false;
        };
        if path.len() < self.cur_path.len() || !same_node(path.head(), head) {
            return false;
        }
        self.cur_path.steps.iter().enumerate().all(|(k, step)| {
            step.index == Some(path.get_index(k + 1))
                && step
                    .node
                    .as_ref()
                    .is_none_or(|n| same_node(n, &path.get_node(k + 1)))
        })
    }

    fn compute_path_code(&mut self) -> (PathCode, &[usize]) {
        if self.path_code != PathCode::InPath {
            return (self.path_code, &[]);
        }
        let curlen = self.cur_path.len();
        let mut indices = Vec::new();
        match &self.applied {
            Some(Applied::Path(target)) => {
                indices.push(target.get_index(curlen));
            }
            Some(Applied::PathList { normalized, .. }) => {
                for path in normalized.iter() {
                    if path.len() > curlen && self.path_contains_cur(path) {
                        let index = path.get_index(curlen);
                        if !indices.contains(&index) {
                            indices.push(index);
                        }
                    }
                }
            }
            _ => {}
        }
        let depth = self.cur_path.steps.len();
        if self.scratch.len() <= depth {
            self.scratch.resize(depth + 1, Vec::new());
        }
        self.scratch[depth] = indices;
        (PathCode::InPath, &self.scratch[depth])
    }
}

impl Default for ActionCore {
    fn default() -> Self {
        ActionCore::new()
    }
}

/// Per-class data of an action: runtime type, parent class, dispatch table
/// and enabled elements. Instances live for the whole process, typically in
/// a `Lazy` static.
pub struct ActionClass {
    tag: TypeTag,
    parent: Option<&'static ActionClass>,
    methods: ActionMethodList,
    enabled: EnabledElementsList,
}

impl ActionClass {
    /// The root class every action class derives from.
    pub fn base() -> &'static ActionClass {
        static BASE: Lazy<ActionClass> = Lazy::new(|| ActionClass {
            tag: TypeTag::create("Action", TypeTag::bad()),
            parent: None,
            methods: ActionMethodList::new(),
            enabled: EnabledElementsList::new(),
        });
        Lazy::force(&BASE)
    }

    /// Register a new action class deriving from `parent`.
    pub fn new(name: &str, parent: &'static ActionClass) -> ActionClass {
        ActionClass {
            tag: TypeTag::create(name, parent.tag),
            parent: Some(parent),
            methods: ActionMethodList::new(),
            enabled: EnabledElementsList::new(),
        }
    }

    /// The runtime type of this class.
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The parent class, absent only on [`ActionClass::base`].
    pub fn parent(&self) -> Option<&'static ActionClass> {
        self.parent
    }

    /// Register the method run when this action traverses a node of
    /// `node_class` (or of a derived class with no closer registration).
    pub fn add_method(&self, node_class: crate::node::NodeClass, method: ActionMethod) {
        self.methods.add(node_class, method);
    }

    /// Declare that traversals of this action need `element`.
    pub fn enable_element(&self, element: ElementClass) {
        self.enabled.enable(element);
    }

    /// Build the dispatch table if it is missing or stale.
    pub fn set_up(&self) {
        self.methods.set_up(&self.ancestry());
    }

    pub(crate) fn method_list(&self) -> &ActionMethodList {
        &self.methods
    }

    pub(crate) fn dispatch(&self, node_class: crate::node::NodeClass) -> ActionMethod {
        self.methods.lookup(&self.ancestry(), node_class)
    }

    /// Ancestor chain ordered root-first, ending in `self`.
    fn ancestry(&self) -> Vec<&ActionClass> {
        let mut chain = vec![self];
        let mut cur = self.parent;
        while let Some(class) = cur {
            chain.push(class);
            cur = class.parent;
        }
        chain.reverse();
        chain
    }

    /// The effective enabled-element slots: the union over the ancestry.
    pub(crate) fn merged_enabled_slots(&self) -> Vec<Option<TypeTag>> {
        let mut slots = Vec::new();
        for class in self.ancestry() {
            class.enabled.collect_into(&mut slots);
        }
        slots
    }
}

/// A polymorphic traversal operation over a scene graph.
///
/// Implementations supply three accessors and may override the traversal
/// hooks; everything else is the kernel surface, provided. The kernel calls
/// node methods with `&mut dyn Action`, and [`dyn Action::downcast_mut`]
/// recovers the concrete action inside them.
pub trait Action: Any + Send {
    /// The class this action instance belongs to.
    fn class(&self) -> &'static ActionClass;

    /// The kernel data this instance carries.
    fn core(&self) -> &ActionCore;

    /// Mutable access to the kernel data.
    fn core_mut(&mut self) -> &mut ActionCore;

    /// `self`, as a trait object. Implementations write `self` and nothing
    /// else; the kernel needs it to route provided methods through dynamic
    /// dispatch.
    fn as_dyn_mut(&mut self) -> &mut dyn Action;

    /// First traversal hook; the default just traverses the root. Override
    /// for one-time setup that must run once per apply (it is *not* invoked
    /// by the `switch_to_*` reentry paths).
    fn begin_traversal(&mut self, root: &NodeRef) {
        self.as_dyn_mut().traverse(root);
    }

    /// Counterpart of [`Action::begin_traversal`], run after the traversal
    /// of each applied target.
    fn end_traversal(&mut self, _root: &NodeRef) {}

    /// Whether path lists applied to this action may be compacted. The
    /// kernel takes this as a hint only; containment queries are always
    /// linear scans.
    fn should_compact_path_list(&self) -> bool {
        true
    }

    // --- apply entry points -------------------------------------------------

    /// Apply this action to the graph under `root`.
    fn apply(&mut self, root: &NodeRef) {
        run_apply_node(self.as_dyn_mut(), root);
    }

    /// Apply this action along a single path.
    fn apply_to_path(&mut self, path: &Path) {
        run_apply_path(self.as_dyn_mut(), path);
    }

    /// Apply this action to a list of paths.
    ///
    /// When `obeys_rules` is true the caller asserts the list is already
    /// sorted in traversal order, duplicate-free, and prefix-free; otherwise
    /// the kernel normalizes a copy first. Multi-head lists traverse one
    /// head group at a time, in sorted order, stopping at a group boundary
    /// once terminated.
    fn apply_to_path_list(&mut self, paths: &PathList, obeys_rules: bool) {
        run_apply_path_list(self.as_dyn_mut(), paths, obeys_rules);
    }

    // --- traversal ----------------------------------------------------------

    /// Dispatch `node` to this action's method for the node's class.
    fn traverse(&mut self, node: &NodeRef) {
        let method = self.class().dispatch(node.class());
        method(self.as_dyn_mut(), node);
    }

    /// Re-seed the kernel to traverse `path`, run the traversal, and restore
    /// the previous applied data. Unlike the apply entry points this does
    /// not invoke [`Action::begin_traversal`].
    fn switch_to_path_traversal(&mut self, path: &Path) {
        let saved = self.core_mut().save();
        self.core_mut().seed_path(path.clone());
        let head = path.head().clone();
        self.as_dyn_mut().traverse(&head);
        self.core_mut().restore(saved);
    }

    /// Like [`Action::switch_to_path_traversal`], for a whole subgraph.
    fn switch_to_node_traversal(&mut self, node: &NodeRef) {
        let saved = self.core_mut().save();
        self.core_mut().seed_node(node);
        self.as_dyn_mut().traverse(node);
        self.core_mut().restore(saved);
    }

    // --- current path -------------------------------------------------------

    /// The current path code.
    fn cur_path_code(&self) -> PathCode {
        self.core().path_code
    }

    /// The current position as a full path.
    fn cur_path(&self) -> Path {
        self.core().cur_path.materialize()
    }

    /// The deepest resolved node of the current path.
    fn cur_path_tail(&self) -> Option<NodeRef> {
        self.core().cur_path.tail()
    }

    /// The current code and, when [`PathCode::InPath`], the child indices at
    /// the current position that lie on an applied path.
    fn path_code(&mut self) -> (PathCode, &[usize]) {
        self.core_mut().compute_path_code()
    }

    /// Record descent into the child at `index` and update the path code.
    /// Returns the code from before the push, to be handed back to
    /// [`Action::pop_cur_path`].
    fn push_cur_path(&mut self, index: usize, child: &NodeRef) -> PathCode {
        let core = self.core_mut();
        let prev = core.path_code;
        core.push_step(index, child);
        prev
    }

    /// Record an anonymous descent, for groups that know the code cannot
    /// change below them. Balanced by [`Action::pop_cur_path_all`].
    fn push_cur_path_all(&mut self) {
        self.core_mut().cur_path.steps.push_back(CurStep {
            index: None,
            node: None,
        });
    }

    /// Replace the innermost step when moving between siblings, updating the
    /// path code as a push would.
    fn pop_push_cur_path(&mut self, index: usize, child: &NodeRef) {
        let core = self.core_mut();
        core.cur_path.steps.pop_back();
        core.push_step(index, child);
    }

    /// Undo one [`Action::push_cur_path`], restoring the code it returned.
    fn pop_cur_path(&mut self, prev: PathCode) {
        let core = self.core_mut();
        core.cur_path.steps.pop_back();
        core.path_code = prev;
    }

    /// Undo one [`Action::push_cur_path_all`].
    fn pop_cur_path_all(&mut self) {
        self.core_mut().cur_path.steps.pop_back();
    }

    // --- state --------------------------------------------------------------

    /// The traversal state, created on first use from the class's enabled
    /// elements.
    fn state(&mut self) -> &mut State {
        let class = self.class();
        let core = self.core_mut();
        core.ensure_state(class);
        core.state.as_mut().unwrap()
    }

    /// Drop the traversal state; the next apply builds a fresh one.
    fn invalidate_state(&mut self) {
        self.core_mut().state = None;
    }

    // --- termination --------------------------------------------------------

    /// Whether the traversal was cooperatively terminated.
    fn has_terminated(&self) -> bool {
        self.core().terminated
    }

    /// Request cooperative termination. Group nodes and the path-list group
    /// loop poll for this; the kernel itself never aborts a running method.
    fn set_terminated(&mut self, terminated: bool) {
        self.core_mut().terminated = terminated;
    }

    // --- applied data -------------------------------------------------------

    /// What kind of target the action is currently applied to.
    fn what_applied_to(&self) -> Option<AppliedCode> {
        self.core().applied.as_ref().map(Applied::code)
    }

    /// The node applied to, when applied to a node.
    fn node_applied_to(&self) -> Option<NodeRef> {
        match &self.core().applied {
            Some(Applied::Node(node)) => Some(node.clone()),
            _ => None,
        }
    }

    /// The path applied to, when applied to a path.
    fn path_applied_to(&self) -> Option<Path> {
        match &self.core().applied {
            Some(Applied::Path(path)) => Some(path.clone()),
            _ => None,
        }
    }

    /// The normalized paths of the head group being traversed.
    fn path_list_applied_to(&self) -> Option<PathList> {
        match &self.core().applied {
            Some(Applied::PathList { normalized, .. }) => Some(normalized.clone()),
            _ => None,
        }
    }

    /// The path list exactly as the caller passed it.
    fn original_path_list_applied_to(&self) -> Option<PathList> {
        match &self.core().applied {
            Some(Applied::PathList { original, .. }) => Some(original.clone()),
            _ => None,
        }
    }
}

impl dyn Action {
    /// Downcast to a concrete action type.
    pub fn downcast_ref<T: Action>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }

    /// Downcast to a concrete action type, mutably.
    pub fn downcast_mut<T: Action>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut()
    }
}

fn run_apply_node(action: &mut dyn Action, root: &NodeRef) {
    // pin the root for the duration of the traversal
    let root = root.clone();
    let saved = action.core_mut().save();
    let class = action.class();
    class.set_up();
    tracing::trace!(action = %class.tag(), "apply to node");
    action.set_terminated(false);
    action.core_mut().ensure_state(class);
    action.core_mut().seed_node(&root);
    action.begin_traversal(&root);
    action.end_traversal(&root);
    action.core_mut().restore(saved);
}

fn run_apply_path(action: &mut dyn Action, path: &Path) {
    let path = path.clone();
    let saved = action.core_mut().save();
    let class = action.class();
    class.set_up();
    tracing::trace!(action = %class.tag(), "apply to path");
    action.set_terminated(false);
    action.core_mut().ensure_state(class);
    let head = path.head().clone();
    action.core_mut().seed_path(path);
    action.begin_traversal(&head);
    action.end_traversal(&head);
    action.core_mut().restore(saved);
}

fn run_apply_path_list(action: &mut dyn Action, paths: &PathList, obeys_rules: bool) {
    if paths.is_empty() {
        return;
    }
    let original = paths.clone();
    let normalized = if obeys_rules {
        original.clone()
    } else {
        let mut list = original.clone();
        list.sort();
        list.uniquify();
        list
    };

    let saved = action.core_mut().save();
    let class = action.class();
    class.set_up();
    tracing::trace!(
        action = %class.tag(),
        paths = normalized.len(),
        "apply to path list"
    );
    action.set_terminated(false);
    action.core_mut().ensure_state(class);

    // one traversal per head group, in sorted order
    let mut groups: Vec<PathList> = Vec::new();
    for (_, chunk) in &normalized.iter().chunk_by(|path| node_addr(path.head())) {
        groups.push(chunk.cloned().collect());
    }
    for group in groups {
        let head = group[0].head().clone();
        tracing::trace!(paths = group.len(), "traversing head group");
        action.core_mut().seed_path_group(original.clone(), group);
        action.begin_traversal(&head);
        action.end_traversal(&head);
        if action.has_terminated() {
            break;
        }
    }
    action.core_mut().restore(saved);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use once_cell::sync::Lazy;

    use super::*;
    use crate::node::{ChildList, Node, NodeClass, base_class, register_node_class};

    #[derive(Debug)]
    enum SwitchTo {
        Nothing,
        Node(NodeRef),
        Path(Path),
    }

    #[derive(Debug)]
    struct TNode {
        name: &'static str,
        children: ChildList,
        switch_to: SwitchTo,
    }

    impl TNode {
        fn class() -> NodeClass {
            static CLASS: Lazy<NodeClass> =
                Lazy::new(|| register_node_class("ActionTestNode", base_class()));
            *CLASS
        }

        fn leaf(name: &'static str) -> NodeRef {
            TNode::group(name, [])
        }

        fn group(name: &'static str, children: impl IntoIterator<Item = NodeRef>) -> NodeRef {
            Arc::new(TNode {
                name,
                children: children.into_iter().collect(),
                switch_to: SwitchTo::Nothing,
            })
        }

        fn switcher(name: &'static str, switch_to: SwitchTo) -> NodeRef {
            Arc::new(TNode {
                name,
                children: ChildList::new(),
                switch_to,
            })
        }
    }

    impl Node for TNode {
        fn class(&self) -> NodeClass {
            TNode::class()
        }

        fn children(&self) -> Option<&ChildList> {
            Some(&self.children)
        }
    }

    struct Recorder {
        core: ActionCore,
        log: Vec<(&'static str, PathCode)>,
        begins: usize,
    }

    impl Recorder {
        fn new() -> Recorder {
            Recorder {
                core: ActionCore::new(),
                log: Vec::new(),
                begins: 0,
            }
        }

        fn names(&self) -> Vec<&'static str> {
            self.log.iter().map(|(name, _)| *name).collect()
        }
    }

    /// Prunes a (parent, child index) from the live graph when visited, then
    /// checks the current path still names the nodes actually traversed.
    #[derive(Debug)]
    struct Mutator {
        name: &'static str,
        prune: OnceLock<(NodeRef, usize)>,
    }

    impl Mutator {
        fn class() -> NodeClass {
            static CLASS: Lazy<NodeClass> =
                Lazy::new(|| register_node_class("ActionTestMutator", base_class()));
            *CLASS
        }
    }

    impl Node for Mutator {
        fn class(&self) -> NodeClass {
            Mutator::class()
        }
    }

    static RECORDER: Lazy<ActionClass> = Lazy::new(|| {
        let class = ActionClass::new("RecorderAction", ActionClass::base());
        class.add_method(TNode::class(), visit);
        class.add_method(Mutator::class(), visit_mutator);
        class
    });

    impl Action for Recorder {
        fn class(&self) -> &'static ActionClass {
            Lazy::force(&RECORDER)
        }

        fn core(&self) -> &ActionCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ActionCore {
            &mut self.core
        }

        fn as_dyn_mut(&mut self) -> &mut dyn Action {
            self
        }

        fn begin_traversal(&mut self, root: &NodeRef) {
            self.begins += 1;
            self.as_dyn_mut().traverse(root);
        }
    }

    fn visit(action: &mut dyn Action, node: &NodeRef) {
        let tnode = node.downcast_ref::<TNode>().unwrap();
        let code = action.cur_path_code();
        action
            .downcast_mut::<Recorder>()
            .unwrap()
            .log
            .push((tnode.name, code));

        match &tnode.switch_to {
            SwitchTo::Nothing => {}
            SwitchTo::Node(target) => {
                let before = (action.cur_path(), action.cur_path_code());
                action.switch_to_node_traversal(&target.clone());
                assert_eq!(before, (action.cur_path(), action.cur_path_code()));
            }
            SwitchTo::Path(target) => {
                let before = (action.cur_path(), action.cur_path_code());
                action.switch_to_path_traversal(&target.clone());
                assert_eq!(before, (action.cur_path(), action.cur_path_code()));
            }
        }
        tnode.children.traverse(action);
    }

    fn visit_mutator(action: &mut dyn Action, node: &NodeRef) {
        let mutator = node.downcast_ref::<Mutator>().unwrap();
        let code = action.cur_path_code();
        action
            .downcast_mut::<Recorder>()
            .unwrap()
            .log
            .push((mutator.name, code));

        if let Some((parent, index)) = mutator.prune.get() {
            parent.children().unwrap().remove(*index);
        }
        // the current path materializes from the nodes the traversal went
        // through, not from the freshly edited child lists
        let path = action.cur_path();
        assert!(crate::node::same_node(
            &path.get_node(path.len() - 1),
            node
        ));
    }

    #[test]
    fn switching_to_a_node_traversal_does_not_rerun_begin() {
        let other = TNode::group("other", [TNode::leaf("other_leaf")]);
        let root = TNode::group(
            "root",
            [
                TNode::switcher("switch", SwitchTo::Node(other)),
                TNode::leaf("tail"),
            ],
        );
        let mut recorder = Recorder::new();
        recorder.apply(&root);
        assert_eq!(
            recorder.names(),
            ["root", "switch", "other", "other_leaf", "tail"]
        );
        assert_eq!(recorder.begins, 1);
    }

    #[test]
    fn cur_path_survives_graph_edits_mid_traversal() {
        let victim = TNode::leaf("victim");
        let mutator: NodeRef = Arc::new(Mutator {
            name: "mutator",
            prune: OnceLock::new(),
        });
        let root = TNode::group("root", [victim, mutator.clone()]);
        mutator
            .downcast_ref::<Mutator>()
            .unwrap()
            .prune
            .set((root.clone(), 0))
            .unwrap();

        let mut recorder = Recorder::new();
        recorder.apply(&root);
        assert_eq!(recorder.names(), ["root", "victim", "mutator"]);
        assert_eq!(root.children().unwrap().len(), 1);
    }

    #[test]
    fn switching_to_a_path_traversal_follows_the_path() {
        let stray = TNode::leaf("stray");
        let target = TNode::leaf("target");
        let other = TNode::group("other", [stray, target.clone()]);
        let mut path = Path::new(other.clone());
        path.append(&target);

        let root = TNode::group("root", [TNode::switcher("switch", SwitchTo::Path(path))]);
        let mut recorder = Recorder::new();
        recorder.apply(&root);
        // the stray sibling is off the switched-to path: visited (it could
        // affect state) but never descended into
        assert_eq!(
            recorder.names(),
            ["root", "switch", "other", "stray", "target"]
        );
        assert_eq!(
            &recorder.log[2..],
            &[
                ("other", PathCode::InPath),
                ("stray", PathCode::OffPath),
                ("target", PathCode::BelowPath),
            ]
        );
    }
}
