//! Ready-made node, element and action classes for exercising the kernel.
//!
//! None of these are part of the kernel proper — they are the smallest
//! working set of each kind of class: a [`Group`] that traverses its
//! children, a [`Separator`] that scopes the state around them, a [`Shape`]
//! leaf that affects nothing, a [`Tint`] leaf writing a [`TintElement`], and
//! a [`CollectAction`] recording what a traversal visits and under which
//! path code.
//!
//! ```
//! use canopy::prelude::*;
//! use canopy::example_scenes::*;
//!
//! let scene = Group::new("root", [Tint::new("red", 0xff0000), Shape::new("cube")]);
//! let mut collect = CollectAction::new();
//! collect.apply(&scene);
//! assert_eq!(collect.names(), ["root", "red", "cube"]);
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::element;
use crate::prelude::*;

/// A color carried along the traversal, written by [`Tint`] nodes.
#[derive(Clone, Debug, Default)]
pub struct TintElement {
    /// Packed RGB.
    pub color: u32,
}

impl TintElement {
    /// The registered element class.
    pub fn class() -> ElementClass {
        static CLASS: Lazy<ElementClass> = Lazy::new(|| {
            register_element_class("TintElement", element::base_tag(), || {
                Box::new(TintElement::default())
            })
        });
        *CLASS
    }

    /// The color currently in effect.
    pub fn current(state: &mut State) -> u32 {
        state
            .get(Self::class().stack_index())
            .downcast_ref::<TintElement>()
            .map(|el| el.color)
            .unwrap_or_default()
    }
}

impl Element for TintElement {
    fn class(&self) -> ElementClass {
        TintElement::class()
    }

    fn matches(&self, other: &dyn Element) -> bool {
        other
            .downcast_ref::<TintElement>()
            .is_some_and(|o| o.color == self.color)
    }

    fn clone_boxed(&self) -> BoxedElement {
        Box::new(self.clone())
    }
}

/// A plain group: traverses its children under the current path code.
#[derive(Debug)]
pub struct Group {
    name: String,
    children: ChildList,
}

impl Group {
    /// The registered node class.
    pub fn class() -> NodeClass {
        static CLASS: Lazy<NodeClass> = Lazy::new(|| register_node_class("Group", base_class()));
        *CLASS
    }

    /// A group with the given children.
    pub fn new(name: &str, children: impl IntoIterator<Item = NodeRef>) -> NodeRef {
        Arc::new(Group {
            name: name.to_string(),
            children: children.into_iter().collect(),
        })
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The children.
    pub fn children(&self) -> &ChildList {
        &self.children
    }
}

impl Node for Group {
    fn class(&self) -> NodeClass {
        Group::class()
    }

    fn children(&self) -> Option<&ChildList> {
        Some(&self.children)
    }
}

/// A group that opens a state scope around its children, so nothing they
/// write leaks to later siblings.
#[derive(Debug)]
pub struct Separator {
    name: String,
    children: ChildList,
}

impl Separator {
    /// The registered node class, derived from [`Group`].
    pub fn class() -> NodeClass {
        static CLASS: Lazy<NodeClass> =
            Lazy::new(|| register_node_class("Separator", Group::class()));
        *CLASS
    }

    /// A separator with the given children.
    pub fn new(name: &str, children: impl IntoIterator<Item = NodeRef>) -> NodeRef {
        Arc::new(Separator {
            name: name.to_string(),
            children: children.into_iter().collect(),
        })
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Node for Separator {
    fn class(&self) -> NodeClass {
        Separator::class()
    }

    fn children(&self) -> Option<&ChildList> {
        Some(&self.children)
    }

    // whatever happens inside stays inside
    fn affects_state(&self) -> bool {
        false
    }
}

/// A leaf standing in for geometry. Reads state, never writes it.
#[derive(Debug)]
pub struct Shape {
    name: String,
}

impl Shape {
    /// The registered node class.
    pub fn class() -> NodeClass {
        static CLASS: Lazy<NodeClass> = Lazy::new(|| register_node_class("Shape", base_class()));
        *CLASS
    }

    /// A shape leaf.
    pub fn new(name: &str) -> NodeRef {
        Arc::new(Shape {
            name: name.to_string(),
        })
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Node for Shape {
    fn class(&self) -> NodeClass {
        Shape::class()
    }

    fn affects_state(&self) -> bool {
        false
    }
}

/// A leaf that writes the [`TintElement`], affecting every later sibling.
#[derive(Debug)]
pub struct Tint {
    name: String,
    color: u32,
}

impl Tint {
    /// The registered node class.
    pub fn class() -> NodeClass {
        static CLASS: Lazy<NodeClass> = Lazy::new(|| register_node_class("Tint", base_class()));
        *CLASS
    }

    /// A tint leaf.
    pub fn new(name: &str, color: u32) -> NodeRef {
        Arc::new(Tint {
            name: name.to_string(),
            color,
        })
    }

    /// The display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Node for Tint {
    fn class(&self) -> NodeClass {
        Tint::class()
    }
}

/// Records every node a traversal visits, together with the path code it
/// was visited under. The workhorse of the integration tests.
pub struct CollectAction {
    core: ActionCore,
    /// Visit order: node name and the code at visit time.
    pub visited: Vec<(String, PathCode)>,
    /// For every in-path visit, the on-path child indices reported by
    /// [`Action::path_code`].
    pub in_path_indices: Vec<(String, Vec<usize>)>,
    /// Terminate the traversal after visiting this node.
    pub stop_at: Option<String>,
    /// On visiting the named node, re-apply this action to the given root.
    pub reapply_at: Option<(String, NodeRef)>,
    /// For each re-apply performed: whether the applied data and current
    /// path came back intact.
    pub reentry_restored: Vec<bool>,
}

static COLLECT: Lazy<ActionClass> = Lazy::new(|| {
    let class = ActionClass::new("CollectAction", ActionClass::base());
    class.add_method(Group::class(), collect_group);
    class.add_method(Separator::class(), collect_separator);
    class.add_method(Shape::class(), collect_shape);
    class.add_method(Tint::class(), collect_tint);
    class.enable_element(TintElement::class());
    class
});

impl CollectAction {
    /// A fresh collector.
    pub fn new() -> CollectAction {
        CollectAction {
            core: ActionCore::new(),
            visited: Vec::new(),
            in_path_indices: Vec::new(),
            stop_at: None,
            reapply_at: None,
            reentry_restored: Vec::new(),
        }
    }

    /// Terminate the traversal after visiting the node named `name`.
    pub fn stop_at(mut self, name: &str) -> CollectAction {
        self.stop_at = Some(name.to_string());
        self
    }

    /// Re-apply to `root` from inside the visit of the node named `name`.
    pub fn reapply_at(mut self, name: &str, root: &NodeRef) -> CollectAction {
        self.reapply_at = Some((name.to_string(), root.clone()));
        self
    }

    /// Just the visited names, in order.
    pub fn names(&self) -> Vec<String> {
        self.visited.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Default for CollectAction {
    fn default() -> Self {
        CollectAction::new()
    }
}

impl Action for CollectAction {
    fn class(&self) -> &'static ActionClass {
        Lazy::force(&COLLECT)
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
}

/// Record the visit; returns false when the traversal should stop here.
fn note(action: &mut dyn Action, name: &str) -> bool {
    let code = action.cur_path_code();
    let indices = (code == PathCode::InPath).then(|| action.path_code().1.to_vec());
    let mut stop = false;
    let mut reapply = None;
    if let Some(collect) = action.downcast_mut::<CollectAction>() {
        collect.visited.push((name.to_string(), code));
        if let Some(indices) = indices {
            collect.in_path_indices.push((name.to_string(), indices));
        }
        stop = collect.stop_at.as_deref() == Some(name);
        if let Some((at, root)) = &collect.reapply_at {
            if at == name {
                reapply = Some(root.clone());
            }
        }
    }
    if stop {
        action.set_terminated(true);
        return false;
    }
    if let Some(root) = reapply {
        let before = observe(action);
        action.apply(&root);
        let restored = observe(action) == before;
        if let Some(collect) = action.downcast_mut::<CollectAction>() {
            collect.reentry_restored.push(restored);
        }
    }
    true
}

fn observe(action: &dyn Action) -> (Option<AppliedCode>, PathCode, Path) {
    (
        action.what_applied_to(),
        action.cur_path_code(),
        action.cur_path(),
    )
}

fn collect_group(action: &mut dyn Action, node: &NodeRef) {
    let Some(group) = node.downcast_ref::<Group>() else {
        return;
    };
    if !note(action, group.name()) {
        return;
    }
    group.children().traverse(action);
}

fn collect_separator(action: &mut dyn Action, node: &NodeRef) {
    let Some(sep) = node.downcast_ref::<Separator>() else {
        return;
    };
    if !note(action, sep.name()) {
        return;
    }
    action.state().push();
    sep.children.traverse(action);
    action.state().pop();
}

fn collect_shape(action: &mut dyn Action, node: &NodeRef) {
    if let Some(shape) = node.downcast_ref::<Shape>() {
        note(action, shape.name());
    }
}

fn collect_tint(action: &mut dyn Action, node: &NodeRef) {
    let Some(tint) = node.downcast_ref::<Tint>() else {
        return;
    };
    if !note(action, tint.name()) {
        return;
    }
    let slot = TintElement::class().stack_index();
    if let Some(el) = action.state().get_writable(slot).downcast_mut::<TintElement>() {
        el.color = tint.color;
    }
}
