//! canopy — the traversal kernel of a retained-mode scene-graph library.
//!
//! A scene graph is a DAG of typed nodes; operations on it — rendering,
//! picking, searching, bounds computation — are all *actions* that walk the
//! graph depth-first, left-to-right, carrying a stack of context
//! *elements*. This crate is the substrate those actions share:
//!
//! - a process-wide runtime [type system](types) with single inheritance,
//! - stackable [elements](element) and the scoped [state](state) they live in,
//! - [paths](path) and path lists naming positions in the graph,
//! - the [action kernel](action): apply entry points, per-node-class method
//!   dispatch, and the path-code state machine that lets one recursive walk
//!   serve whole-graph, single-path and path-list traversals alike.
//!
//! What nodes and actions *mean* lives outside the kernel; see the
//! `example_scenes` module (behind the `example-scenes` feature) for small
//! working classes of each kind.

pub mod action;
pub mod element;
pub mod node;
pub mod path;
pub mod state;
pub mod types;

#[cfg(feature = "diagrams")]
pub mod diagram;

#[cfg(feature = "example-scenes")]
pub mod example_scenes;

pub use action::{Action, ActionClass, ActionCore, AppliedCode, PathCode};
pub use element::{Element, ElementClass, StackIndex};
pub use node::{ChildList, Node, NodeClass, NodeRef};
pub use path::{Path, PathList};
pub use state::State;
pub use types::TypeTag;

pub mod prelude {
    pub use crate::action::{
        Action, ActionClass, ActionCore, ActionMethod, AppliedCode, PathCode,
    };
    pub use crate::element::{
        BoxedElement, Element, ElementClass, StackIndex, register_element_class,
    };
    pub use crate::node::{
        ChildList, Node, NodeClass, NodeRef, base_class, register_node_class, same_node,
    };
    pub use crate::path::{Path, PathList};
    pub use crate::state::State;
    pub use crate::types::TypeTag;
}
