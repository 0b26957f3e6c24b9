//! The per-action-class dispatch table.
//!
//! Each action class owns an [`ActionMethodList`]: the methods registered
//! directly against it, plus a lazily built dense table mapping every node
//! class's method index to the most specific method available. Resolution
//! merges the ancestor action classes root-first (so the closest class wins
//! a contested slot) and then fills unregistered node classes from their
//! nearest registered node ancestor.
//!
//! The built table is invalidated by two process-wide version counters: one
//! that moves when node classes register, one that moves when any action
//! class registers a method.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::action::{Action, ActionClass};
use crate::node::{self, MethodIndex, NodeClass, NodeRef};

/// A per-node-class traversal method.
pub type ActionMethod = fn(&mut dyn Action, &NodeRef);

/// The no-op fallback for node classes nothing was registered for.
pub fn null_action(_action: &mut dyn Action, _node: &NodeRef) {}

static METHOD_VERSION: AtomicU64 = AtomicU64::new(0);

struct BuiltTable {
    node_version: u64,
    method_version: u64,
    slots: Vec<ActionMethod>,
}

/// Registered methods and the resolved dispatch table of one action class.
pub struct ActionMethodList {
    registrations: RwLock<Vec<(MethodIndex, ActionMethod)>>,
    table: RwLock<Option<BuiltTable>>,
}

impl ActionMethodList {
    pub(crate) fn new() -> ActionMethodList {
        ActionMethodList {
            registrations: RwLock::new(Vec::new()),
            table: RwLock::new(None),
        }
    }

    /// Register `method` for `node_class`. Later registrations for the same
    /// class replace earlier ones.
    pub(crate) fn add(&self, node_class: NodeClass, method: ActionMethod) {
        self.registrations
            .write()
            .push((node_class.method_index(), method));
        METHOD_VERSION.fetch_add(1, Ordering::SeqCst);
    }

    /// Make sure the resolved table is current for the given ancestor chain
    /// (ordered root-first, ending in the owning class).
    pub(crate) fn set_up(&self, ancestry: &[&ActionClass]) {
        let node_version = node::registry_version();
        let method_version = METHOD_VERSION.load(Ordering::SeqCst);
        {
            let table = self.table.read();
            if let Some(built) = table.as_ref() {
                if built.node_version == node_version && built.method_version == method_version {
                    return;
                }
            }
        }
        let slots = build(ancestry);
        *self.table.write() = Some(BuiltTable {
            node_version,
            method_version,
            slots,
        });
    }

    /// The method to run for `node_class`, falling back to [`null_action`]
    /// with a warning when the class is unknown to the table.
    pub(crate) fn lookup(&self, ancestry: &[&ActionClass], node_class: NodeClass) -> ActionMethod {
        self.set_up(ancestry);
        let table = self.table.read();
        let built = table.as_ref().unwrap();
        match built.slots.get(node_class.method_index().as_usize()) {
            Some(&method) => method,
            None => {
                tracing::warn!(
                    node = %node_class.tag(),
                    "node class unknown to the dispatch table; using the null method"
                );
                null_action
            }
        }
    }
}

fn build(ancestry: &[&ActionClass]) -> Vec<ActionMethod> {
    node::with_registry(|infos| {
        let mut direct: Vec<Option<ActionMethod>> = vec![None; infos.len()];
        for class in ancestry {
            for &(index, method) in class.method_list().registrations.read().iter() {
                direct[index.as_usize()] = Some(method);
            }
        }
        // node classes register parents first, so a single pass resolves
        // inheritance
        let mut slots: Vec<ActionMethod> = Vec::with_capacity(infos.len());
        for (i, info) in infos.iter().enumerate() {
            let method = match direct[i] {
                Some(method) => method,
                None => match info.parent {
                    Some(parent) => slots[parent.as_usize()],
                    None => null_action,
                },
            };
            slots.push(method);
        }
        slots
    })
}
