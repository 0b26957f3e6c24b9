//! Per-action-class sets of the element classes a traversal needs.
//!
//! Each action class carries its own list; the effective set of a class is
//! the union over its ancestor chain. A process-wide version counter moves
//! whenever any class enables a new element, letting action instances detect
//! that their lazily built [`State`](crate::state::State) is stale.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::element::ElementClass;
use crate::types::TypeTag;

static ENABLED_VERSION: AtomicU64 = AtomicU64::new(0);

/// The process-wide enabled-elements version.
pub(crate) fn current_version() -> u64 {
    ENABLED_VERSION.load(Ordering::SeqCst)
}

/// The element classes one action class enables directly.
#[derive(Debug, Default)]
pub struct EnabledElementsList {
    entries: RwLock<Vec<ElementClass>>,
}

impl EnabledElementsList {
    /// An empty list.
    pub fn new() -> EnabledElementsList {
        EnabledElementsList::default()
    }

    /// Enable an element class. Enabling the same class twice is a no-op.
    pub fn enable(&self, class: ElementClass) {
        let mut entries = self.entries.write();
        if entries.contains(&class) {
            return;
        }
        entries.push(class);
        ENABLED_VERSION.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(element = %class.tag(), "enabled element");
    }

    /// The enabled classes.
    pub fn entries(&self) -> Vec<ElementClass> {
        self.entries.read().clone()
    }

    /// Merge this list into a slot table indexed by stack index.
    pub(crate) fn collect_into(&self, slots: &mut Vec<Option<TypeTag>>) {
        for class in self.entries.read().iter() {
            let slot = class.stack_index().as_usize();
            if slots.len() <= slot {
                slots.resize(slot + 1, None);
            }
            slots[slot] = Some(class.tag());
        }
    }
}
