//! Stackable units of traversal context.
//!
//! An element holds one facet of the state a traversal carries along: a
//! transform, a color, a viewport — whatever node classes need to communicate
//! to the nodes traversed after them. Elements behave as if lexically scoped:
//! writing one inside a state scope shadows the previous value, and closing
//! the scope restores it.
//!
//! Each element class registers once and receives a dense [`StackIndex`],
//! giving the [`State`](crate::state::State) O(1) access to its stack.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::types::TypeTag;

/// A boxed element instance, as stored in the state.
pub type BoxedElement = Box<dyn Element>;

/// Creates the bottom-of-stack instance for an element class.
pub type ElementFactory = fn() -> BoxedElement;

/// The capability set of a traversal-state element.
pub trait Element: Any + Debug + Send + Sync {
    /// The class this instance belongs to.
    fn class(&self) -> ElementClass;

    /// Called once on the bottom-of-stack instance when the state first
    /// creates it.
    fn init(&mut self) {}

    /// Called on a fresh copy that is about to become the new top of its
    /// stack, with the instance it shadows. The copy already carries the
    /// previous content; override to add side effects on shadowing.
    fn push(&mut self, _prev: &dyn Element) {}

    /// Called on the instance being uncovered while `popped` is discarded.
    /// Elements that mirror external state (a GL context, say) re-issue
    /// whatever is needed to take effect again.
    fn pop(&mut self, _popped: &dyn Element) {}

    /// Whether `other` carries equivalent content. Used by cache validation,
    /// not by the traversal kernel itself.
    fn matches(&self, other: &dyn Element) -> bool;

    /// A copy carrying enough content to later answer [`Element::matches`].
    fn copy_match_info(&self) -> BoxedElement {
        self.clone_boxed()
    }

    /// A full copy. The state uses this for its copy-on-write push.
    fn clone_boxed(&self) -> BoxedElement;
}

impl dyn Element {
    /// Downcast a shared element reference to its concrete class.
    pub fn downcast_ref<T: Element>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref()
    }

    /// Downcast a mutable element reference to its concrete class.
    pub fn downcast_mut<T: Element>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut()
    }
}

/// The dense index of an element class within every [`State`].
///
/// [`State`]: crate::state::State
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("slot {_0}")]
pub struct StackIndex(usize);

impl StackIndex {
    /// The raw slot number.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Identity of a registered element class: its type tag plus its stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementClass {
    tag: TypeTag,
    index: StackIndex,
}

impl ElementClass {
    /// The runtime type of this element class.
    pub fn tag(self) -> TypeTag {
        self.tag
    }

    /// The stack slot assigned at registration.
    pub fn stack_index(self) -> StackIndex {
        self.index
    }
}

struct ElementRegistry {
    by_tag: HashMap<TypeTag, StackIndex>,
    factories: Vec<ElementFactory>,
}

static ELEMENTS: Lazy<RwLock<ElementRegistry>> = Lazy::new(|| {
    RwLock::new(ElementRegistry {
        by_tag: HashMap::new(),
        factories: Vec::new(),
    })
});

/// The root type all element classes ultimately derive from.
pub fn base_tag() -> TypeTag {
    static BASE: Lazy<TypeTag> = Lazy::new(|| TypeTag::create("Element", TypeTag::bad()));
    *BASE
}

/// Register an element class, assigning it a stable stack index.
///
/// Registration is idempotent: a second call with the same name returns the
/// original class.
pub fn register_element_class(
    name: &str,
    parent: TypeTag,
    factory: ElementFactory,
) -> ElementClass {
    let tag = TypeTag::create(name, parent);
    let mut reg = ELEMENTS.write();
    if let Some(&index) = reg.by_tag.get(&tag) {
        return ElementClass { tag, index };
    }
    let index = StackIndex(reg.factories.len());
    reg.by_tag.insert(tag, index);
    reg.factories.push(factory);
    tracing::trace!(name, %index, "registered element class");
    ElementClass { tag, index }
}

/// How many element classes have been registered so far.
pub(crate) fn registered_count() -> usize {
    ELEMENTS.read().factories.len()
}

/// The factory of the class at `index`.
pub(crate) fn factory(index: StackIndex) -> ElementFactory {
    ELEMENTS.read().factories[index.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct Probe(u8);

    impl Probe {
        fn class() -> ElementClass {
            static CLASS: Lazy<ElementClass> = Lazy::new(|| {
                register_element_class("ProbeElement", base_tag(), || Box::new(Probe::default()))
            });
            *CLASS
        }
    }

    impl Element for Probe {
        fn class(&self) -> ElementClass {
            Probe::class()
        }

        fn matches(&self, other: &dyn Element) -> bool {
            other.downcast_ref::<Probe>().is_some_and(|o| o.0 == self.0)
        }

        fn clone_boxed(&self) -> BoxedElement {
            Box::new(self.clone())
        }
    }

    #[test]
    fn registration_assigns_a_stable_slot() {
        let class = Probe::class();
        let again = register_element_class("ProbeElement", base_tag(), || {
            Box::new(Probe::default())
        });
        assert_eq!(class, again);
        assert!(class.tag().is_derived_from(base_tag()));
    }

    #[test]
    fn downcasting_and_matching() {
        let mut a = factory(Probe::class().stack_index())();
        let b = factory(Probe::class().stack_index())();
        assert!(a.matches(b.as_ref()));
        a.downcast_mut::<Probe>().unwrap().0 = 3;
        assert!(!a.matches(b.as_ref()));
        assert_eq!(a.copy_match_info().downcast_ref::<Probe>().unwrap().0, 3);
    }
}
