//! The stack of element instances maintained during a traversal.
//!
//! A [`State`] holds one stack per registered element class, addressed by
//! [`StackIndex`]. Group-like nodes open a scope with [`State::push`] before
//! descending and close it with [`State::pop`]; element writes inside a scope
//! go through [`State::get_writable`], which shadows the previous instance
//! copy-on-write so the pop can restore it. After any balanced push/pop
//! sequence the state is observationally identical to its starting point.

use crate::element::{self, BoxedElement, Element, ElementClass, StackIndex};
use crate::types::TypeTag;

struct StackEntry {
    depth: usize,
    element: BoxedElement,
}

/// Traversal state: per-element-class stacks with scoped copy-on-write.
pub struct State {
    stacks: Vec<Vec<StackEntry>>,
    enabled: Vec<Option<TypeTag>>,
    // per open scope, the slots that were shadowed in it
    scopes: Vec<Vec<usize>>,
}

impl State {
    /// A state with exactly the given element classes enabled.
    ///
    /// Actions build their state from their enabled-elements list; this
    /// constructor is for exercising elements directly.
    pub fn with_elements(classes: &[ElementClass]) -> State {
        let mut enabled = vec![None; element::registered_count()];
        for class in classes {
            enabled[class.stack_index().as_usize()] = Some(class.tag());
        }
        State::from_slots(enabled)
    }

    pub(crate) fn from_slots(enabled: Vec<Option<TypeTag>>) -> State {
        let len = element::registered_count().max(enabled.len());
        let mut enabled = enabled;
        enabled.resize(len, None);
        State {
            stacks: (0..len).map(|_| Vec::new()).collect(),
            enabled,
            scopes: Vec::new(),
        }
    }

    /// The number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the element class at `index` is enabled in this state.
    pub fn is_enabled(&self, index: StackIndex) -> bool {
        self.enabled
            .get(index.as_usize())
            .is_some_and(|slot| slot.is_some())
    }

    /// Read the current top element for `index`, creating the bottom
    /// instance through the class factory on first access.
    pub fn get(&mut self, index: StackIndex) -> &dyn Element {
        self.ensure_bottom(index);
        self.stacks[index.as_usize()]
            .last()
            .map(|entry| entry.element.as_ref())
            .unwrap()
    }

    /// A writable top element for `index`.
    ///
    /// When the current top was created in a shallower scope, it is shadowed
    /// first: a copy becomes the new top at the current depth and its
    /// [`Element::push`] hook runs. Writes at depth 0 mutate the bottom
    /// instance in place and survive the traversal.
    pub fn get_writable(&mut self, index: StackIndex) -> &mut dyn Element {
        self.ensure_bottom(index);
        let depth = self.depth();
        let slot = index.as_usize();
        let stack = &mut self.stacks[slot];
        let top_depth = stack.last().map(|entry| entry.depth).unwrap();
        if top_depth < depth {
            let prev = stack.last().unwrap();
            let mut fresh = prev.element.clone_boxed();
            fresh.push(prev.element.as_ref());
            stack.push(StackEntry {
                depth,
                element: fresh,
            });
            self.scopes.last_mut().unwrap().push(slot);
        }
        self.stacks[slot].last_mut().map(|entry| entry.element.as_mut()).unwrap()
    }

    /// Open a scope.
    pub fn push(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost scope, discarding every element shadowed in it
    /// and running the [`Element::pop`] hook on each uncovered instance.
    pub fn pop(&mut self) {
        let Some(written) = self.scopes.pop() else {
            panic!("state scope underflow: pop without a matching push");
        };
        for slot in written.into_iter().rev() {
            let popped = self.stacks[slot].pop().unwrap();
            let uncovered = self.stacks[slot]
                .last_mut()
                .map(|entry| entry.element.as_mut())
                .unwrap();
            uncovered.pop(popped.element.as_ref());
        }
    }

    fn ensure_bottom(&mut self, index: StackIndex) {
        let slot = index.as_usize();
        let enabled = self
            .enabled
            .get(slot)
            .copied()
            .flatten();
        if enabled.is_none() {
            panic!("element {index} is not enabled in this state");
        }
        if self.stacks[slot].is_empty() {
            let mut element = element::factory(index)();
            element.init();
            // lazily created instances always live at the bottom, so a later
            // unbalanced-looking first write in a deep scope still unwinds
            // back to them
            self.stacks[slot].push(StackEntry { depth: 0, element });
        }
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tops: Vec<_> = self
            .stacks
            .iter()
            .enumerate()
            .filter_map(|(i, stack)| stack.last().map(|entry| (i, entry.depth, &entry.element)))
            .collect();
        f.debug_struct("State")
            .field("depth", &self.depth())
            .field("tops", &tops)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use once_cell::sync::Lazy;

    use super::*;
    use crate::element::{BoxedElement, register_element_class};

    /// Counts its own push/pop hook invocations.
    #[derive(Clone, Debug, Default)]
    struct Hooked {
        value: i32,
        pushes: u32,
        pops: u32,
    }

    impl Hooked {
        fn class() -> ElementClass {
            static CLASS: Lazy<ElementClass> = Lazy::new(|| {
                register_element_class("HookedElement", element::base_tag(), || {
                    Box::new(Hooked::default())
                })
            });
            *CLASS
        }
    }

    impl Element for Hooked {
        fn class(&self) -> ElementClass {
            Hooked::class()
        }

        fn push(&mut self, _prev: &dyn Element) {
            self.pushes += 1;
        }

        fn pop(&mut self, _popped: &dyn Element) {
            self.pops += 1;
        }

        fn matches(&self, other: &dyn Element) -> bool {
            other
                .downcast_ref::<Hooked>()
                .is_some_and(|o| o.value == self.value)
        }

        fn clone_boxed(&self) -> BoxedElement {
            Box::new(self.clone())
        }
    }

    fn value_of(state: &mut State) -> i32 {
        state
            .get(Hooked::class().stack_index())
            .downcast_ref::<Hooked>()
            .unwrap()
            .value
    }

    fn write(state: &mut State, value: i32) {
        state
            .get_writable(Hooked::class().stack_index())
            .downcast_mut::<Hooked>()
            .unwrap()
            .value = value;
    }

    #[test]
    fn scoped_writes_are_restored_on_pop() {
        let mut state = State::with_elements(&[Hooked::class()]);
        write(&mut state, 1);

        state.push();
        write(&mut state, 2);
        assert_eq!(value_of(&mut state), 2);

        state.push();
        write(&mut state, 3);
        assert_eq!(value_of(&mut state), 3);
        state.pop();

        assert_eq!(value_of(&mut state), 2);
        state.pop();
        assert_eq!(value_of(&mut state), 1);
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn balanced_scopes_preserve_top_identity() {
        let mut state = State::with_elements(&[Hooked::class()]);
        let before = state.get(Hooked::class().stack_index()) as *const dyn Element as *const ();

        state.push();
        write(&mut state, 9);
        state.push();
        write(&mut state, 10);
        state.pop();
        state.pop();

        let after = state.get(Hooked::class().stack_index()) as *const dyn Element as *const ();
        assert_eq!(before, after);
        assert_eq!(value_of(&mut state), 0);
    }

    #[test]
    fn shadowing_is_per_scope_not_per_write() {
        let mut state = State::with_elements(&[Hooked::class()]);
        state.push();
        write(&mut state, 5);
        write(&mut state, 6);
        let hooked = state
            .get(Hooked::class().stack_index())
            .downcast_ref::<Hooked>()
            .unwrap();
        // one copy-on-write push for the scope, no matter how many writes
        assert_eq!(hooked.pushes, 1);
        state.pop();
    }

    #[test]
    fn pop_hook_runs_on_the_uncovered_instance() {
        let mut state = State::with_elements(&[Hooked::class()]);
        state.push();
        write(&mut state, 5);
        state.pop();
        let hooked = state
            .get(Hooked::class().stack_index())
            .downcast_ref::<Hooked>()
            .unwrap();
        assert_eq!(hooked.pops, 1);
        assert_eq!(hooked.value, 0);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn unbalanced_pop_is_misuse() {
        let mut state = State::with_elements(&[Hooked::class()]);
        state.pop();
    }

    #[test]
    #[should_panic(expected = "not enabled")]
    fn disabled_slots_are_misuse() {
        let mut state = State::with_elements(&[]);
        let _ = state.get(Hooked::class().stack_index());
    }
}
