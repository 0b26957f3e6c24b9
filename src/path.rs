//! Paths: root-rooted positions within a scene graph.
//!
//! A path names one place in the graph as a head node plus the chain of
//! child indices leading down from it. Every step also caches the node it
//! resolved to at creation time, so a path stays meaningful even when the
//! graph is edited underneath it mid-traversal.
//!
//! Paths clone in O(1) — the step chain is an [`im::Vector`] — which is what
//! lets the kernel hand them around freely.

pub mod list;

pub use list::PathList;

use std::cmp::Ordering;

use crate::node::{NodeRef, node_addr, same_node};

#[derive(Clone, Debug)]
struct PathStep {
    index: usize,
    node: NodeRef,
}

/// A position in a scene graph: a head plus child-index steps.
///
/// The head counts as step 0, so [`Path::len`] is the number of nodes on the
/// path and is always at least 1.
#[derive(Clone, Debug)]
pub struct Path {
    head: NodeRef,
    steps: im::Vector<PathStep>,
}

impl Path {
    /// The path consisting of just `head`.
    pub fn new(head: NodeRef) -> Path {
        Path {
            head,
            steps: im::Vector::new(),
        }
    }

    /// The number of nodes on the path, head included.
    pub fn len(&self) -> usize {
        1 + self.steps.len()
    }

    /// Always false; a path has at least its head.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The head node.
    pub fn head(&self) -> &NodeRef {
        &self.head
    }

    /// The last node on the path.
    pub fn tail(&self) -> NodeRef {
        self.steps
            .last()
            .map(|step| step.node.clone())
            .unwrap_or_else(|| self.head.clone())
    }

    /// The child index taken at step `i`. Step 0 is the head and has no
    /// index; asking for it is a programming error.
    pub fn get_index(&self, i: usize) -> usize {
        assert!(i >= 1 && i < self.len(), "path step {i} out of range");
        self.steps[i - 1].index
    }

    /// The node reached at step `i`; step 0 is the head.
    pub fn get_node(&self, i: usize) -> NodeRef {
        if i == 0 {
            self.head.clone()
        } else {
            self.steps[i - 1].node.clone()
        }
    }

    /// Extend the path by one step to `child`, which must be a child of the
    /// current tail.
    pub fn append(&mut self, child: &NodeRef) {
        let tail = self.tail();
        let index = tail
            .children()
            .and_then(|c| c.index_of(child))
            .unwrap_or_else(|| panic!("appended node is not a child of the path tail"));
        self.steps.push_back(PathStep {
            index,
            node: child.clone(),
        });
    }

    /// Extend the path by one step to the tail's child at `index`.
    pub fn append_index(&mut self, index: usize) {
        let tail = self.tail();
        let child = tail
            .children()
            .and_then(|c| c.get(index))
            .unwrap_or_else(|| panic!("child index {index} out of range for the path tail"));
        self.steps.push_back(PathStep { index, node: child });
    }

    /// Extend the path with an already resolved step, without consulting the
    /// live graph. The kernel materializes its current path through this, so
    /// the result stays true to the traversal even after graph edits.
    pub(crate) fn append_resolved(&mut self, index: usize, node: NodeRef) {
        self.steps.push_back(PathStep { index, node });
    }

    /// Remove the last step. The head cannot be removed.
    pub fn pop(&mut self) {
        if self.steps.pop_back().is_none() {
            panic!("cannot pop the head off a path");
        }
    }

    /// Keep only the first `len` nodes. `len` must be at least 1.
    pub fn truncate(&mut self, len: usize) {
        assert!(len >= 1, "a path always keeps its head");
        self.steps.truncate(len - 1);
    }

    /// Replace the head, discarding all steps.
    pub fn set_head(&mut self, head: NodeRef) {
        self.head = head;
        self.steps.clear();
    }

    /// Whether `other` is a prefix of this path, comparing (node, index)
    /// pairs from the head down. Reflexive.
    pub fn contains_path(&self, other: &Path) -> bool {
        if other.len() > self.len() || !same_node(&self.head, &other.head) {
            return false;
        }
        other
            .steps
            .iter()
            .zip(self.steps.iter())
            .all(|(a, b)| a.index == b.index && same_node(&a.node, &b.node))
    }

    fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().map(|step| step.index)
    }
}

// Equality and ordering look at head identity and the index sequence only;
// the resolved nodes are a cache.
impl PartialEq for Path {
    fn eq(&self, other: &Path) -> bool {
        same_node(&self.head, &other.head) && self.indices().eq(other.indices())
    }
}

impl Eq for Path {}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Path) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Path) -> Ordering {
        node_addr(&self.head)
            .cmp(&node_addr(&other.head))
            .then_with(|| self.indices().cmp(other.indices()))
    }
}
