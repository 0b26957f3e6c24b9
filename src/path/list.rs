//! Containers of paths, with the normalization the action kernel relies on.
//!
//! Applying an action to several places at once takes a [`PathList`]. Before
//! a traversal can use one it must be *normalized*: sorted in traversal
//! order and uniquified so that no path is a duplicate of — or an extension
//! of — another. A path below another contributes nothing extra to a
//! traversal, because below-path traversal already visits every descendant.

use crate::path::Path;

/// A list of paths.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    derive_more::Deref,
    derive_more::DerefMut,
    derive_more::From,
    derive_more::IntoIterator,
)]
pub struct PathList(Vec<Path>);

impl PathList {
    /// An empty list.
    pub fn new() -> PathList {
        PathList::default()
    }

    /// Append a path.
    pub fn append(&mut self, path: Path) {
        self.0.push(path);
    }

    /// Sort into traversal order: by head identity, then lexicographically
    /// by child indices.
    pub fn sort(&mut self) {
        self.0.sort();
    }

    /// On a sorted list, drop every path that duplicates or extends an
    /// earlier one. Afterwards no remaining path is a prefix of another.
    pub fn uniquify(&mut self) {
        let mut kept: Vec<Path> = Vec::with_capacity(self.0.len());
        for path in self.0.drain(..) {
            match kept.last() {
                // sorting puts a prefix immediately before its extensions,
                // so only the most recently kept path can subsume this one
                Some(prev) if path.contains_path(prev) => {}
                _ => kept.push(path),
            }
        }
        self.0 = kept;
    }

    /// The position of a path equal to `path`, if any.
    pub fn find(&self, path: &Path) -> Option<usize> {
        self.0.iter().position(|p| p == path)
    }

    /// Whether the list holds a path equal to `path`.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }
}

impl FromIterator<Path> for PathList {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> PathList {
        PathList(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use once_cell::sync::Lazy;
    use proptest::prelude::*;

    use super::*;
    use crate::node::{ChildList, Node, NodeClass, NodeRef, base_class, register_node_class};

    #[derive(Debug)]
    struct TestNode {
        children: ChildList,
    }

    impl Node for TestNode {
        fn class(&self) -> NodeClass {
            static CLASS: Lazy<NodeClass> =
                Lazy::new(|| register_node_class("PathListTestNode", base_class()));
            *CLASS
        }

        fn children(&self) -> Option<&ChildList> {
            Some(&self.children)
        }
    }

    /// A full ternary tree of the given depth.
    fn ternary(depth: usize) -> NodeRef {
        let children = if depth == 0 {
            ChildList::new()
        } else {
            (0..3).map(|_| ternary(depth - 1)).collect()
        };
        Arc::new(TestNode { children })
    }

    fn path_from(root: &NodeRef, indices: &[usize]) -> Path {
        let mut path = Path::new(root.clone());
        for &i in indices {
            path.append_index(i);
        }
        path
    }

    #[test]
    fn uniquify_drops_duplicates_and_extensions() {
        let root = ternary(3);
        let mut list: PathList = [
            vec![0, 1],
            vec![0],
            vec![0, 1],
            vec![2, 2, 2],
            vec![1, 0],
        ]
        .iter()
        .map(|seq| path_from(&root, seq))
        .collect();

        list.sort();
        list.uniquify();

        let expected: PathList = [vec![0], vec![1, 0], vec![2, 2, 2]]
            .iter()
            .map(|seq| path_from(&root, seq))
            .collect();
        assert_eq!(list, expected);
    }

    #[test]
    fn find_and_contains() {
        let root = ternary(2);
        let list: PathList = [vec![0], vec![1, 1]]
            .iter()
            .map(|seq| path_from(&root, seq))
            .collect();
        assert_eq!(list.find(&path_from(&root, &[1, 1])), Some(1));
        assert!(list.contains_path(&path_from(&root, &[0])));
        assert!(!list.contains_path(&path_from(&root, &[2])));
    }

    #[test]
    fn heads_group_after_sorting() {
        let a = ternary(1);
        let b = ternary(1);
        let mut list: PathList = [
            path_from(&a, &[0]),
            path_from(&b, &[1]),
            path_from(&a, &[2]),
            path_from(&b, &[0]),
        ]
        .into_iter()
        .collect();
        list.sort();
        let heads: Vec<_> = list.iter().map(|p| crate::node::node_addr(p.head())).collect();
        assert!(heads.windows(2).all(|w| w[0] <= w[1]));
    }

    proptest! {
        #[test]
        fn sort_and_uniquify_are_idempotent(
            raw in proptest::collection::vec(proptest::collection::vec(0usize..3, 0..=3), 0..12)
        ) {
            let root = ternary(3);
            let mut list: PathList = raw.iter().map(|seq| path_from(&root, seq)).collect();

            list.sort();
            let sorted = list.clone();
            list.sort();
            prop_assert_eq!(&list, &sorted);

            list.uniquify();
            let unique = list.clone();
            list.uniquify();
            prop_assert_eq!(&list, &unique);

            // normalization leaves no path subsumed by another
            for i in 0..list.len() {
                for j in 0..list.len() {
                    if i != j {
                        prop_assert!(!list[i].contains_path(&list[j]));
                    }
                }
            }
        }
    }
}
