//! The runtime type system over which nodes, elements and actions are
//! polymorphic.
//!
//! Every class participating in traversal registers itself once, receiving a
//! [`TypeTag`]: a cheap `Copy` handle into a process-wide registry which
//! records the parent type, a display name and an optional instance factory.
//! Parent links make [`TypeTag::is_derived_from`] possible, which is what
//! dispatch-table inheritance is built on.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Creates a fresh instance of a registered type, when the class opted in.
pub type InstanceFactory = fn() -> Box<dyn Any + Send + Sync>;

/// A handle to a registered runtime type.
///
/// Tags are dense, `Copy`, and stable for the lifetime of the process.
/// Registration is idempotent by name: registering the same name twice under
/// the same parent returns the original tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(u32);

/// Registering a name that is already taken by an incompatible type.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum TypeRegistryError {
    /// The name is already registered under a different parent type.
    #[display("type {name:?} is already registered under a different parent")]
    ParentMismatch {
        /// The contested name.
        name: String,
    },
}

struct TypeRecord {
    name: String,
    parent: TypeTag,
    factory: Option<InstanceFactory>,
}

struct Registry {
    records: Vec<TypeRecord>,
    by_name: HashMap<String, TypeTag>,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| {
    // Slot 0 is the bad-type sentinel, its own parent.
    let bad = TypeRecord {
        name: "BadType".to_string(),
        parent: TypeTag(0),
        factory: None,
    };
    RwLock::new(Registry {
        records: vec![bad],
        by_name: HashMap::from([("BadType".to_string(), TypeTag(0))]),
    })
});

impl TypeTag {
    /// The unique sentinel for "no such type". It is its own parent.
    pub fn bad() -> TypeTag {
        TypeTag(0)
    }

    /// Register a type, or return the existing tag when `name` is already
    /// registered under the same parent.
    ///
    /// Panics when `name` is taken by a type with a different parent; the
    /// registry treats that as an unrecoverable setup error. Use
    /// [`TypeTag::try_create`] for a fallible variant.
    pub fn create(name: &str, parent: TypeTag) -> TypeTag {
        match Self::try_create_inner(name, parent, None) {
            Ok(tag) => tag,
            Err(e) => panic!("{e}"),
        }
    }

    /// Like [`TypeTag::create`], also recording a factory for
    /// [`TypeTag::create_instance`].
    pub fn create_with_factory(name: &str, parent: TypeTag, factory: InstanceFactory) -> TypeTag {
        match Self::try_create_inner(name, parent, Some(factory)) {
            Ok(tag) => tag,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible registration.
    pub fn try_create(name: &str, parent: TypeTag) -> Result<TypeTag, TypeRegistryError> {
        Self::try_create_inner(name, parent, None)
    }

    fn try_create_inner(
        name: &str,
        parent: TypeTag,
        factory: Option<InstanceFactory>,
    ) -> Result<TypeTag, TypeRegistryError> {
        let mut reg = REGISTRY.write();
        if let Some(&tag) = reg.by_name.get(name) {
            let record = &reg.records[tag.0 as usize];
            if record.parent != parent {
                return Err(TypeRegistryError::ParentMismatch {
                    name: name.to_string(),
                });
            }
            return Ok(tag);
        }
        let tag = TypeTag(reg.records.len() as u32);
        reg.records.push(TypeRecord {
            name: name.to_string(),
            parent,
            factory,
        });
        reg.by_name.insert(name.to_string(), tag);
        tracing::trace!(name, id = tag.0, "registered type");
        Ok(tag)
    }

    /// Look a type up by name.
    pub fn from_name(name: &str) -> Option<TypeTag> {
        REGISTRY.read().by_name.get(name).copied()
    }

    /// The registered display name.
    pub fn name(self) -> String {
        REGISTRY.read().records[self.0 as usize].name.clone()
    }

    /// The parent type. The bad type is its own parent.
    pub fn parent(self) -> TypeTag {
        REGISTRY.read().records[self.0 as usize].parent
    }

    /// Whether this is the sentinel returned for unknown types.
    pub fn is_bad(self) -> bool {
        self == TypeTag::bad()
    }

    /// Reflexive, transitive ancestry test.
    pub fn is_derived_from(self, ancestor: TypeTag) -> bool {
        let reg = REGISTRY.read();
        let mut tag = self;
        loop {
            if tag == ancestor {
                return true;
            }
            let parent = reg.records[tag.0 as usize].parent;
            if parent == tag {
                // reached a self-parenting root
                return false;
            }
            tag = parent;
        }
    }

    /// Build an instance through the registered factory, if any.
    pub fn create_instance(self) -> Option<Box<dyn Any + Send + Sync>> {
        let factory = REGISTRY.read().records[self.0 as usize].factory;
        factory.map(|f| f())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for TypeTag {
    // Debug wants the registered name rather than the raw index, but must
    // not deadlock when the registry lock is already held on this thread.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match REGISTRY.try_read() {
            Some(reg) => write!(f, "TypeTag({})", reg.records[self.0 as usize].name),
            None => write!(f, "TypeTag(#{})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_is_idempotent_by_name() {
        let root = TypeTag::create("TtRoot", TypeTag::bad());
        let a = TypeTag::create("TtA", root);
        let a2 = TypeTag::create("TtA", root);
        assert_eq!(a, a2);
        assert_eq!(TypeTag::from_name("TtA"), Some(a));
    }

    #[test]
    fn parent_collisions_fail_hard() {
        let root = TypeTag::create("TtRoot2", TypeTag::bad());
        let other = TypeTag::create("TtOther", TypeTag::bad());
        let _ = TypeTag::create("TtB", root);
        assert_eq!(
            TypeTag::try_create("TtB", other),
            Err(TypeRegistryError::ParentMismatch {
                name: "TtB".to_string()
            })
        );
    }

    #[test]
    fn derivation_is_reflexive_and_transitive() {
        let root = TypeTag::create("TtRoot3", TypeTag::bad());
        let mid = TypeTag::create("TtMid", root);
        let leaf = TypeTag::create("TtLeaf", mid);
        assert!(leaf.is_derived_from(leaf));
        assert!(leaf.is_derived_from(mid));
        assert!(leaf.is_derived_from(root));
        assert!(!root.is_derived_from(leaf));
        assert!(!mid.is_derived_from(leaf));
    }

    #[test]
    fn bad_type_is_its_own_parent() {
        assert!(TypeTag::bad().is_bad());
        assert_eq!(TypeTag::bad().parent(), TypeTag::bad());
        assert_eq!(TypeTag::from_name("NoSuchType"), None);
    }

    #[test]
    fn factories_build_instances() {
        let root = TypeTag::create("TtRoot4", TypeTag::bad());
        let tag = TypeTag::create_with_factory("TtFact", root, || Box::new(7usize));
        let instance = tag.create_instance().unwrap();
        assert_eq!(instance.downcast_ref::<usize>(), Some(&7));
        assert!(root.create_instance().is_none());
    }
}
