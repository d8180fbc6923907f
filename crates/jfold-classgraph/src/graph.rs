use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::flags::AccessFlags;

pub const INIT_NAME: &str = "<init>";
pub const CLINIT_NAME: &str = "<clinit>";

/// Stable handle for a class in a [`ClassGraph`].
///
/// All hierarchy links (superclass, interfaces, subclasses) are stored as
/// ids rather than references, so the graph owns every node exactly once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(u32);

impl ClassId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        ClassId(raw)
    }

    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// One field or method of a class.
///
/// Constructors and static initializers are ordinary members distinguished
/// by their reserved names (`<init>`, `<clinit>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub name: String,
    pub descriptor: String,
    pub access_flags: AccessFlags,
    /// The class this member is currently homed in. Re-targeted when the
    /// member is transplanted during a merge.
    pub owner: ClassId,
}

impl Member {
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == INIT_NAME
    }

    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.name == CLINIT_NAME
    }

    /// Returns whether `other` has the same name and descriptor.
    #[must_use]
    pub fn same_signature(&self, other: &Member) -> bool {
        self.name == other.name && self.descriptor == other.descriptor
    }
}

/// Opaque named attribute blob (generic signature, inner-class metadata,
/// ...). Copied verbatim during a merge; duplicates are tolerated by the
/// class writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub info: Vec<u8>,
}

/// One class or interface of the program being optimized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassNode {
    /// Internal binary name, e.g. `java/util/List`.
    pub name: String,
    pub access_flags: AccessFlags,
    pub super_class: Option<ClassId>,
    /// Directly implemented interfaces. Ordered, no duplicates, acyclic.
    pub interfaces: Vec<ClassId>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
    /// Known direct subclasses and implementors.
    ///
    /// Best-effort only: this set is populated when the graph is built and
    /// is NOT kept up to date as classes are merged away. Readers must
    /// tolerate stale entries.
    pub subclasses: Vec<ClassId>,
}

impl ClassNode {
    #[must_use]
    pub fn new(name: impl Into<String>, access_flags: AccessFlags) -> Self {
        ClassNode {
            name: name.into(),
            access_flags,
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            subclasses: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access_flags.is_interface()
    }

    #[must_use]
    pub fn is_annotation(&self) -> bool {
        self.access_flags.is_annotation()
    }

    #[must_use]
    pub fn has_static_initializer(&self) -> bool {
        self.methods.iter().any(Member::is_class_initializer)
    }

    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Member> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    #[must_use]
    pub fn package_name(&self) -> &str {
        package_name(&self.name)
    }
}

/// Returns the package part of an internal binary name (everything before
/// the final `/`), or `""` for the default package.
#[must_use]
pub fn package_name(internal_name: &str) -> &str {
    internal_name
        .rsplit_once('/')
        .map(|(pkg, _)| pkg)
        .unwrap_or("")
}

/// Arena of class nodes, addressed by [`ClassId`].
///
/// Nodes are constructed once from the parsed binaries and persist for the
/// whole optimization run; a merge never removes a node, it only mutates
/// the target in place and marks the source redirected in the fact store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassGraph {
    classes: Vec<ClassNode>,
}

impl ClassGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and records it as a known subclass/implementor on its
    /// superclass and interfaces.
    pub fn alloc(&mut self, node: ClassNode) -> ClassId {
        let id = ClassId::from_raw(self.classes.len() as u32);
        let super_class = node.super_class;
        let interfaces = node.interfaces.clone();
        self.classes.push(node);
        if let Some(sup) = super_class {
            self.classes[sup.idx()].subclasses.push(id);
        }
        for iface in interfaces {
            self.classes[iface.idx()].subclasses.push(id);
        }
        id
    }

    /// Convenience constructor used by drivers and tests.
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        access_flags: AccessFlags,
        super_class: Option<ClassId>,
        interfaces: Vec<ClassId>,
    ) -> ClassId {
        let mut node = ClassNode::new(name, access_flags);
        node.super_class = super_class;
        node.interfaces = interfaces;
        self.alloc(node)
    }

    #[must_use]
    pub fn get(&self, id: ClassId) -> Option<&ClassNode> {
        self.classes.get(id.idx())
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut ClassNode> {
        self.classes.get_mut(id.idx())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &ClassNode)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, node)| (ClassId::from_raw(i as u32), node))
    }
}

impl Index<ClassId> for ClassGraph {
    type Output = ClassNode;

    fn index(&self, id: ClassId) -> &Self::Output {
        &self.classes[id.idx()]
    }
}

impl IndexMut<ClassId> for ClassGraph {
    fn index_mut(&mut self, id: ClassId) -> &mut Self::Output {
        &mut self.classes[id.idx()]
    }
}
