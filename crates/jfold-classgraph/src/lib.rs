#![forbid(unsafe_code)]

mod flags;
mod graph;
mod hierarchy;

pub use crate::flags::AccessFlags;
pub use crate::graph::{
    package_name, Attribute, ClassGraph, ClassId, ClassNode, Member, CLINIT_NAME, INIT_NAME,
};
pub use crate::hierarchy::{
    caught_ancestors, extends_or_implements, hierarchy_closure, indirect_interfaces,
    initialized_ancestors, superclass_closure, type_checked_ancestors,
};
