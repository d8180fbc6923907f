#![forbid(unsafe_code)]

mod facts;
mod merger;

pub use crate::facts::{ClassFacts, FactStore};
pub use crate::merger::{
    ClassMerger, DirectTransplanter, MemberTransplanter, MergeError, MergeOptions, TransplantError,
};
