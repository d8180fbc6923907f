use std::fmt;

use serde::{Deserialize, Serialize};

/// JVM class-file access flags, kept as the raw `u16` mask.
///
/// The merge flag law (bitwise AND for shape bits, bitwise OR for
/// visibility/annotation/enum bits) operates on the raw value, so no typed
/// flag enum is introduced here.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;

    #[must_use]
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Returns whether any bit of `mask` is set.
    #[must_use]
    pub fn has(self, mask: u16) -> bool {
        self.0 & mask != 0
    }

    #[must_use]
    pub fn is_public(self) -> bool {
        self.has(Self::PUBLIC)
    }

    #[must_use]
    pub fn is_private(self) -> bool {
        self.has(Self::PRIVATE)
    }

    #[must_use]
    pub fn is_static(self) -> bool {
        self.has(Self::STATIC)
    }

    #[must_use]
    pub fn is_interface(self) -> bool {
        self.has(Self::INTERFACE)
    }

    #[must_use]
    pub fn is_abstract(self) -> bool {
        self.has(Self::ABSTRACT)
    }

    #[must_use]
    pub fn is_annotation(self) -> bool {
        self.has(Self::ANNOTATION)
    }

    #[must_use]
    pub fn is_enum(self) -> bool {
        self.has(Self::ENUM)
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessFlags(0x{:04x})", self.0)
    }
}

impl From<u16> for AccessFlags {
    fn from(raw: u16) -> Self {
        AccessFlags(raw)
    }
}
