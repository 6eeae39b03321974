//! Header and section flags of ECMA-335 method bodies (II.25.4).

use bitflags::bitflags;

bitflags! {
    /// Method body header flags.
    ///
    /// The low two bits select the header format; the remaining bits are only meaningful
    /// in a fat header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header, one byte with the code size in the upper six bits
        const TINY_FORMAT = 0x2;
        /// Fat header, twelve bytes
        const FAT_FORMAT = 0x3;
        /// Extra data sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all locals on entry
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags of an extra data section following the method code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Exception handling table
        const EHTABLE = 0x1;
        /// Reserved, must be zero
        const OPT_ILTABLE = 0x2;
        /// Clauses use the 24-byte fat layout
        const FAT_FORMAT = 0x40;
        /// Another section follows this one
        const MORE_SECTS = 0x80;
    }
}

/// Largest code size a tiny header can describe.
pub const TINY_MAX_CODE_SIZE: usize = 63;

/// Implicit max stack of a tiny header.
pub const TINY_MAX_STACK: u16 = 8;

/// Size of a fat header in bytes.
pub const FAT_HEADER_SIZE: usize = 12;
