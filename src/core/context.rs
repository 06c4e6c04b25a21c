//! CPU context layout.
//!
//! Generated code keeps T0, T1, T2 and A0 in host registers while a block
//! runs. The trampoline loads them from the interpreter's context object on
//! entry and stores them back on exit, at the offsets given here.

use std::mem::offset_of;

/// A virtual register stored in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextField {
    T0,
    T1,
    T2,
    A0,
}

impl ContextField {
    pub const ALL: [ContextField; 4] = [
        ContextField::T0,
        ContextField::T1,
        ContextField::T2,
        ContextField::A0,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ContextField::T0 => "T0",
            ContextField::T1 => "T1",
            ContextField::T2 => "T2",
            ContextField::A0 => "A0",
        }
    }
}

/// Default register file, usable as the context object by itself or
/// embedded in a larger CPU state.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VirtualRegisters {
    pub t0: u32,
    pub t1: u32,
    pub t2: u32,
    reserved: u32,
    pub a0: usize,
}

/// Byte offsets of the virtual registers from the context pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLayout {
    pub t0: i32,
    pub t1: i32,
    pub t2: i32,
    pub a0: i32,
}

impl ContextLayout {
    /// Layout of a bare [`VirtualRegisters`].
    pub const fn native() -> Self {
        Self::embedded(0)
    }

    /// Layout of a [`VirtualRegisters`] placed `base` bytes into a larger struct.
    pub const fn embedded(base: i32) -> Self {
        Self {
            t0: base + offset_of!(VirtualRegisters, t0) as i32,
            t1: base + offset_of!(VirtualRegisters, t1) as i32,
            t2: base + offset_of!(VirtualRegisters, t2) as i32,
            a0: base + offset_of!(VirtualRegisters, a0) as i32,
        }
    }

    pub fn offset(&self, field: ContextField) -> i32 {
        match field {
            ContextField::T0 => self.t0,
            ContextField::T1 => self.t1,
            ContextField::T2 => self.t2,
            ContextField::A0 => self.a0,
        }
    }
}

impl Default for ContextLayout {
    fn default() -> Self {
        Self::native()
    }
}
