//! Architecture support.
//!
//! The kernel targets 32-bit x86 protected mode only; the `x86` module is
//! compiled everywhere (its pure parts carry the host unit tests) and its
//! assembly-backed entry points are gated on the bare-metal target.

pub mod x86;
