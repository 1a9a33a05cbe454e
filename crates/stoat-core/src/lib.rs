//! # stoat-core
//!
//! Core types for the stoat inference runtime.
//!
//! This crate provides:
//! - [`Tensor`] / [`Prototype`] — values and their (dtype, shape) descriptions
//! - [`DType`] / [`WithDType`] — the supported element types and the bridge
//!   to Rust element types
//! - [`Shape`] — dimension sizes, strides, and the broadcast rule
//! - [`Memory`] / [`MemoryController`] / [`Allocator`] — reference-counted
//!   device buffers and the controllers that issue them
//! - [`Stack`] — the operand stack with top-anchored indexing and frames
//! - [`Operator`] / [`OperatorRegistry`] — the kernel capability contract
//!   and the (device-kind, name) dispatch table
//! - [`RuntimeContext`] — device selection and the shared worker pool
//!
//! The execution workbench, instruction set, and module boundary live in the
//! `stoat` facade crate; the reference CPU kernels live in `stoat-cpu`.

pub mod context;
pub mod device;
pub mod dtype;
pub mod error;
pub mod memory;
pub mod operator;
pub mod registry;
pub mod shape;
pub mod stack;
pub mod tensor;

pub use context::RuntimeContext;
pub use device::{Device, DeviceKind};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use memory::{
    query_allocator, register_allocator, Allocator, ControllerStats, HardMemory, HostAllocator,
    Memory, MemoryController,
};
pub use operator::{AttrValue, Attrs, Operator};
pub use registry::{OperatorBuilder, OperatorRegistry};
pub use shape::Shape;
pub use stack::Stack;
pub use tensor::{Prototype, Tensor};
