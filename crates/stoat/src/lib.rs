//! # stoat
//!
//! An inference runtime for precompiled tensor programs.
//!
//! A compiled module — a graph already topologically linearized — is loaded
//! into an execution [`Workbench`]; inputs are bound to named slots; `run()`
//! walks the instruction pointer through the program, each instruction
//! mutating the operand stack or redirecting the pointer; results are read
//! from named output slots.
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `stoat-core` | Tensor, Shape, DType, memory layer, operand stack, operator registry |
//! | `stoat-cpu` | Reference CPU kernels and the host allocator |
//! | `stoat` | Module boundary, instruction set, execution workbench, online API |
//!
//! ## Usage
//!
//! ```ignore
//! use stoat::prelude::*;
//!
//! let registry = stoat::setup();
//! let module = Module::new()
//!     .with_input("a", Prototype::new(DType::F32, 3))
//!     .with_input("b", Prototype::new(DType::F32, 3))
//!     .with_code(Code::PushInput(0))
//!     .with_code(Code::PushInput(1))
//!     .with_code(Code::call("sub", 2, 1))
//!     .with_output("c", -1);
//! let mut bench = Workbench::load(&module, Device::cpu(), registry)?;
//! bench.input("a", a)?;
//! bench.input("b", b)?;
//! bench.run()?;
//! let c = bench.output("c")?;
//! ```

use std::sync::Arc;

/// Re-export core types.
pub use stoat_core::{
    query_allocator, register_allocator, Allocator, AttrValue, Attrs, ControllerStats, Device,
    DeviceKind, DType, Error, HostAllocator, Memory, MemoryController, Operator, OperatorBuilder,
    OperatorRegistry, Prototype, Result, RuntimeContext, Shape, Stack, Tensor, WithDType,
};

/// The compiled-module boundary.
pub mod module;

/// Instruction set and execution workbench.
pub mod runtime;

/// Immediate-mode evaluation over a workbench.
pub mod online;

pub use module::{Code, Module};
pub use runtime::{Instruction, State, Workbench};

/// Build the default operator registry: every kernel of every linked
/// backend, registered deterministically.
///
/// Call once at process initialization and inject the result into
/// [`Workbench::load`].
pub fn setup() -> Arc<OperatorRegistry> {
    let mut registry = OperatorRegistry::new();
    stoat_cpu::register(&mut registry);
    Arc::new(registry)
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::module::{Code, Module};
    pub use crate::online;
    pub use crate::runtime::{Instruction, State, Workbench};
    pub use crate::setup;
    pub use stoat_core::{
        Attrs, Device, DeviceKind, DType, Error, MemoryController, OperatorRegistry, Prototype,
        Result, RuntimeContext, Shape, Stack, Tensor,
    };
}
