//! # stoat-cpu
//!
//! Reference CPU kernels for the stoat inference runtime.
//!
//! Each kernel implements the [`Operator`](stoat_core::Operator) capability
//! contract and registers under [`DeviceKind::Cpu`](stoat_core::DeviceKind).
//! Registration is an explicit call:
//!
//! ```ignore
//! let mut registry = OperatorRegistry::new();
//! stoat_cpu::register(&mut registry);
//! ```
//!
//! The kernel set: `add`, `sub`, `mul`, `div` (elementwise, broadcasting,
//! saturating division), `relu`, `softmax`, `inner_prod`, `reduce_sum`.

pub mod ops;

pub use ops::binary::{Binary, BinaryKind};
pub use ops::inner_prod::InnerProd;
pub use ops::reduce::ReduceSum;
pub use ops::softmax::Softmax;
pub use ops::unary::Relu;

use stoat_core::{DeviceKind, OperatorRegistry};

/// Register every CPU kernel in `registry`.
///
/// Deterministic and idempotent; call once during process initialization,
/// before loading any module that targets a CPU device.
pub fn register(registry: &mut OperatorRegistry) {
    registry.register(DeviceKind::Cpu, "add", || Box::new(Binary::add()));
    registry.register(DeviceKind::Cpu, "sub", || Box::new(Binary::sub()));
    registry.register(DeviceKind::Cpu, "mul", || Box::new(Binary::mul()));
    registry.register(DeviceKind::Cpu, "div", || Box::new(Binary::div()));
    registry.register(DeviceKind::Cpu, "relu", || Box::new(Relu));
    registry.register(DeviceKind::Cpu, "softmax", || Box::new(Softmax::new()));
    registry.register(DeviceKind::Cpu, "inner_prod", || Box::new(InnerProd));
    registry.register(DeviceKind::Cpu, "reduce_sum", || Box::new(ReduceSum::new()));
}
