// The execution engine: the instruction set and the workbench that drives
// it. Module loading lives in `crate::module`; the kernels themselves come
// from backend crates through the operator registry.

pub mod instruction;
pub mod workbench;

pub use instruction::Instruction;
pub use workbench::{State, Workbench};
