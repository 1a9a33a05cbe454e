use stoat_core::{Attrs, Error, Result, Tensor};

use crate::runtime::workbench::Workbench;

// Immediate-mode evaluation.
//
// Resolves an operator by name against a workbench's registry and device,
// configures it, and evaluates it in one call — no compiled program
// involved. The workbench's program state is untouched; results keep their
// memory alive through their own handles.

/// Run one named operator on `inputs` and return all of its results.
pub fn run(
    bench: &mut Workbench,
    name: &str,
    attrs: &Attrs,
    inputs: &[Tensor],
) -> Result<Vec<Tensor>> {
    bench.online_run(name, attrs, inputs)
}

/// Run a single-result operator, unwrapping its one output.
fn run_single(bench: &mut Workbench, name: &str, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let mut results = bench.online_run(name, &Attrs::new(), &[lhs.clone(), rhs.clone()])?;
    results
        .pop()
        .ok_or_else(|| Error::msg(format!("operator '{}' produced no result", name)))
}

/// Elementwise `lhs + rhs`.
pub fn add(bench: &mut Workbench, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    run_single(bench, "add", lhs, rhs)
}

/// Elementwise `lhs - rhs`.
pub fn sub(bench: &mut Workbench, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    run_single(bench, "sub", lhs, rhs)
}

/// Elementwise `lhs * rhs`.
pub fn mul(bench: &mut Workbench, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    run_single(bench, "mul", lhs, rhs)
}

/// Elementwise `lhs / rhs` (saturating on zero divisors).
pub fn div(bench: &mut Workbench, lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    run_single(bench, "div", lhs, rhs)
}
