// Immediate-mode tests — the online path bypasses the compiled program and
// leaves the workbench's program state untouched.

use std::sync::Arc;

use stoat::prelude::*;
use stoat::{online, Error};

fn host() -> Arc<MemoryController> {
    Arc::new(MemoryController::host())
}

fn f32_tensor(data: &[f32], shape: impl Into<Shape>) -> Tensor {
    Tensor::from_vec(data, shape, &host()).unwrap()
}

#[test]
fn test_online_arithmetic() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let a = f32_tensor(&[6.0, 8.0, 10.0], 3);
    let b = f32_tensor(&[2.0, 2.0, 2.0], 3);

    let sum = online::add(&mut bench, &a, &b).unwrap();
    assert_eq!(sum.to_vec::<f32>().unwrap(), vec![8.0, 10.0, 12.0]);
    let diff = online::sub(&mut bench, &a, &b).unwrap();
    assert_eq!(diff.to_vec::<f32>().unwrap(), vec![4.0, 6.0, 8.0]);
    let prod = online::mul(&mut bench, &a, &b).unwrap();
    assert_eq!(prod.to_vec::<f32>().unwrap(), vec![12.0, 16.0, 20.0]);
    let quot = online::div(&mut bench, &a, &b).unwrap();
    assert_eq!(quot.to_vec::<f32>().unwrap(), vec![3.0, 4.0, 5.0]);
}

#[test]
fn test_online_leaves_program_state_untouched() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let a = f32_tensor(&[1.0], 1);
    let b = f32_tensor(&[2.0], 1);

    online::add(&mut bench, &a, &b).unwrap();
    assert_eq!(bench.state(), State::Idle);
    assert_eq!(bench.pointer(), 0);
    assert_eq!(bench.stack().size(), 0);
}

#[test]
fn test_online_stack_restored_after_kernel_error() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let a = f32_tensor(&[1.0, 2.0], 2);
    let b = f32_tensor(&[1.0, 2.0, 3.0], 3);

    let err = online::add(&mut bench, &a, &b);
    assert!(matches!(err, Err(Error::Shape { .. })));
    assert_eq!(bench.stack().size(), 0);
}

#[test]
fn test_online_div_saturates_like_compiled() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let a = f32_tensor(&[3.0, -3.0], 2);
    let zero = f32_tensor(&[0.0, 0.0], 2);

    let out = online::div(&mut bench, &a, &zero).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![f32::MAX, f32::MIN]);
}

#[test]
fn test_online_run_with_attributes() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let input = f32_tensor(&[1.0, 1.0, 1.0, 1.0], (2, 2));

    let results = online::run(
        &mut bench,
        "softmax",
        &Attrs::new().with_int("dim", 1),
        &[input],
    )
    .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].to_vec::<f32>().unwrap(),
        vec![0.5, 0.5, 0.5, 0.5]
    );
}

#[test]
fn test_online_unknown_operator() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let a = f32_tensor(&[1.0], 1);
    let err = online::run(&mut bench, "fft", &Attrs::new(), &[a]);
    assert!(matches!(err, Err(Error::UnsupportedOperator { .. })));
}

#[test]
fn test_online_result_outlives_later_calls() {
    let mut bench = Workbench::new(Device::cpu(), setup()).unwrap();
    let a = f32_tensor(&[4.0, 5.0], 2);
    let b = f32_tensor(&[1.0, 1.0], 2);

    let first = online::add(&mut bench, &a, &b).unwrap();
    // Further online work reuses the stack; the earlier result's buffer is
    // kept alive by its own handle.
    online::mul(&mut bench, &a, &b).unwrap();
    assert_eq!(first.to_vec::<f32>().unwrap(), vec![5.0, 6.0]);
}
