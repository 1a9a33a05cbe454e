// CPU kernel tests — broadcast rule, saturating division, softmax
// properties, matrix product, reductions.

use std::sync::Arc;

use rand::Rng;

use stoat_core::{
    Attrs, Device, DeviceKind, Error, MemoryController, Operator, OperatorRegistry,
    RuntimeContext, Stack, Tensor,
};
use stoat_cpu::{Binary, InnerProd, ReduceSum, Relu, Softmax};

// Helpers

fn host() -> Arc<MemoryController> {
    Arc::new(MemoryController::host())
}

/// Frame the inputs the way the operator instruction would and run one
/// kernel, returning its single result.
fn run_kernel(op: &dyn Operator, inputs: &[Tensor]) -> Result<Tensor, Error> {
    let ctrl = host();
    let mut stack = Stack::new(Arc::clone(&ctrl));
    for t in inputs {
        stack.push(t.clone());
    }
    stack.push_base(inputs.len()).unwrap();
    let ctx = RuntimeContext::with_threads(Device::cpu(), 2).unwrap();
    let produced = op.run(&mut stack, &ctx)?;
    assert_eq!(produced, 1);
    Ok(stack.index(-1).unwrap().clone())
}

fn f32_tensor(data: &[f32], shape: impl Into<stoat_core::Shape>) -> Tensor {
    Tensor::from_vec(data, shape, &host()).unwrap()
}

fn f64_tensor(data: &[f64], shape: impl Into<stoat_core::Shape>) -> Tensor {
    Tensor::from_vec(data, shape, &host()).unwrap()
}

// Elementwise arithmetic

#[test]
fn test_add_same_shape() {
    let a = f32_tensor(&[1.0, 2.0, 3.0, 4.0], (2, 2));
    let b = f32_tensor(&[10.0, 20.0, 30.0, 40.0], (2, 2));
    let out = run_kernel(&Binary::add(), &[a, b]).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![11.0, 22.0, 33.0, 44.0]);
}

#[test]
fn test_sub_integers() {
    let ctrl = host();
    let a = Tensor::from_vec(&[10i32, 7, 3], 3, &ctrl).unwrap();
    let b = Tensor::from_vec(&[1i32, 2, 3], 3, &ctrl).unwrap();
    let out = run_kernel(&Binary::sub(), &[a, b]).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![9, 5, 0]);
}

#[test]
fn test_div_matches_scalar_division() {
    let a = f64_tensor(&[9.0, -8.0, 7.5, 1.0], (2, 2));
    let b = f64_tensor(&[3.0, 2.0, -2.5, 4.0], (2, 2));
    let out = run_kernel(&Binary::div(), &[a, b]).unwrap();
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![3.0, -4.0, -3.0, 0.25]);
}

// Saturating division

#[test]
fn test_div_by_zero_saturates_f32() {
    let a = f32_tensor(&[5.0, -5.0, 0.0], 3);
    let b = f32_tensor(&[0.0, 0.0, 0.0], 3);
    let out = run_kernel(&Binary::div(), &[a, b]).unwrap();
    let v = out.to_vec::<f32>().unwrap();
    assert_eq!(v, vec![f32::MAX, f32::MIN, f32::MAX]);
    assert!(v.iter().all(|x| !x.is_nan() && x.is_finite()));
}

#[test]
fn test_div_by_zero_saturates_i32() {
    let ctrl = host();
    let a = Tensor::from_vec(&[7i32, -7], 2, &ctrl).unwrap();
    let b = Tensor::from_vec(&[0i32, 0], 2, &ctrl).unwrap();
    let out = run_kernel(&Binary::div(), &[a, b]).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![i32::MAX, i32::MIN]);
}

#[test]
fn test_div_by_zero_saturates_unsigned() {
    let ctrl = host();
    let a = Tensor::from_vec(&[9u8, 0], 2, &ctrl).unwrap();
    let b = Tensor::from_vec(&[0u8, 0], 2, &ctrl).unwrap();
    let out = run_kernel(&Binary::div(), &[a, b]).unwrap();
    assert_eq!(out.to_vec::<u8>().unwrap(), vec![u8::MAX, u8::MAX]);
}

#[test]
fn test_div_by_zero_saturates_f16() {
    let ctrl = host();
    let a = Tensor::from_vec(&[half::f16::from_f64(2.0), half::f16::from_f64(-2.0)], 2, &ctrl)
        .unwrap();
    let b = Tensor::from_vec(&[half::f16::ZERO, half::f16::ZERO], 2, &ctrl).unwrap();
    let out = run_kernel(&Binary::div(), &[a, b]).unwrap();
    assert_eq!(
        out.to_vec::<half::f16>().unwrap(),
        vec![half::f16::MAX, half::f16::MIN]
    );
}

// Broadcasting

#[test]
fn test_broadcast_expands_size_one_dim() {
    let a = f32_tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3));
    let b = f32_tensor(&[10.0, 20.0, 30.0], (1, 3));
    let out = run_kernel(&Binary::add(), &[a, b]).unwrap();
    assert_eq!(out.dims(), &[2, 3]);
    assert_eq!(
        out.to_vec::<f32>().unwrap(),
        vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]
    );
}

#[test]
fn test_broadcast_scalar_operand() {
    let a = f32_tensor(&[2.0], 1);
    let b = f32_tensor(&[1.0, 2.0, 4.0, 8.0], (2, 2));
    let out = run_kernel(&Binary::div(), &[a, b]).unwrap();
    assert_eq!(out.dims(), &[2, 2]);
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![2.0, 1.0, 0.5, 0.25]);
}

#[test]
fn test_broadcast_incompatible_extents() {
    let a = f32_tensor(&[0.0; 6], (2, 3));
    let b = f32_tensor(&[0.0; 8], (2, 4));
    let err = run_kernel(&Binary::add(), &[a, b]);
    assert!(matches!(err, Err(Error::Shape { .. })));
}

#[test]
fn test_binary_rejects_dtype_mismatch() {
    let ctrl = host();
    let a = Tensor::from_vec(&[1.0f32, 2.0], 2, &ctrl).unwrap();
    let b = Tensor::from_vec(&[1.0f64, 2.0], 2, &ctrl).unwrap();
    let err = run_kernel(&Binary::add(), &[a, b]);
    assert!(matches!(err, Err(Error::Shape { .. })));
}

#[test]
fn test_binary_arity_checked() {
    let a = f32_tensor(&[1.0], 1);
    let err = run_kernel(&Binary::add(), &[a]);
    assert!(matches!(err, Err(Error::Arity { .. })));
}

// Relu

#[test]
fn test_relu_clamps_negatives() {
    let a = f32_tensor(&[-1.0, 0.0, 2.5, -0.5], (2, 2));
    let out = run_kernel(&Relu, &[a]).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![0.0, 0.0, 2.5, 0.0]);
}

#[test]
fn test_relu_unsigned_is_identity() {
    let ctrl = host();
    let a = Tensor::from_vec(&[0u32, 3, 9], 3, &ctrl).unwrap();
    let out = run_kernel(&Relu, &[a]).unwrap();
    assert_eq!(out.to_vec::<u32>().unwrap(), vec![0, 3, 9]);
}

// Softmax

fn softmax_with_dim(dim: i64) -> Softmax {
    let mut op = Softmax::new();
    op.init(&Attrs::new().with_int("dim", dim)).unwrap();
    op
}

#[test]
fn test_softmax_rows_sum_to_one() {
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..24).map(|_| rng.gen_range(-4.0..4.0)).collect();
    let input = f64_tensor(&data, (3, 4, 2));

    let op = softmax_with_dim(1);
    let out = run_kernel(&op, &[input]).unwrap();
    let v = out.to_vec::<f64>().unwrap();

    // Sum along the chosen axis for every fixed (pre, inner) index.
    for pre in 0..3 {
        for k in 0..2 {
            let sum: f64 = (0..4).map(|j| v[pre * 8 + j * 2 + k]).sum();
            assert!((sum - 1.0).abs() < 1e-12, "sum was {}", sum);
        }
    }
}

#[test]
fn test_softmax_shift_invariant() {
    let data = [0.5f64, -1.0, 2.0, 0.0, 3.0, -2.0];
    let shifted: Vec<f64> = data.iter().map(|x| x + 100.0).collect();

    let op = softmax_with_dim(0);
    let out_a = run_kernel(&op, &[f64_tensor(&data, 6)]).unwrap();
    let out_b = run_kernel(&op, &[f64_tensor(&shifted, 6)]).unwrap();

    let a = out_a.to_vec::<f64>().unwrap();
    let b = out_b.to_vec::<f64>().unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn test_softmax_requires_dim_attribute() {
    let mut op = Softmax::new();
    let err = op.init(&Attrs::new());
    assert!(matches!(err, Err(Error::Configuration { .. })));
}

#[test]
fn test_softmax_rejects_negative_dim() {
    let mut op = Softmax::new();
    let err = op.init(&Attrs::new().with_int("dim", -1));
    assert!(matches!(err, Err(Error::Configuration { .. })));
}

#[test]
fn test_softmax_dim_out_of_rank() {
    let op = softmax_with_dim(2);
    let err = run_kernel(&op, &[f64_tensor(&[1.0, 2.0], 2)]);
    assert!(matches!(err, Err(Error::Configuration { .. })));
}

#[test]
fn test_softmax_rejects_integer_input() {
    let ctrl = host();
    let input = Tensor::from_vec(&[1i64, 2, 3], 3, &ctrl).unwrap();
    let op = softmax_with_dim(0);
    let err = run_kernel(&op, &[input]);
    assert!(matches!(err, Err(Error::Shape { .. })));
}

// Inner product

#[test]
fn test_inner_prod() {
    let a = f32_tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3));
    let b = f32_tensor(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], (3, 2));
    let out = run_kernel(&InnerProd, &[a, b]).unwrap();
    assert_eq!(out.dims(), &[2, 2]);
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![58.0, 64.0, 139.0, 154.0]);
}

#[test]
fn test_inner_prod_rejects_mismatched_inner_dim() {
    let a = f32_tensor(&[0.0; 6], (2, 3));
    let b = f32_tensor(&[0.0; 8], (4, 2));
    let err = run_kernel(&InnerProd, &[a, b]);
    assert!(matches!(err, Err(Error::Shape { .. })));
}

// Reduce

#[test]
fn test_reduce_sum_drops_axis() {
    let mut op = ReduceSum::new();
    op.init(&Attrs::new().with_int("dim", 1)).unwrap();
    let input = f64_tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3));
    let out = run_kernel(&op, &[input]).unwrap();
    assert_eq!(out.dims(), &[2]);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![6.0, 15.0]);
}

#[test]
fn test_reduce_sum_keepdim() {
    let mut op = ReduceSum::new();
    op.init(&Attrs::new().with_int("dim", 0).with_bool("keepdim", true))
        .unwrap();
    let input = f64_tensor(&[1.0, 2.0, 3.0, 4.0], (2, 2));
    let out = run_kernel(&op, &[input]).unwrap();
    assert_eq!(out.dims(), &[1, 2]);
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![4.0, 6.0]);
}

#[test]
fn test_reduce_sum_to_scalar_convention() {
    let mut op = ReduceSum::new();
    op.init(&Attrs::new().with_int("dim", 0)).unwrap();
    let input = f64_tensor(&[1.5, 2.5], 2);
    let out = run_kernel(&op, &[input]).unwrap();
    assert!(out.shape().is_scalar());
    assert_eq!(out.to_vec::<f64>().unwrap(), vec![4.0]);
}

// Registration

#[test]
fn test_register_covers_kernel_set() {
    let mut registry = OperatorRegistry::new();
    stoat_cpu::register(&mut registry);
    for name in [
        "add",
        "sub",
        "mul",
        "div",
        "relu",
        "softmax",
        "inner_prod",
        "reduce_sum",
    ] {
        assert!(registry.contains(DeviceKind::Cpu, name), "missing {}", name);
    }
    assert!(matches!(
        registry.build(DeviceKind::Gpu, "div"),
        Err(Error::UnsupportedOperator { .. })
    ));
}
