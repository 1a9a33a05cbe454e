use rayon::prelude::*;

use stoat_core::{
    DType, Error, Operator, Prototype, Result, RuntimeContext, Stack, Tensor, WithDType,
};

// 2-D matrix product: [m, k] · [k, n] → [m, n].
//
// Output rows are independent, so they are partitioned across the shared
// worker pool. Accumulation happens in f64 for both element types.

/// Matrix product of two rank-2 operands.
#[derive(Debug)]
pub struct InnerProd;

impl Operator for InnerProd {
    fn name(&self) -> &str {
        "inner_prod"
    }

    fn infer(&self, stack: &Stack) -> Result<Vec<Prototype>> {
        if stack.size() != 2 {
            return Err(Error::Arity {
                op: self.name().to_string(),
                expected: 2,
                got: stack.size(),
            });
        }
        let lhs = stack.index(0)?;
        let rhs = stack.index(1)?;
        if lhs.rank() != 2 || rhs.rank() != 2 {
            return Err(Error::shape(format!(
                "inner_prod expects two rank-2 operands, got {} and {}",
                lhs.shape(),
                rhs.shape()
            )));
        }
        if lhs.dim(1)? != rhs.dim(0)? {
            return Err(Error::shape(format!(
                "inner_prod inner dimensions differ: {} vs {}",
                lhs.shape(),
                rhs.shape()
            )));
        }
        if lhs.dtype() != rhs.dtype() {
            return Err(Error::shape(format!(
                "inner_prod operand dtypes differ ({} vs {})",
                lhs.dtype(),
                rhs.dtype()
            )));
        }
        if !matches!(lhs.dtype(), DType::F32 | DType::F64) {
            return Err(Error::shape(format!(
                "inner_prod supports f32 and f64 input, got {}",
                lhs.dtype()
            )));
        }
        Ok(vec![Prototype::new(
            lhs.dtype(),
            (lhs.dim(0)?, rhs.dim(1)?),
        )])
    }

    fn run(&self, stack: &mut Stack, ctx: &RuntimeContext) -> Result<usize> {
        let outputs = self.infer(stack)?;
        let lhs = stack.index(0)?.clone();
        let rhs = stack.index(1)?.clone();
        let out = stack.push_alloc(&outputs[0], ctx.device())?.clone();

        match out.dtype() {
            DType::F32 => compute::<f32>(&lhs, &rhs, &out, ctx),
            DType::F64 => compute::<f64>(&lhs, &rhs, &out, ctx),
            _ => unreachable!("rejected by infer"),
        }
        Ok(1)
    }
}

fn compute<T: WithDType>(lhs: &Tensor, rhs: &Tensor, out: &Tensor, ctx: &RuntimeContext) {
    let k = lhs.dims()[1];
    let n = rhs.dims()[1];

    let lhs_guard = lhs.memory().read();
    let rhs_guard = rhs.memory().read();
    let mut out_guard = out.memory().write();
    let a = &lhs_guard.as_slice::<T>()[..lhs.count()];
    let b = &rhs_guard.as_slice::<T>()[..rhs.count()];
    let o = &mut out_guard.as_slice_mut::<T>()[..out.count()];

    ctx.pool().install(|| {
        o.par_chunks_mut(n).enumerate().for_each(|(i, orow)| {
            let arow = &a[i * k..(i + 1) * k];
            for (j, slot) in orow.iter_mut().enumerate() {
                let mut acc = 0.0f64;
                for (t, &av) in arow.iter().enumerate() {
                    acc += av.to_f64() * b[t * n + j].to_f64();
                }
                *slot = T::from_f64(acc);
            }
        });
    });
}
