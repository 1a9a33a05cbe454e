use rayon::prelude::*;

use stoat_core::{
    Attrs, DType, Error, Operator, Prototype, Result, RuntimeContext, Stack, Tensor, WithDType,
};

// Softmax over one axis.
//
// The input is decomposed as [pre, axis, inner]: every dimension before the
// chosen axis is folded into `pre`, every dimension after into `inner`. Each
// of the pre-rows is independent, so rows are partitioned across the shared
// worker pool; within a row, the numerically stable max-subtracted form is
// used, which makes the result invariant under adding a constant along the
// axis.

/// Softmax along a configured axis. F32/F64 only.
#[derive(Debug)]
pub struct Softmax {
    dim: usize,
}

impl Softmax {
    pub fn new() -> Self {
        Softmax { dim: 0 }
    }
}

impl Default for Softmax {
    fn default() -> Self {
        Softmax::new()
    }
}

impl Operator for Softmax {
    fn name(&self) -> &str {
        "softmax"
    }

    fn init(&mut self, attrs: &Attrs) -> Result<()> {
        let dim = attrs.require_int(self.name(), "dim")?;
        if dim < 0 {
            return Err(Error::config(
                self.name(),
                format!("attribute 'dim' must be non-negative, got {}", dim),
            ));
        }
        self.dim = dim as usize;
        Ok(())
    }

    fn infer(&self, stack: &Stack) -> Result<Vec<Prototype>> {
        if stack.size() != 1 {
            return Err(Error::Arity {
                op: self.name().to_string(),
                expected: 1,
                got: stack.size(),
            });
        }
        let input = stack.index(0)?;
        if !matches!(input.dtype(), DType::F32 | DType::F64) {
            return Err(Error::shape(format!(
                "softmax supports f32 and f64 input, got {}",
                input.dtype()
            )));
        }
        if self.dim >= input.rank() {
            return Err(Error::config(
                self.name(),
                format!(
                    "attribute 'dim' is {} but the input has rank {}",
                    self.dim,
                    input.rank()
                ),
            ));
        }
        Ok(vec![input.prototype()])
    }

    fn run(&self, stack: &mut Stack, ctx: &RuntimeContext) -> Result<usize> {
        let outputs = self.infer(stack)?;
        let input = stack.index(0)?.clone();
        let out = stack.push_alloc(&outputs[0], ctx.device())?.clone();

        let dims = input.dims();
        let axis = dims[self.dim];
        let inner: usize = dims[self.dim + 1..].iter().product();

        match input.dtype() {
            DType::F32 => compute::<f32>(&input, &out, axis, inner, ctx),
            DType::F64 => compute::<f64>(&input, &out, axis, inner, ctx),
            _ => unreachable!("rejected by infer"),
        }
        Ok(1)
    }
}

fn compute<T: WithDType>(input: &Tensor, out: &Tensor, axis: usize, inner: usize, ctx: &RuntimeContext) {
    let in_guard = input.memory().read();
    let mut out_guard = out.memory().write();
    let a = &in_guard.as_slice::<T>()[..input.count()];
    let o = &mut out_guard.as_slice_mut::<T>()[..out.count()];

    let row = axis * inner;
    ctx.pool().install(|| {
        o.par_chunks_mut(row)
            .zip(a.par_chunks(row))
            .for_each(|(orow, arow)| softmax_row(orow, arow, axis, inner));
    });
}

/// One [axis, inner] block: for each inner lane, max-subtract, exponentiate,
/// normalize.
fn softmax_row<T: WithDType>(o: &mut [T], a: &[T], axis: usize, inner: usize) {
    for k in 0..inner {
        let mut max = a[k];
        for j in 1..axis {
            let v = a[j * inner + k];
            if v > max {
                max = v;
            }
        }
        let max = max.to_f64();

        let mut denom = 0.0f64;
        for j in 0..axis {
            let e = (a[j * inner + k].to_f64() - max).exp();
            o[j * inner + k] = T::from_f64(e);
            denom += e;
        }
        for j in 0..axis {
            o[j * inner + k] = T::from_f64(o[j * inner + k].to_f64() / denom);
        }
    }
}
