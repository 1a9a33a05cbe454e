use stoat_core::{
    Attrs, Error, Operator, Prototype, Result, RuntimeContext, Shape, Stack, Tensor, WithDType,
};

use super::dispatch_dtype;

// Sum reduction along one axis.
//
// Same [pre, axis, inner] decomposition as softmax. The reduced dimension is
// removed from the output shape, or kept as extent 1 when `keepdim` is set;
// reducing the only dimension yields the rank-1 extent-1 scalar convention.

/// Sum along a configured axis.
#[derive(Debug)]
pub struct ReduceSum {
    dim: usize,
    keepdim: bool,
}

impl ReduceSum {
    pub fn new() -> Self {
        ReduceSum {
            dim: 0,
            keepdim: false,
        }
    }
}

impl Default for ReduceSum {
    fn default() -> Self {
        ReduceSum::new()
    }
}

impl Operator for ReduceSum {
    fn name(&self) -> &str {
        "reduce_sum"
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
        self.keepdim = attrs.bool_or(self.name(), "keepdim", false)?;
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
        let mut dims = input.dims().to_vec();
        if self.keepdim {
            dims[self.dim] = 1;
        } else {
            dims.remove(self.dim);
            if dims.is_empty() {
                dims.push(1);
            }
        }
        Ok(vec![Prototype::new(input.dtype(), Shape::new(dims))])
    }

    fn run(&self, stack: &mut Stack, ctx: &RuntimeContext) -> Result<usize> {
        let outputs = self.infer(stack)?;
        let input = stack.index(0)?.clone();
        let out = stack.push_alloc(&outputs[0], ctx.device())?.clone();

        let dims = input.dims();
        let axis = dims[self.dim];
        let inner: usize = dims[self.dim + 1..].iter().product();
        let pre: usize = dims[..self.dim].iter().product();

        dispatch_dtype!(out.dtype(), T => {
            compute::<T>(&input, &out, pre, axis, inner)
        });
        Ok(1)
    }
}

fn compute<T: WithDType>(input: &Tensor, out: &Tensor, pre: usize, axis: usize, inner: usize) {
    let in_guard = input.memory().read();
    let mut out_guard = out.memory().write();
    let a = &in_guard.as_slice::<T>()[..input.count()];
    let o = &mut out_guard.as_slice_mut::<T>()[..out.count()];

    for i in 0..pre {
        for k in 0..inner {
            let mut acc = 0.0f64;
            for j in 0..axis {
                acc += a[i * axis * inner + j * inner + k].to_f64();
            }
            o[i * inner + k] = T::from_f64(acc);
        }
    }
}
