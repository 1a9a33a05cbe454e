use stoat_core::{Error, Operator, Prototype, Result, RuntimeContext, Stack, Tensor, WithDType};

use super::dispatch_dtype;

// Rectified linear unit. Shape and dtype preserving; on unsigned dtypes it
// degenerates to a copy.

/// Elementwise `max(x, 0)`.
#[derive(Debug)]
pub struct Relu;

impl Operator for Relu {
    fn name(&self) -> &str {
        "relu"
    }

    fn infer(&self, stack: &Stack) -> Result<Vec<Prototype>> {
        if stack.size() != 1 {
            return Err(Error::Arity {
                op: self.name().to_string(),
                expected: 1,
                got: stack.size(),
            });
        }
        Ok(vec![stack.index(0)?.prototype()])
    }

    fn run(&self, stack: &mut Stack, ctx: &RuntimeContext) -> Result<usize> {
        let outputs = self.infer(stack)?;
        let input = stack.index(0)?.clone();
        let out = stack.push_alloc(&outputs[0], ctx.device())?.clone();
        dispatch_dtype!(out.dtype(), T => {
            compute::<T>(&input, &out)
        });
        Ok(1)
    }
}

fn compute<T: WithDType>(input: &Tensor, out: &Tensor) {
    let in_guard = input.memory().read();
    let mut out_guard = out.memory().write();
    let a = &in_guard.as_slice::<T>()[..input.count()];
    let o = &mut out_guard.as_slice_mut::<T>()[..out.count()];
    for i in 0..o.len() {
        o[i] = if a[i] > T::zero() { a[i] } else { T::zero() };
    }
}
