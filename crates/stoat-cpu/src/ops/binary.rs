use stoat_core::{
    Error, Operator, Prototype, Result, RuntimeContext, Shape, Stack, Tensor, WithDType,
};

use super::dispatch_dtype;

// Elementwise binary kernels — add, sub, mul, div
//
// One kernel type covers all four arithmetic variants; the variant only
// changes the scalar combine function. All four share the broadcast rule
// (see Shape::broadcast_pair) and require equal operand dtypes.
//
// Division by zero does not raise and does not produce NaN/Inf: the result
// saturates to the dtype's representable maximum when the dividend is
// non-negative, and to its minimum otherwise. This holds for every dtype,
// floats included.

/// The arithmetic variant of a [`Binary`] kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
}

/// Elementwise binary operator with broadcasting.
#[derive(Debug)]
pub struct Binary {
    kind: BinaryKind,
}

impl Binary {
    pub fn add() -> Self {
        Binary {
            kind: BinaryKind::Add,
        }
    }

    pub fn sub() -> Self {
        Binary {
            kind: BinaryKind::Sub,
        }
    }

    pub fn mul() -> Self {
        Binary {
            kind: BinaryKind::Mul,
        }
    }

    pub fn div() -> Self {
        Binary {
            kind: BinaryKind::Div,
        }
    }

    pub fn kind(&self) -> BinaryKind {
        self.kind
    }
}

impl Operator for Binary {
    fn name(&self) -> &str {
        match self.kind {
            BinaryKind::Add => "add",
            BinaryKind::Sub => "sub",
            BinaryKind::Mul => "mul",
            BinaryKind::Div => "div",
        }
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
        if lhs.dims().contains(&0) || rhs.dims().contains(&0) {
            return Err(Error::shape(format!(
                "{}: zero-extent operand dimension ({} vs {})",
                self.name(),
                lhs.shape(),
                rhs.shape()
            )));
        }
        if lhs.dtype() != rhs.dtype() {
            return Err(Error::shape(format!(
                "{}: operand dtypes differ ({} vs {})",
                self.name(),
                lhs.dtype(),
                rhs.dtype()
            )));
        }
        let shape = Shape::broadcast_pair(lhs.shape(), rhs.shape())?;
        Ok(vec![Prototype::new(lhs.dtype(), shape)])
    }

    fn run(&self, stack: &mut Stack, ctx: &RuntimeContext) -> Result<usize> {
        let outputs = self.infer(stack)?;
        let lhs = stack.index(0)?.clone();
        let rhs = stack.index(1)?.clone();
        let out = stack.push_alloc(&outputs[0], ctx.device())?.clone();
        dispatch_dtype!(out.dtype(), T => {
            compute::<T>(self.kind, &lhs, &rhs, &out)
        });
        Ok(1)
    }
}

/// Combine two elements under the given variant.
#[inline]
fn apply<T: WithDType>(kind: BinaryKind, a: T, b: T) -> T {
    match kind {
        BinaryKind::Add => a + b,
        BinaryKind::Sub => a - b,
        BinaryKind::Mul => a * b,
        BinaryKind::Div => {
            if b == T::zero() {
                // Saturate on the zero-divisor singularity.
                if a >= T::zero() {
                    T::max_value()
                } else {
                    T::min_value()
                }
            } else {
                a / b
            }
        }
    }
}

fn compute<T: WithDType>(kind: BinaryKind, lhs: &Tensor, rhs: &Tensor, out: &Tensor) {
    let lhs_guard = lhs.memory().read();
    let rhs_guard = rhs.memory().read();
    let mut out_guard = out.memory().write();
    let a = &lhs_guard.as_slice::<T>()[..lhs.count()];
    let b = &rhs_guard.as_slice::<T>()[..rhs.count()];
    let o = &mut out_guard.as_slice_mut::<T>()[..out.count()];

    if lhs.shape() == rhs.shape() {
        for i in 0..o.len() {
            o[i] = apply(kind, a[i], b[i]);
        }
    } else if lhs.shape().is_scalar() {
        for i in 0..o.len() {
            o[i] = apply(kind, a[0], b[i]);
        }
    } else if rhs.shape().is_scalar() {
        for i in 0..o.len() {
            o[i] = apply(kind, a[i], b[0]);
        }
    } else {
        // Equal-rank broadcast: size-1 dimensions read with stride 0.
        let out_strides = out.shape().stride_contiguous();
        let lhs_strides = lhs.shape().broadcast_strides(out.shape());
        let rhs_strides = rhs.shape().broadcast_strides(out.shape());
        for i in 0..o.len() {
            let mut rem = i;
            let mut li = 0;
            let mut ri = 0;
            for d in 0..out_strides.len() {
                let coord = rem / out_strides[d];
                rem %= out_strides[d];
                li += coord * lhs_strides[d];
                ri += coord * rhs_strides[d];
            }
            o[i] = apply(kind, a[li], b[ri]);
        }
    }
}
