use std::fmt;

use crate::error::{Error, Result};

// Shape — N-dimensional shape representation
//
// A Shape describes the size of each dimension of a tensor:
//   - Scalar: Shape([1])        — rank 1, extent 1 (the scalar convention
//     used by compiled programs: a scalar is a one-element vector)
//   - Vector: Shape([5])        — 1 dimension, 5 elements
//   - Matrix: Shape([3, 4])     — 2 dimensions, 12 elements
//
// The shape determines how many elements the tensor holds (product of all
// dims), the row-major strides into flat storage, and whether two tensors
// are compatible operands under the broadcast rule.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }

    /// Whether this shape is the scalar convention: rank 1, extent 1.
    pub fn is_scalar(&self) -> bool {
        self.0.len() == 1 && self.0[0] == 1
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or_else(|| {
            Error::shape(format!(
                "dimension {} out of range for rank {}",
                d,
                self.rank()
            ))
        })
    }

    /// Compute the contiguous (row-major / C-order) strides for this shape.
    ///
    /// For shape [2, 3, 4], strides are [12, 4, 1]: moving one step in dim 0
    /// jumps 12 elements, one step in dim 2 jumps 1 element.
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    // Broadcasting

    /// Combine two operand shapes under the elementwise broadcast rule.
    ///
    /// The rule shared by the binary kernels:
    ///   1. A rank-1 extent-1 operand (a scalar) combines with any shape.
    ///   2. Otherwise the ranks must be equal.
    ///   3. Per dimension, the sizes must be equal or exactly one of them
    ///      must be 1, in which case the output takes the non-1 size.
    ///
    /// Any other mismatch is a shape error.
    ///
    /// Examples:
    ///   [2, 3] and [1, 3] → [2, 3]
    ///   [2, 3] and [2, 4] → Error
    ///   [1]    and [5, 6] → [5, 6]
    pub fn broadcast_pair(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        if lhs.is_scalar() {
            return Ok(rhs.clone());
        }
        if rhs.is_scalar() {
            return Ok(lhs.clone());
        }
        if lhs.rank() != rhs.rank() {
            return Err(Error::shape(format!(
                "operands {} and {} differ in rank and neither is a scalar",
                lhs, rhs
            )));
        }
        let mut out = Vec::with_capacity(lhs.rank());
        for (i, (&l, &r)) in lhs.dims().iter().zip(rhs.dims()).enumerate() {
            if l == r {
                out.push(l);
            } else if l == 1 {
                out.push(r);
            } else if r == 1 {
                out.push(l);
            } else {
                return Err(Error::shape(format!(
                    "operands {} and {} are incompatible at dimension {} ({} vs {})",
                    lhs, rhs, i, l, r
                )));
            }
        }
        Ok(Shape::new(out))
    }

    /// Strides for reading this shape as if it had the target broadcast shape.
    ///
    /// For each dimension where this shape has extent 1 and the target is
    /// larger, the stride is 0 (the single element repeats). Ranks must be
    /// equal; scalar operands are handled separately by the kernels.
    pub fn broadcast_strides(&self, target: &Shape) -> Vec<usize> {
        debug_assert_eq!(self.rank(), target.rank());
        let strides = self.stride_contiguous();
        self.dims()
            .iter()
            .zip(target.dims())
            .zip(strides)
            .map(|((&d, &t), s)| if d == t { s } else { 0 })
            .collect()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// Convenient From implementations
// These let you write Shape::from((3, 4)) instead of Shape::new(vec![3, 4]).

impl From<usize> for Shape {
    /// 1-D shape.
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}
