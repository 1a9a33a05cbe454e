use std::fmt;

use crate::device::Device;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::memory::{Memory, MemoryController};
use crate::shape::Shape;

// Tensor — dtype + shape + memory handle
//
// A Tensor is a fixed-prototype view over a reference-counted buffer.
// Shape and dtype are immutable once constructed; the backing memory may be
// shared across tensors (cloning a tensor is cheap and shares the buffer)
// or exclusively owned (a freshly allocated kernel output).
//
// Device placement lives in the memory handle: a tensor is "on" whatever
// device its buffer is bound to, and `sync` produces the same prototype on
// another device by a one-shot copy.

/// A (dtype, shape) pair describing a tensor without data.
///
/// Prototypes are exchanged at the binding surface and produced by operator
/// shape inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prototype {
    dtype: DType,
    shape: Shape,
}

impl Prototype {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Prototype {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Size of the described storage in bytes.
    pub fn bytes(&self) -> usize {
        self.count() * self.dtype.size_in_bytes()
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// An n-dimensional value: data type, shape, and a memory handle.
#[derive(Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    memory: Memory,
}

impl Tensor {
    /// Wrap existing memory with a prototype. The buffer must be at least as
    /// large as the prototype requires.
    pub fn new(proto: Prototype, memory: Memory) -> Result<Self> {
        if memory.size() < proto.bytes() {
            return Err(Error::msg(format!(
                "memory of {} byte(s) too small for tensor {} ({} byte(s))",
                memory.size(),
                proto,
                proto.bytes()
            )));
        }
        Ok(Tensor {
            dtype: proto.dtype,
            shape: proto.shape,
            memory,
        })
    }

    /// Allocate zeroed storage for `proto` through `controller`.
    pub fn alloc(proto: &Prototype, controller: &MemoryController) -> Result<Self> {
        let memory = controller.alloc(proto.bytes())?;
        Tensor::new(proto.clone(), memory)
    }

    /// Build a tensor from host data, allocating through `controller`.
    pub fn from_vec<T: WithDType>(
        data: &[T],
        shape: impl Into<Shape>,
        controller: &MemoryController,
    ) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != data.len() {
            return Err(Error::shape(format!(
                "shape {} requires {} element(s), got {}",
                shape,
                shape.elem_count(),
                data.len()
            )));
        }
        let proto = Prototype::new(T::DTYPE, shape);
        let tensor = Tensor::alloc(&proto, controller)?;
        {
            let mut guard = tensor.memory.write();
            guard.as_slice_mut::<T>()[..data.len()].copy_from_slice(data);
        }
        Ok(tensor)
    }

    /// A rank-1 extent-1 tensor holding one value — the scalar convention.
    pub fn scalar<T: WithDType>(value: T, controller: &MemoryController) -> Result<Self> {
        Tensor::from_vec(&[value], 1, controller)
    }

    // Accessors

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Size of dimension `d`.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.shape.dim(d)
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.shape.elem_count()
    }

    pub fn prototype(&self) -> Prototype {
        Prototype::new(self.dtype, self.shape.clone())
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The device this tensor's buffer is bound to.
    pub fn device(&self) -> &Device {
        self.memory.device()
    }

    // Data movement

    /// Copy the elements out to a host vector. The requested element type
    /// must match the tensor's dtype.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::shape(format!(
                "requested {} element(s) from a {} tensor",
                T::DTYPE,
                self.dtype
            )));
        }
        let guard = self.memory.read();
        Ok(guard.as_slice::<T>()[..self.count()].to_vec())
    }

    /// The same prototype on the target controller's device; shares the
    /// buffer when already bound there, copies otherwise.
    pub fn sync(&self, controller: &MemoryController) -> Result<Tensor> {
        let memory = self.memory.sync(controller)?;
        Ok(Tensor {
            dtype: self.dtype,
            shape: self.shape.clone(),
            memory,
        })
    }

    /// An independent deep copy allocated through `controller`, regardless
    /// of device. Used where sharing would couple lifetimes (workbench
    /// clones, data-segment loading).
    pub fn copy_to(&self, controller: &MemoryController) -> Result<Tensor> {
        let proto = self.prototype();
        let copy = Tensor::alloc(&proto, controller)?;
        {
            let src = self.memory.read();
            let mut dst = copy.memory.write();
            let n = proto.bytes();
            dst.as_bytes_mut()[..n].copy_from_slice(&src.as_bytes()[..n]);
        }
        Ok(copy)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor({}{} on {})",
            self.dtype,
            self.shape,
            self.device()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceKind;
    use crate::memory::HostAllocator;
    use std::sync::Arc;

    #[test]
    fn test_from_vec_roundtrip() {
        let ctrl = MemoryController::host();
        let t = Tensor::from_vec(&[1.0f32, 2.0, 3.0, 4.0], (2, 2), &ctrl).unwrap();
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.dims(), &[2, 2]);
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_from_vec_count_mismatch() {
        let ctrl = MemoryController::host();
        let err = Tensor::from_vec(&[1.0f32, 2.0], (2, 2), &ctrl);
        assert!(matches!(err, Err(Error::Shape { .. })));
    }

    #[test]
    fn test_to_vec_dtype_mismatch() {
        let ctrl = MemoryController::host();
        let t = Tensor::from_vec(&[1i32, 2], 2, &ctrl).unwrap();
        assert!(matches!(t.to_vec::<f32>(), Err(Error::Shape { .. })));
    }

    #[test]
    fn test_clone_shares_memory() {
        let ctrl = MemoryController::host();
        let t = Tensor::from_vec(&[5u8, 6], 2, &ctrl).unwrap();
        let u = t.clone();
        assert!(t.memory().shares_buffer(u.memory()));
    }

    #[test]
    fn test_copy_to_is_independent() {
        let ctrl = MemoryController::host();
        let t = Tensor::from_vec(&[1.0f64, 2.0], 2, &ctrl).unwrap();
        let u = t.copy_to(&ctrl).unwrap();
        assert!(!t.memory().shares_buffer(u.memory()));
        assert_eq!(u.to_vec::<f64>().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_sync_to_other_device() {
        let ctrl0 = MemoryController::host();
        let ctrl1 = MemoryController::new(
            Device::new(DeviceKind::Cpu, 1),
            Arc::new(HostAllocator::new()),
        );
        let t = Tensor::from_vec(&[7i64, 8, 9], 3, &ctrl0).unwrap();
        let view = t.sync(&ctrl1).unwrap();
        assert_eq!(view.device(), ctrl1.device());
        assert_eq!(view.to_vec::<i64>().unwrap(), vec![7, 8, 9]);
        assert_eq!(t.device(), ctrl0.device());
    }

    #[test]
    fn test_scalar_convention() {
        let ctrl = MemoryController::host();
        let t = Tensor::scalar(2.0f32, &ctrl).unwrap();
        assert!(t.shape().is_scalar());
        assert_eq!(t.to_vec::<f32>().unwrap(), vec![2.0]);
    }
}
