use std::sync::Arc;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::memory::MemoryController;
use crate::tensor::{Prototype, Tensor};

// Operand Stack — the live working set of one execution context
//
// An ordered, growable sequence of tensor slots. Instructions push operands,
// operators read them by position and append results. Indexing is the only
// access path and always goes through one normalization routine:
//
//   index(0)  — first slot of the current frame
//   index(-1) — most recently pushed slot
//
// Negative indices count from the top; a resolved index outside [0, size)
// is an OutOfRange error, never a silent truncation. Slots are only ever
// appended or removed — never inserted mid-sequence.
//
// Frame bases: before an operator runs, the dispatcher establishes a base
// `nargs` slots below the top so the callee sees exactly its arguments as
// slots [0, nargs). `size()` and all indexing are relative to the current
// base; `pop_base` restores the caller's view.

/// The operand stack of one execution context.
///
/// Holds the stack's dynamic memory controller: `push_alloc` draws fresh
/// output storage from it, so per-run intermediates share one reclaim point.
pub struct Stack {
    slots: Vec<Tensor>,
    bases: Vec<usize>,
    memory: Arc<MemoryController>,
}

impl Stack {
    /// A new, empty stack allocating intermediates through `memory`.
    pub fn new(memory: Arc<MemoryController>) -> Self {
        Stack {
            slots: Vec::new(),
            bases: Vec::new(),
            memory,
        }
    }

    /// The dynamic memory controller intermediates are drawn from.
    pub fn controller(&self) -> &Arc<MemoryController> {
        &self.memory
    }

    fn base(&self) -> usize {
        self.bases.last().copied().unwrap_or(0)
    }

    /// Number of slots visible in the current frame.
    pub fn size(&self) -> usize {
        self.slots.len() - self.base()
    }

    /// Resolve a possibly negative frame-relative index to an absolute slot.
    fn normalize(&self, index: i64) -> Result<usize> {
        let size = self.size() as i64;
        let resolved = if index < 0 { size + index } else { index };
        if resolved < 0 || resolved >= size {
            return Err(Error::OutOfRange {
                index,
                size: size as usize,
            });
        }
        Ok(self.base() + resolved as usize)
    }

    /// Resolve an index that may also point one past the top (an exclusive
    /// bound for `erase`).
    fn normalize_bound(&self, index: i64) -> Result<usize> {
        let size = self.size() as i64;
        let resolved = if index < 0 { size + index } else { index };
        if resolved < 0 || resolved > size {
            return Err(Error::OutOfRange {
                index,
                size: size as usize,
            });
        }
        Ok(self.base() + resolved as usize)
    }

    /// Append a tensor and return a reference to the stored slot.
    pub fn push(&mut self, tensor: Tensor) -> &Tensor {
        self.slots.push(tensor);
        self.slots.last().expect("push left an empty stack")
    }

    /// Allocate storage for `proto` on `device` via the dynamic memory
    /// controller, append it, and return the stored slot.
    ///
    /// The controller is bound to one device; requesting another is an
    /// error rather than a silent cross-device allocation.
    pub fn push_alloc(&mut self, proto: &Prototype, device: &Device) -> Result<&mut Tensor> {
        if *device != *self.memory.device() {
            return Err(Error::msg(format!(
                "stack allocates on {}, cannot place an operand on {}",
                self.memory.device(),
                device
            )));
        }
        let tensor = Tensor::alloc(proto, &self.memory)?;
        self.slots.push(tensor);
        Ok(self.slots.last_mut().expect("push left an empty stack"))
    }

    /// The slot at `index` (negative counts from the top).
    pub fn index(&self, index: i64) -> Result<&Tensor> {
        let at = self.normalize(index)?;
        Ok(&self.slots[at])
    }

    /// Mutable access under the same normalization rule.
    pub fn index_mut(&mut self, index: i64) -> Result<&mut Tensor> {
        let at = self.normalize(index)?;
        Ok(&mut self.slots[at])
    }

    /// Remove the top `n` slots.
    pub fn pop(&mut self, n: usize) -> Result<()> {
        if n > self.size() {
            return Err(Error::OutOfRange {
                index: n as i64,
                size: self.size(),
            });
        }
        let keep = self.slots.len() - n;
        self.slots.truncate(keep);
        Ok(())
    }

    /// Remove the slots in the half-open range `[from, to)`; both bounds
    /// accept negative top-anchored indices. The dispatcher uses this to
    /// drop consumed arguments beneath freshly pushed results.
    pub fn erase(&mut self, from: i64, to: i64) -> Result<()> {
        let from = self.normalize_bound(from)?;
        let to = self.normalize_bound(to)?;
        if from < to {
            self.slots.drain(from..to);
        }
        Ok(())
    }

    /// Empty the current frame, releasing its memory references.
    pub fn clear(&mut self) {
        self.slots.truncate(self.base());
    }

    /// Establish a frame base `nargs` slots below the top. The callee then
    /// sees exactly its arguments as slots [0, nargs).
    pub fn push_base(&mut self, nargs: usize) -> Result<()> {
        if nargs > self.size() {
            return Err(Error::OutOfRange {
                index: nargs as i64,
                size: self.size(),
            });
        }
        self.bases.push(self.slots.len() - nargs);
        Ok(())
    }

    /// Restore the previous frame base.
    pub fn pop_base(&mut self) {
        self.bases.pop();
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stack({} slot(s), {} frame(s), on {})",
            self.slots.len(),
            self.bases.len(),
            self.memory.device()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceKind;
    use crate::dtype::DType;
    use crate::memory::MemoryController;

    fn stack_with(n: usize) -> Stack {
        let ctrl = Arc::new(MemoryController::host());
        let mut stack = Stack::new(Arc::clone(&ctrl));
        for i in 0..n {
            let t = Tensor::from_vec(&[i as f32], 1, &ctrl).unwrap();
            stack.push(t);
        }
        stack
    }

    #[test]
    fn test_negative_index_equals_top_anchored() {
        let stack = stack_with(4);
        // index(-1) ≡ index(N-1)
        let top = stack.index(-1).unwrap().to_vec::<f32>().unwrap();
        let last = stack.index(3).unwrap().to_vec::<f32>().unwrap();
        assert_eq!(top, last);
    }

    #[test]
    fn test_out_of_range_both_directions() {
        let stack = stack_with(4);
        assert!(matches!(stack.index(4), Err(Error::OutOfRange { .. })));
        assert!(matches!(stack.index(-5), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn test_push_alloc_draws_from_controller() {
        let ctrl = Arc::new(MemoryController::host());
        let mut stack = Stack::new(Arc::clone(&ctrl));
        let proto = Prototype::new(DType::F32, (2, 2));
        stack.push_alloc(&proto, &Device::cpu()).unwrap();
        assert_eq!(stack.size(), 1);
        assert_eq!(ctrl.stats().allocations, 1);
        assert_eq!(ctrl.stats().allocated_bytes, 16);
    }

    #[test]
    fn test_push_alloc_rejects_foreign_device() {
        let ctrl = Arc::new(MemoryController::host());
        let mut stack = Stack::new(ctrl);
        let proto = Prototype::new(DType::F32, 1);
        let err = stack.push_alloc(&proto, &Device::new(DeviceKind::Gpu, 0));
        assert!(err.is_err());
    }

    #[test]
    fn test_frame_base_narrows_view() {
        let mut stack = stack_with(5);
        stack.push_base(2).unwrap();
        assert_eq!(stack.size(), 2);
        // index(0) inside the frame is absolute slot 3.
        assert_eq!(
            stack.index(0).unwrap().to_vec::<f32>().unwrap(),
            vec![3.0]
        );
        stack.pop_base();
        assert_eq!(stack.size(), 5);
    }

    #[test]
    fn test_erase_drops_consumed_args() {
        let mut stack = stack_with(3);
        stack.push_base(2).unwrap();
        // Simulate one pushed result on top of two args.
        let ctrl = Arc::clone(stack.controller());
        let result = Tensor::from_vec(&[9.0f32], 1, &ctrl).unwrap();
        stack.push(result);
        stack.erase(0, -1).unwrap();
        assert_eq!(stack.size(), 1);
        stack.pop_base();
        assert_eq!(stack.size(), 2);
        assert_eq!(
            stack.index(-1).unwrap().to_vec::<f32>().unwrap(),
            vec![9.0]
        );
    }

    #[test]
    fn test_clear_is_frame_local() {
        let mut stack = stack_with(3);
        stack.push_base(1).unwrap();
        stack.clear();
        assert_eq!(stack.size(), 0);
        stack.pop_base();
        assert_eq!(stack.size(), 2);
    }

    #[test]
    fn test_pop_bounds() {
        let mut stack = stack_with(2);
        assert!(matches!(stack.pop(3), Err(Error::OutOfRange { .. })));
        stack.pop(2).unwrap();
        assert_eq!(stack.size(), 0);
    }
}
