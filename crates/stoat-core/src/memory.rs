use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::device::{Device, DeviceKind};
use crate::dtype::WithDType;
use crate::error::{Error, Result};

// Memory & Device Layer
//
// Three pieces, bottom up:
//
//   HardMemory       — one raw buffer, bound to one device for its lifetime.
//   Allocator        — the per-device-kind source of HardMemory.
//   Memory           — a reference-counted handle over a HardMemory; cloning
//                      shares the buffer, and `sync` produces a binding on
//                      another device by a one-shot copy.
//   MemoryController — owns an allocator for one device and issues Memory
//                      handles; a workbench keeps three of them (static,
//                      flow, dynamic) to separate buffer lifetimes.
//
// A buffer's device binding is fixed at allocation. Obtaining a view on a
// different device is always a copy through the target device's controller,
// never an in-place rebind; the original handle stays valid on its own
// device and the two coexist until released.

/// One raw allocation bound to a device.
///
/// Backing storage is a `u64` word array, so the buffer is 8-byte aligned
/// and every supported dtype can be viewed in place via a checked
/// `bytemuck` cast. Contents start zeroed.
pub struct HardMemory {
    device: Device,
    words: Box<[u64]>,
    size: usize,
}

impl HardMemory {
    /// Allocate `size` zeroed bytes bound to `device`, rounded up to whole
    /// words internally.
    pub fn new(device: Device, size: usize) -> Self {
        let nwords = size.div_ceil(8);
        HardMemory {
            device,
            words: vec![0u64; nwords].into_boxed_slice(),
            size,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The buffer as raw bytes, truncated to the requested size.
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.size]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.size]
    }

    /// The full buffer viewed as elements of `T`. Callers slice down to the
    /// element count they need; the capacity may exceed it because sizes are
    /// rounded up to whole words.
    pub fn as_slice<T: WithDType>(&self) -> &[T] {
        bytemuck::cast_slice(&self.words)
    }

    pub fn as_slice_mut<T: WithDType>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(&mut self.words)
    }
}

impl fmt::Debug for HardMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HardMemory({} bytes on {})", self.size, self.device)
    }
}

// Allocator — the device-specific source of raw buffers

/// A device-specific low-level allocator.
///
/// The engine consumes allocators only through this boundary; concrete
/// device backends register one per device kind. Allocation either fully
/// succeeds or fails with OutOfMemory — there is no partial success.
pub trait Allocator: Send + Sync + fmt::Debug {
    fn alloc(&self, device: &Device, size: usize) -> Result<HardMemory>;
}

/// Host-RAM allocator for CPU-kind devices.
///
/// The optional per-allocation byte limit exists so allocator exhaustion is
/// testable without exhausting the host.
#[derive(Debug, Default)]
pub struct HostAllocator {
    limit: Option<usize>,
}

impl HostAllocator {
    pub fn new() -> Self {
        HostAllocator { limit: None }
    }

    /// Allocator that refuses any single allocation above `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        HostAllocator { limit: Some(limit) }
    }
}

impl Allocator for HostAllocator {
    fn alloc(&self, device: &Device, size: usize) -> Result<HardMemory> {
        if let Some(limit) = self.limit {
            if size > limit {
                return Err(Error::OutOfMemory {
                    device: *device,
                    requested: size,
                });
            }
        }
        Ok(HardMemory::new(*device, size))
    }
}

// Allocator table — device kind → allocator
//
// Immutable after first use apart from explicit registration; the CPU entry
// is seeded with the host allocator so the common path needs no setup call.

fn allocator_table() -> &'static RwLock<HashMap<DeviceKind, Arc<dyn Allocator>>> {
    static TABLE: OnceLock<RwLock<HashMap<DeviceKind, Arc<dyn Allocator>>>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table: HashMap<DeviceKind, Arc<dyn Allocator>> = HashMap::new();
        table.insert(DeviceKind::Cpu, Arc::new(HostAllocator::new()));
        RwLock::new(table)
    })
}

/// Register the allocator for a device kind. Later registrations replace
/// earlier ones; call during the deterministic initialization phase.
pub fn register_allocator(kind: DeviceKind, allocator: Arc<dyn Allocator>) {
    allocator_table()
        .write()
        .expect("allocator table lock poisoned")
        .insert(kind, allocator);
}

/// Look up the allocator for a device kind.
pub fn query_allocator(kind: DeviceKind) -> Result<Arc<dyn Allocator>> {
    allocator_table()
        .read()
        .expect("allocator table lock poisoned")
        .get(&kind)
        .cloned()
        .ok_or_else(|| Error::msg(format!("no allocator registered for device kind {}", kind)))
}

// Memory — reference-counted buffer handle

/// A reference-counted buffer bound to one device.
///
/// Cloning shares the underlying buffer; the buffer is freed when the last
/// handle drops. Interior access goes through a read-write lock so multiple
/// tensors can read a shared buffer concurrently while a freshly allocated
/// output is written through a write guard.
#[derive(Clone)]
pub struct Memory {
    device: Device,
    size: usize,
    inner: Arc<RwLock<HardMemory>>,
}

impl Memory {
    pub(crate) fn from_hard(hard: HardMemory) -> Self {
        Memory {
            device: *hard.device(),
            size: hard.size(),
            inner: Arc::new(RwLock::new(hard)),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Read access to the buffer contents.
    pub fn read(&self) -> RwLockReadGuard<'_, HardMemory> {
        self.inner.read().expect("memory lock poisoned")
    }

    /// Write access to the buffer contents.
    pub fn write(&self) -> RwLockWriteGuard<'_, HardMemory> {
        self.inner.write().expect("memory lock poisoned")
    }

    /// Whether two handles share one underlying buffer.
    pub fn shares_buffer(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A handle valid on the target controller's device.
    ///
    /// If this buffer is already bound there, the same buffer is shared and
    /// no copy happens. Otherwise a new buffer is allocated through the
    /// target controller and the contents are copied eagerly, at this call
    /// site. The original handle remains valid on its own device.
    pub fn sync(&self, target: &MemoryController) -> Result<Memory> {
        if self.device == *target.device() {
            return Ok(self.clone());
        }
        let copy = target.alloc(self.size)?;
        {
            let src = self.read();
            let mut dst = copy.write();
            dst.as_bytes_mut().copy_from_slice(src.as_bytes());
        }
        Ok(copy)
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memory({} bytes on {})", self.size, self.device)
    }
}

// MemoryController — device-scoped issuer of Memory handles

/// Cumulative allocation statistics of one controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerStats {
    /// Number of buffers issued.
    pub allocations: u64,
    /// Total bytes issued.
    pub allocated_bytes: u64,
}

/// Owns an allocator for one device and issues reference-counted buffers.
///
/// A workbench keeps three controllers to separate buffer lifetimes:
/// static (weights and data-segment constants, long-lived, shared across
/// clones), flow (control scratch such as input placeholders), and dynamic
/// (per-run intermediates, reclaimed on each run).
pub struct MemoryController {
    device: Device,
    allocator: Arc<dyn Allocator>,
    allocations: AtomicU64,
    allocated_bytes: AtomicU64,
}

impl MemoryController {
    pub fn new(device: Device, allocator: Arc<dyn Allocator>) -> Self {
        MemoryController {
            device,
            allocator,
            allocations: AtomicU64::new(0),
            allocated_bytes: AtomicU64::new(0),
        }
    }

    /// A controller for `cpu:0` over the host allocator; the convenient
    /// starting point for building tensors outside a workbench.
    pub fn host() -> Self {
        MemoryController::new(Device::cpu(), Arc::new(HostAllocator::new()))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The allocator this controller draws from (shared with clones).
    pub fn allocator(&self) -> Arc<dyn Allocator> {
        Arc::clone(&self.allocator)
    }

    /// Issue a buffer of `size` bytes on this controller's device.
    pub fn alloc(&self, size: usize) -> Result<Memory> {
        let hard = self.allocator.alloc(&self.device, size)?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(size as u64, Ordering::Relaxed);
        Ok(Memory::from_hard(hard))
    }

    /// Snapshot of cumulative allocation counters.
    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for MemoryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryController({})", self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_zeroed_and_sized() {
        let ctrl = MemoryController::host();
        let mem = ctrl.alloc(10).unwrap();
        assert_eq!(mem.size(), 10);
        assert!(mem.read().as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_stats_accumulate() {
        let ctrl = MemoryController::host();
        ctrl.alloc(16).unwrap();
        ctrl.alloc(8).unwrap();
        let stats = ctrl.stats();
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.allocated_bytes, 24);
    }

    #[test]
    fn test_limited_allocator_fails_oom() {
        let ctrl = MemoryController::new(Device::cpu(), Arc::new(HostAllocator::with_limit(64)));
        assert!(ctrl.alloc(64).is_ok());
        let err = ctrl.alloc(65);
        assert!(matches!(err, Err(Error::OutOfMemory { requested: 65, .. })));
    }

    #[test]
    fn test_sync_same_device_shares_buffer() {
        let ctrl = MemoryController::host();
        let mem = ctrl.alloc(8).unwrap();
        let view = mem.sync(&ctrl).unwrap();
        assert!(mem.shares_buffer(&view));
    }

    #[test]
    fn test_sync_other_device_copies() {
        let ctrl0 = MemoryController::host();
        let ctrl1 = MemoryController::new(
            Device::new(DeviceKind::Cpu, 1),
            Arc::new(HostAllocator::new()),
        );
        let mem = ctrl0.alloc(8).unwrap();
        mem.write().as_bytes_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let view = mem.sync(&ctrl1).unwrap();
        assert!(!mem.shares_buffer(&view));
        assert_eq!(view.device(), ctrl1.device());
        assert_eq!(view.read().as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        // The original binding is untouched.
        assert_eq!(mem.device(), ctrl0.device());
    }

    #[test]
    fn test_query_allocator_has_cpu_default() {
        assert!(query_allocator(DeviceKind::Cpu).is_ok());
        assert!(query_allocator(DeviceKind::Gpu).is_err());
    }
}
