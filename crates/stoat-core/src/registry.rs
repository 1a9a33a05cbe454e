use std::collections::HashMap;

use crate::device::DeviceKind;
use crate::error::{Error, Result};
use crate::operator::Operator;

// OperatorRegistry — (device-kind, name) → kernel constructor
//
// The registry is the sole extension point for adding compute kernels: a
// backend registers each kernel once under its device kind and name during a
// deterministic initialization phase, and program load resolves every
// referenced name against it. There is no ambient global — the registry is
// an explicit object injected into load calls, so lookups are testable
// independent of registration order.

/// Constructor for one kernel variant.
pub type OperatorBuilder = fn() -> Box<dyn Operator>;

/// Explicit table mapping (device-kind, operator-name) to constructors.
#[derive(Default)]
pub struct OperatorRegistry {
    table: HashMap<(DeviceKind, String), OperatorBuilder>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        OperatorRegistry::default()
    }

    /// Register a kernel constructor under `(kind, name)`. A later
    /// registration for the same key replaces the earlier one.
    pub fn register(&mut self, kind: DeviceKind, name: &str, builder: OperatorBuilder) {
        self.table.insert((kind, name.to_string()), builder);
    }

    /// Whether a kernel is registered under `(kind, name)`.
    pub fn contains(&self, kind: DeviceKind, name: &str) -> bool {
        self.table.contains_key(&(kind, name.to_string()))
    }

    /// Build a fresh, un-initialized operator instance.
    ///
    /// Lookup failure is an UnsupportedOperator error — raised at program
    /// load, not at run time.
    pub fn build(&self, kind: DeviceKind, name: &str) -> Result<Box<dyn Operator>> {
        match self.table.get(&(kind, name.to_string())) {
            Some(builder) => Ok(builder()),
            None => Err(Error::UnsupportedOperator {
                device: kind,
                name: name.to_string(),
            }),
        }
    }

    /// Registered names for one device kind, sorted for stable reporting.
    pub fn names(&self, kind: DeviceKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .table
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OperatorRegistry({} kernel(s))", self.table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::stack::Stack;
    use crate::tensor::Prototype;

    struct Nop;

    impl Operator for Nop {
        fn name(&self) -> &str {
            "nop"
        }
        fn infer(&self, _stack: &Stack) -> Result<Vec<Prototype>> {
            Ok(vec![])
        }
        fn run(&self, _stack: &mut Stack, _ctx: &RuntimeContext) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_register_and_build() {
        let mut registry = OperatorRegistry::new();
        registry.register(DeviceKind::Cpu, "nop", || Box::new(Nop));
        assert!(registry.contains(DeviceKind::Cpu, "nop"));
        let op = registry.build(DeviceKind::Cpu, "nop").unwrap();
        assert_eq!(op.name(), "nop");
    }

    #[test]
    fn test_lookup_is_per_device_kind() {
        let mut registry = OperatorRegistry::new();
        registry.register(DeviceKind::Cpu, "nop", || Box::new(Nop));
        let err = registry.build(DeviceKind::Gpu, "nop");
        assert!(matches!(
            err,
            Err(Error::UnsupportedOperator {
                device: DeviceKind::Gpu,
                ..
            })
        ));
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = OperatorRegistry::new();
        registry.register(DeviceKind::Cpu, "sub", || Box::new(Nop));
        registry.register(DeviceKind::Cpu, "add", || Box::new(Nop));
        assert_eq!(registry.names(DeviceKind::Cpu), vec!["add", "sub"]);
    }
}
