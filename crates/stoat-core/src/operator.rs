use std::collections::HashMap;

use crate::context::RuntimeContext;
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::tensor::Prototype;

// Operator — the capability contract concrete kernels implement
//
// An operator is configured once (`init`), can predict its output
// prototypes without computing (`infer`), and executes its numeric kernel
// against the operand stack (`run`). During `run` the operator sees only
// its own arguments (the dispatcher frames the stack first); it reads them
// by fixed position, allocates its outputs through the stack's dynamic
// memory controller, and reports how many results it appended.

/// A typed operator attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

/// Named configuration attributes of one operator instance.
///
/// Typed getters fail with a Configuration error naming the operator and the
/// attribute, so a bad compiled module surfaces a precise message at load.
#[derive(Debug, Clone, Default)]
pub struct Attrs {
    map: HashMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Attrs::default()
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.map.insert(key.to_string(), AttrValue::Int(value));
        self
    }

    pub fn with_float(mut self, key: &str, value: f64) -> Self {
        self.map.insert(key.to_string(), AttrValue::Float(value));
        self
    }

    pub fn with_bool(mut self, key: &str, value: bool) -> Self {
        self.map.insert(key.to_string(), AttrValue::Bool(value));
        self
    }

    pub fn with_str(mut self, key: &str, value: &str) -> Self {
        self.map
            .insert(key.to_string(), AttrValue::Str(value.to_string()));
        self
    }

    pub fn set(&mut self, key: &str, value: AttrValue) {
        self.map.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The integer attribute `key`; Configuration error if absent or not an
    /// integer.
    pub fn require_int(&self, op: &str, key: &str) -> Result<i64> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Ok(*v),
            Some(other) => Err(Error::config(
                op,
                format!("attribute '{}' must be an integer, got {:?}", key, other),
            )),
            None => Err(Error::config(op, format!("missing attribute '{}'", key))),
        }
    }

    /// The integer attribute `key`, or `default` when absent.
    pub fn int_or(&self, op: &str, key: &str, default: i64) -> Result<i64> {
        match self.map.get(key) {
            None => Ok(default),
            Some(_) => self.require_int(op, key),
        }
    }

    /// The boolean attribute `key`, or `default` when absent.
    pub fn bool_or(&self, op: &str, key: &str, default: bool) -> Result<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Ok(*v),
            Some(other) => Err(Error::config(
                op,
                format!("attribute '{}' must be a boolean, got {:?}", key, other),
            )),
            None => Ok(default),
        }
    }
}

/// The capability contract every compute kernel implements.
///
/// Lifecycle: built by the registry, configured once with `init` at program
/// load, then shared immutably by the instructions that reference it —
/// `infer` and `run` take `&self` so one initialized operator can serve
/// concurrent workbench clones.
pub trait Operator: Send + Sync {
    /// The registered name of this kernel (used in error messages).
    fn name(&self) -> &str;

    /// Validate and cache named configuration attributes.
    ///
    /// Fails with a Configuration error if a required attribute is absent or
    /// outside its valid domain. The default accepts any attributes.
    fn init(&mut self, attrs: &Attrs) -> Result<()> {
        let _ = attrs;
        Ok(())
    }

    /// Compute the result prototypes from the argument prototypes on the
    /// stack, without touching data. Fails with a Shape error on
    /// incompatible ranks/extents/dtypes.
    fn infer(&self, stack: &Stack) -> Result<Vec<Prototype>>;

    /// Execute the kernel: allocate outputs on the stack via its dynamic
    /// memory controller, compute, and return the number of results
    /// appended. Arguments are read by fixed position, not popped.
    fn run(&self, stack: &mut Stack, ctx: &RuntimeContext) -> Result<usize>;
}
