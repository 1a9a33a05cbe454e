use stoat_core::{Attrs, Prototype, Tensor};

// Module — the compiled-program boundary
//
// A module is a graph that has already been topologically linearized: named
// input prototypes, a constant data segment, a flat code listing, and named
// output slot references. How the listing was produced (graph authoring,
// optimization, serialization) is outside the engine; the workbench only
// consumes it.
//
// Output slots reference positions on the post-run stack; negative values
// are top-anchored, so `-1` names the value the program left on top.

/// One step of a linearized program.
#[derive(Debug, Clone)]
pub enum Code {
    /// Push the tensor bound to input slot `i`.
    PushInput(usize),
    /// Push data-segment constant `i`.
    PushData(usize),
    /// Run the named operator over the top `nargs` stack values, leaving
    /// `nresults` results.
    Call {
        name: String,
        attrs: Attrs,
        nargs: usize,
        nresults: usize,
    },
    /// Add `shift` to the instruction pointer.
    JumpRelative(i64),
    /// Set the instruction pointer to `target`.
    JumpAbsolute(usize),
    /// Stop execution.
    Halt,
}

impl Code {
    /// Shorthand for an attribute-free operator call.
    pub fn call(name: &str, nargs: usize, nresults: usize) -> Self {
        Code::Call {
            name: name.to_string(),
            attrs: Attrs::new(),
            nargs,
            nresults,
        }
    }

    /// Shorthand for an operator call with attributes.
    pub fn call_with(name: &str, attrs: Attrs, nargs: usize, nresults: usize) -> Self {
        Code::Call {
            name: name.to_string(),
            attrs,
            nargs,
            nresults,
        }
    }
}

/// A compiled, linearized tensor program ready to load.
#[derive(Debug, Clone, Default)]
pub struct Module {
    inputs: Vec<(String, Prototype)>,
    data: Vec<Tensor>,
    code: Vec<Code>,
    outputs: Vec<(String, i64)>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    /// Declare a named input. Slot indices follow declaration order.
    pub fn with_input(mut self, name: &str, proto: Prototype) -> Self {
        self.inputs.push((name.to_string(), proto));
        self
    }

    /// Append a data-segment constant. Indices follow insertion order.
    pub fn with_data(mut self, tensor: Tensor) -> Self {
        self.data.push(tensor);
        self
    }

    /// Append one code step.
    pub fn with_code(mut self, code: Code) -> Self {
        self.code.push(code);
        self
    }

    /// Name an output slot on the post-run stack (negative = top-anchored).
    pub fn with_output(mut self, name: &str, slot: i64) -> Self {
        self.outputs.push((name.to_string(), slot));
        self
    }

    pub fn inputs(&self) -> &[(String, Prototype)] {
        &self.inputs
    }

    pub fn data(&self) -> &[Tensor] {
        &self.data
    }

    pub fn code(&self) -> &[Code] {
        &self.code
    }

    pub fn outputs(&self) -> &[(String, i64)] {
        &self.outputs
    }
}
