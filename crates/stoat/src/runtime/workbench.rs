use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use stoat_core::{
    query_allocator, Attrs, Device, Error, MemoryController, Operator, OperatorRegistry,
    Prototype, Result, RuntimeContext, Stack, Tensor,
};

use crate::module::{Code, Module};
use crate::runtime::instruction::Instruction;

// Workbench — the execution context of one inference session
//
// The aggregate root: owns the lowered program, the instruction pointer, the
// operand stack, the data segment, the input/output slot tables, three
// memory controllers, and the device/runtime context.
//
// Memory controllers by lifetime:
//   static  — data-segment constants and weights; long-lived, shared with
//             every clone of this workbench.
//   flow    — control scratch (input placeholders); per workbench.
//   dynamic — per-run intermediates, drawn through the stack and reclaimed
//             when the next run clears it; per workbench.
//
// Execution: `run()` seeds the stack with the bound inputs at slots
// [0, n_inputs), then walks the pointer through the program. The pointer is
// advanced past an instruction before it executes, so a relative jump of k
// performed by the instruction resumes k past the following instruction.

/// Execution state of a workbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Loaded, pointer at program start; nothing run yet.
    Idle,
    /// Pointer advancing through instructions.
    Running,
    /// Pointer ran past the last instruction, or a halt instruction fired.
    Halted,
    /// An instruction raised an unrecovered error; see `reset`.
    Faulted,
}

/// The execution context of one inference session.
pub struct Workbench {
    device: Device,
    runtime: RuntimeContext,
    registry: Arc<OperatorRegistry>,

    program: Arc<Vec<Instruction>>,
    pointer: usize,
    state: State,

    stack: Stack,
    data_segment: Vec<Tensor>,

    static_memory: Arc<MemoryController>,
    flow_memory: Arc<MemoryController>,
    dynamic_memory: Arc<MemoryController>,

    input_slots: HashMap<String, usize>,
    output_slots: HashMap<String, i64>,
    input_protos: Vec<Prototype>,
    inputs: Vec<Tensor>,
}

impl Workbench {
    /// An empty workbench on `device` with no program — the starting point
    /// for the immediate-mode path.
    pub fn new(device: Device, registry: Arc<OperatorRegistry>) -> Result<Self> {
        let runtime = RuntimeContext::new(device)?;
        Self::with_context(registry, runtime)
    }

    /// An empty workbench over an explicit runtime context.
    pub fn with_context(registry: Arc<OperatorRegistry>, runtime: RuntimeContext) -> Result<Self> {
        let device = *runtime.device();
        let allocator = query_allocator(device.kind())?;
        let static_memory = Arc::new(MemoryController::new(device, allocator.clone()));
        let flow_memory = Arc::new(MemoryController::new(device, allocator.clone()));
        let dynamic_memory = Arc::new(MemoryController::new(device, allocator));
        Ok(Workbench {
            device,
            runtime,
            registry,
            program: Arc::new(Vec::new()),
            pointer: 0,
            state: State::Idle,
            stack: Stack::new(Arc::clone(&dynamic_memory)),
            data_segment: Vec::new(),
            static_memory,
            flow_memory,
            dynamic_memory,
            input_slots: HashMap::new(),
            output_slots: HashMap::new(),
            input_protos: Vec::new(),
            inputs: Vec::new(),
        })
    }

    /// Load a compiled module onto `device`, resolving every operator
    /// against `registry`.
    ///
    /// Fails with a descriptive error on a malformed or unresolvable module;
    /// no partial workbench is returned.
    pub fn load(module: &Module, device: Device, registry: Arc<OperatorRegistry>) -> Result<Self> {
        let runtime = RuntimeContext::new(device)?;
        Self::load_with_context(module, registry, runtime)
    }

    /// Load over an explicit runtime context (worker-thread count etc.).
    pub fn load_with_context(
        module: &Module,
        registry: Arc<OperatorRegistry>,
        runtime: RuntimeContext,
    ) -> Result<Self> {
        let mut bench = Self::with_context(registry, runtime)?;
        bench.take_module(module)?;
        debug!(
            device = %bench.device,
            instructions = bench.program.len(),
            inputs = bench.inputs.len(),
            outputs = bench.output_slots.len(),
            "module loaded"
        );
        Ok(bench)
    }

    /// Validate the module and lower its code into the instruction program.
    fn take_module(&mut self, module: &Module) -> Result<()> {
        // Input slots: fixed stack positions [0, n) in declaration order.
        for (slot, (name, proto)) in module.inputs().iter().enumerate() {
            if self.input_slots.insert(name.clone(), slot).is_some() {
                stoat_core::bail!("module declares input '{}' twice", name);
            }
            let placeholder = Tensor::alloc(proto, &self.flow_memory)?;
            self.inputs.push(placeholder);
            self.input_protos.push(proto.clone());
        }

        // Data segment: constants copied into static memory so clones share
        // one set of buffers.
        for tensor in module.data() {
            self.data_segment.push(tensor.copy_to(&self.static_memory)?);
        }

        for (name, slot) in module.outputs() {
            if self.output_slots.insert(name.clone(), *slot).is_some() {
                stoat_core::bail!("module declares output '{}' twice", name);
            }
        }

        let n_inputs = self.inputs.len();
        let n_data = self.data_segment.len();
        let code_len = module.code().len();
        let mut program = Vec::with_capacity(code_len);
        for (at, code) in module.code().iter().enumerate() {
            let instruction = match code {
                Code::PushInput(i) => {
                    let i = *i;
                    if i >= n_inputs {
                        stoat_core::bail!(
                            "instruction {} references input slot {} but the module has {}",
                            at,
                            i,
                            n_inputs
                        );
                    }
                    Instruction::procedure(format!("push_input({})", i), move |bench| {
                        bench.push_input(i)
                    })
                }
                Code::PushData(i) => {
                    let i = *i;
                    if i >= n_data {
                        stoat_core::bail!(
                            "instruction {} references data index {} but the segment has {}",
                            at,
                            i,
                            n_data
                        );
                    }
                    Instruction::procedure(format!("push_data({})", i), move |bench| {
                        bench.push_data_segment(i)
                    })
                }
                Code::Call {
                    name,
                    attrs,
                    nargs,
                    nresults,
                } => {
                    let mut op = self.registry.build(self.device.kind(), name)?;
                    op.init(attrs)?;
                    Instruction::operator(Arc::from(op), *nargs, *nresults)
                }
                Code::JumpRelative(shift) => {
                    let shift = *shift;
                    Instruction::procedure(format!("jump_relative({})", shift), move |bench| {
                        bench.jump_relative(shift)
                    })
                }
                Code::JumpAbsolute(target) => {
                    let target = *target;
                    if target > code_len {
                        stoat_core::bail!(
                            "instruction {} jumps to {} past the program end {}",
                            at,
                            target,
                            code_len
                        );
                    }
                    Instruction::procedure(format!("jump_absolute({})", target), move |bench| {
                        bench.jump_absolute(target)
                    })
                }
                Code::Halt => Instruction::procedure("halt", |bench| {
                    bench.halt();
                    Ok(())
                }),
            };
            program.push(instruction);
        }
        self.program = Arc::new(program);
        Ok(())
    }

    // Accessors

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The instruction pointer; after a fault it marks one past the failed
    /// instruction.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn static_memory(&self) -> &Arc<MemoryController> {
        &self.static_memory
    }

    pub fn flow_memory(&self) -> &Arc<MemoryController> {
        &self.flow_memory
    }

    pub fn dynamic_memory(&self) -> &Arc<MemoryController> {
        &self.dynamic_memory
    }

    // Pointer control (used by procedure instructions)

    /// Add `shift` to the pointer. The pointer has already advanced past the
    /// jumping instruction, so execution resumes `shift` past the next one.
    pub fn jump_relative(&mut self, shift: i64) -> Result<()> {
        let len = self.program.len();
        let target = self.pointer as i64 + shift;
        if target < 0 || target > len as i64 {
            return Err(Error::OutOfRange {
                index: target,
                size: len,
            });
        }
        self.pointer = target as usize;
        Ok(())
    }

    /// Set the pointer to `target`.
    pub fn jump_absolute(&mut self, target: usize) -> Result<()> {
        if target > self.program.len() {
            return Err(Error::OutOfRange {
                index: target as i64,
                size: self.program.len(),
            });
        }
        self.pointer = target;
        Ok(())
    }

    /// Stop execution after the current instruction completes.
    pub fn halt(&mut self) {
        self.pointer = self.program.len();
    }

    /// Push the tensor bound to input slot `i` onto the stack.
    pub fn push_input(&mut self, i: usize) -> Result<()> {
        let tensor = match self.inputs.get(i) {
            Some(t) => t.clone(),
            None => {
                return Err(Error::OutOfRange {
                    index: i as i64,
                    size: self.inputs.len(),
                })
            }
        };
        self.stack.push(tensor);
        Ok(())
    }

    /// Push data-segment constant `i` onto the stack.
    pub fn push_data_segment(&mut self, i: usize) -> Result<()> {
        let tensor = match self.data_segment.get(i) {
            Some(t) => t.clone(),
            None => {
                return Err(Error::OutOfRange {
                    index: i as i64,
                    size: self.data_segment.len(),
                })
            }
        };
        self.stack.push(tensor);
        Ok(())
    }

    // Input/output binding

    /// Bind `tensor` to the named input slot. The replacement must match the
    /// slot's declared prototype.
    pub fn input(&mut self, name: &str, tensor: Tensor) -> Result<()> {
        let slot = *self
            .input_slots
            .get(name)
            .ok_or_else(|| Error::msg(format!("no input slot named '{}'", name)))?;
        self.input_slot(slot, tensor)
    }

    /// Bind `tensor` to input slot `slot`.
    pub fn input_slot(&mut self, slot: usize, tensor: Tensor) -> Result<()> {
        let proto = self.input_protos.get(slot).ok_or(Error::OutOfRange {
            index: slot as i64,
            size: self.input_protos.len(),
        })?;
        if tensor.dtype() != proto.dtype() || tensor.shape() != proto.shape() {
            return Err(Error::shape(format!(
                "input slot {} expects {}, got {}{}",
                slot,
                proto,
                tensor.dtype(),
                tensor.shape()
            )));
        }
        self.inputs[slot] = tensor;
        Ok(())
    }

    /// The tensor currently bound to the named input slot.
    pub fn bound_input(&self, name: &str) -> Result<&Tensor> {
        let slot = *self
            .input_slots
            .get(name)
            .ok_or_else(|| Error::msg(format!("no input slot named '{}'", name)))?;
        Ok(&self.inputs[slot])
    }

    /// The value at the named output slot after a completed run.
    pub fn output(&self, name: &str) -> Result<Tensor> {
        let slot = *self
            .output_slots
            .get(name)
            .ok_or_else(|| Error::msg(format!("no output slot named '{}'", name)))?;
        self.output_slot(slot)
    }

    /// The value at output stack position `slot` (negative counts from the
    /// top of the post-run stack).
    pub fn output_slot(&self, slot: i64) -> Result<Tensor> {
        Ok(self.stack.index(slot)?.clone())
    }

    // Execution

    /// Execute the program from the start.
    ///
    /// Seeds the stack with the bound inputs, clears intermediates from any
    /// previous run, and walks the pointer until it passes the last
    /// instruction (Halted) or an instruction fails (Faulted, and the error
    /// propagates). A Faulted workbench rejects `run()` until `reset()`.
    pub fn run(&mut self) -> Result<()> {
        if self.state == State::Faulted {
            return Err(Error::msg(
                "workbench is faulted; call reset() before running again",
            ));
        }
        self.stack.clear();
        for i in 0..self.inputs.len() {
            let tensor = self.inputs[i].clone();
            self.stack.push(tensor);
        }
        self.pointer = 0;
        self.state = State::Running;

        let program = Arc::clone(&self.program);
        while self.pointer < program.len() {
            let instruction = &program[self.pointer];
            trace!(pointer = self.pointer, label = instruction.label(), "dispatch");
            self.pointer += 1;
            if let Err(e) = instruction.run(self) {
                self.state = State::Faulted;
                return Err(e);
            }
        }
        self.state = State::Halted;
        debug!(stack = self.stack.size(), "run complete");
        Ok(())
    }

    /// Return a Faulted (or any) workbench to Idle: pointer at program
    /// start, intermediates cleared, bindings kept.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.pointer = 0;
        self.state = State::Idle;
    }

    // Immediate-mode path

    /// Resolve `name` against the registry, configure it from `attrs`, and
    /// evaluate it directly on the given inputs.
    ///
    /// Bypasses the compiled program entirely: the instruction pointer and
    /// program state are untouched, and the stack is returned to its prior
    /// depth whether the kernel succeeds or fails.
    pub fn online_run(
        &mut self,
        name: &str,
        attrs: &Attrs,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>> {
        let mut op = self.registry.build(self.device.kind(), name)?;
        op.init(attrs)?;
        self.online_run_op(op.as_ref(), inputs)
    }

    /// Evaluate one initialized operator directly on the given inputs.
    pub fn online_run_op(&mut self, op: &dyn Operator, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let ctx = self.runtime.clone();
        for tensor in inputs {
            self.stack.push(tensor.clone());
        }
        self.stack.push_base(inputs.len())?;

        let result = op.run(&mut self.stack, &ctx);
        let collected = match result {
            Ok(produced) => {
                let mut results = Vec::with_capacity(produced);
                for i in 0..produced {
                    let at = (self.stack.size() - produced + i) as i64;
                    results.push(self.stack.index(at)?.clone());
                }
                Ok(results)
            }
            Err(e) => Err(e),
        };

        // Unwind the frame (the pushed inputs and any results) regardless of
        // outcome; the results stay alive through their own handles.
        self.stack.clear();
        self.stack.pop_base();
        collected
    }

    // Cloning

    /// A new workbench over the same program and static memory.
    ///
    /// The clone gets a fresh stack, flow, and dynamic memory controller and
    /// deep copies of the currently bound inputs, but shares the static
    /// controller, data-segment buffers, program, registry, and worker pool.
    /// Clones may run concurrently on separate threads.
    pub fn clone(&self) -> Result<Workbench> {
        let allocator = self.static_memory.allocator();
        let flow_memory = Arc::new(MemoryController::new(self.device, allocator.clone()));
        let dynamic_memory = Arc::new(MemoryController::new(self.device, allocator));

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for tensor in &self.inputs {
            inputs.push(tensor.copy_to(&flow_memory)?);
        }

        Ok(Workbench {
            device: self.device,
            runtime: self.runtime.clone(),
            registry: Arc::clone(&self.registry),
            program: Arc::clone(&self.program),
            pointer: 0,
            state: State::Idle,
            stack: Stack::new(Arc::clone(&dynamic_memory)),
            data_segment: self.data_segment.clone(),
            static_memory: Arc::clone(&self.static_memory),
            flow_memory,
            dynamic_memory,
            input_slots: self.input_slots.clone(),
            output_slots: self.output_slots.clone(),
            input_protos: self.input_protos.clone(),
            inputs,
        })
    }
}

impl std::fmt::Debug for Workbench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbench")
            .field("device", &self.device)
            .field("state", &self.state)
            .field("pointer", &self.pointer)
            .field("instructions", &self.program.len())
            .field("inputs", &self.inputs.len())
            .finish()
    }
}
