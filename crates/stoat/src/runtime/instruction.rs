use std::fmt;
use std::sync::Arc;

use stoat_core::{Error, Operator, Result, Stack};

use crate::runtime::workbench::Workbench;

// Instruction — the atoms of a compiled program
//
// Three kinds, each executed identically by the workbench via
// `instruction.run(workbench)`:
//
//   Procedure    — an arbitrary host callback with the workbench as context;
//                  used for control and bookkeeping steps (pushing inputs,
//                  jumps, halt) that are not operators.
//   StackRoutine — a callback that receives only the stack; a
//                  restricted-capability variant for pure stack
//                  transformations.
//   Operator     — invokes a bound kernel with declared argument and result
//                  counts. The dispatcher frames the stack so the kernel
//                  sees exactly its arguments, validates the counts, and
//                  drops the consumed arguments afterwards.
//
// Instructions are immutable after load and shared between workbench clones
// behind `Arc`.

/// Host callback invoked with the whole workbench.
pub type Procedure = Arc<dyn Fn(&mut Workbench) -> Result<()> + Send + Sync>;

/// Restricted callback invoked with only the operand stack.
pub type StackRoutine = Arc<dyn Fn(&mut Stack) -> Result<()> + Send + Sync>;

/// One executable step of a compiled program.
#[derive(Clone)]
pub enum Instruction {
    Procedure {
        label: String,
        f: Procedure,
    },
    StackRoutine {
        label: String,
        f: StackRoutine,
    },
    Operator {
        op: Arc<dyn Operator>,
        nargs: usize,
        nresults: usize,
    },
}

impl Instruction {
    /// A procedure instruction. The label shows up in traces and Debug
    /// output only.
    pub fn procedure(
        label: impl Into<String>,
        f: impl Fn(&mut Workbench) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Instruction::Procedure {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    /// A stack-routine instruction.
    pub fn stack_routine(
        label: impl Into<String>,
        f: impl Fn(&mut Stack) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Instruction::StackRoutine {
            label: label.into(),
            f: Arc::new(f),
        }
    }

    /// An operator instruction with declared argument/result counts.
    pub fn operator(op: Arc<dyn Operator>, nargs: usize, nresults: usize) -> Self {
        Instruction::Operator {
            op,
            nargs,
            nresults,
        }
    }

    /// Short description for traces.
    pub fn label(&self) -> &str {
        match self {
            Instruction::Procedure { label, .. } => label,
            Instruction::StackRoutine { label, .. } => label,
            Instruction::Operator { op, .. } => op.name(),
        }
    }

    /// Execute this instruction against the workbench.
    pub fn run(&self, bench: &mut Workbench) -> Result<()> {
        match self {
            Instruction::Procedure { f, .. } => f(bench),
            Instruction::StackRoutine { f, .. } => f(bench.stack_mut()),
            Instruction::Operator {
                op,
                nargs,
                nresults,
            } => {
                let ctx = bench.runtime().clone();
                let stack = bench.stack_mut();
                if stack.size() < *nargs {
                    return Err(Error::Arity {
                        op: op.name().to_string(),
                        expected: *nargs,
                        got: stack.size(),
                    });
                }
                stack.push_base(*nargs)?;
                let produced = match op.run(stack, &ctx) {
                    Ok(n) => n,
                    Err(e) => {
                        stack.pop_base();
                        return Err(e);
                    }
                };
                if produced != *nresults {
                    stack.pop_base();
                    return Err(Error::Arity {
                        op: op.name().to_string(),
                        expected: *nresults,
                        got: produced,
                    });
                }
                // Drop the consumed arguments, keeping the results on top.
                stack.erase(0, *nargs as i64)?;
                stack.pop_base();
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Procedure { label, .. } => write!(f, "Procedure({})", label),
            Instruction::StackRoutine { label, .. } => write!(f, "StackRoutine({})", label),
            Instruction::Operator {
                op,
                nargs,
                nresults,
            } => write!(f, "Operator({}, {} -> {})", op.name(), nargs, nresults),
        }
    }
}
