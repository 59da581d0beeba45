//! The compiled kernel and its evaluator. A [Kernel] owns the executable
//! form of a package and performs one clock tick per [Kernel::run] call.
//!
//! A tick has two phases. During the combinational phase every register read
//! observes the bytes currently in the caller's register buffer, and every
//! register write evaluates its right-hand side immediately but only queues
//! the store. The queued stores commit when the chip invocation returns, so
//! outputs depend only on inputs and pre-tick register state. Nested calls
//! latch inside-out: a callee commits its own writes before control returns
//! to its caller, and the disjoint frame layout keeps that invisible to the
//! caller's reads.

use crate::ast::exec::{Chip, ChipId, Expr, IoShape, Program, Stmt};

/// A compiled, immutable package, ready to simulate. Obtained from
/// [compile](crate::compile) or [Compiler](crate::Compiler). All state lives
/// in buffers owned by the caller; a `Kernel` can be shared freely and run
/// concurrently on distinct register buffers.
#[derive(Clone, Debug)]
pub struct Kernel {
    program: Program,
}

impl Kernel {
    pub(crate) fn new(program: Program) -> Self {
        Self { program }
    }

    /// Required size in bytes of the caller-allocated register buffer. The
    /// buffer must be zeroed before the first tick and reused unchanged
    /// between ticks to preserve latched state.
    pub fn buffer_size(&self) -> usize {
        self.program.buffer_size
    }

    /// Total byte width of the entrypoint's inputs (one byte per wire).
    pub fn input_width(&self) -> usize {
        self.program.input_width()
    }

    /// Total byte width of the entrypoint's outputs (one byte per wire).
    pub fn output_width(&self) -> usize {
        self.program.output_width()
    }

    /// Run one tick of the entrypoint chip: unpack `input`, compute, pack
    /// `output`, then commit all scheduled register writes into `reg_buf`.
    ///
    /// Buffer lengths must match [Self::buffer_size], [Self::input_width]
    /// and [Self::output_width]; anything else is a caller bug and panics.
    /// Input bytes outside {0, 1} are masked to their low bit.
    pub fn run(&self, reg_buf: &mut [u8], input: &[u8], output: &mut [u8]) {
        assert_eq!(
            reg_buf.len(),
            self.buffer_size(),
            "register buffer has the wrong size"
        );
        assert_eq!(
            input.len(),
            self.input_width(),
            "input buffer has the wrong size"
        );
        assert_eq!(
            output.len(),
            self.output_width(),
            "output buffer has the wrong size"
        );

        // Unpack the flat input bytes into per-parameter values, in
        // declared order
        let mut args = Vec::with_capacity(self.program.inputs.len());
        let mut offset = 0;
        for shape in &self.program.inputs {
            match shape {
                IoShape::Wire => args.push(Value::Wire(input[offset] & 1)),
                IoShape::Slice(size) => args.push(Value::Slice(
                    input[offset..offset + size]
                        .iter()
                        .map(|byte| byte & 1)
                        .collect(),
                )),
            }
            offset += shape.width();
        }

        let results =
            eval_chip(&self.program, self.program.entry, 0, args, reg_buf);

        // Pack the output tuple back into flat bytes, in declared order
        let mut offset = 0;
        for result in results {
            match result {
                Value::Wire(bit) => {
                    output[offset] = bit;
                    offset += 1;
                }
                Value::Slice(bytes) => {
                    output[offset..offset + bytes.len()]
                        .copy_from_slice(&bytes);
                    offset += bytes.len();
                }
                // Outputs are wires and wire slices by construction
                other => panic!("non-wire output value {:?}", other),
            }
        }
    }
}

/// A runtime value inside a chip invocation.
#[derive(Clone, Debug)]
enum Value {
    Wire(u8),
    Slice(Vec<u8>),
    /// Handle to a register's bytes in the persistent buffer. `offset` is
    /// absolute.
    Reg {
        offset: usize,
        width: usize,
        scalar: bool,
    },
    /// A chip call's result, one value per output element
    Tuple(Vec<Value>),
}

impl Value {
    /// Unwrap a wire bit. The typechecker guarantees this can't miss.
    fn wire(&self) -> u8 {
        match self {
            Self::Wire(bit) => *bit,
            other => panic!("expected wire value, got {:?}", other),
        }
    }
}

/// Execute one invocation of a chip. `base` is the absolute offset of this
/// invocation's register frame; `args` are the parameter values in declared
/// order. Returns the output tuple's values.
///
/// Scheduled register writes commit just before this returns, in the order
/// they were enqueued.
fn eval_chip(
    program: &Program,
    chip: ChipId,
    base: usize,
    args: Vec<Value>,
    reg_buf: &mut [u8],
) -> Vec<Value> {
    let chip: &Chip = &program.chips[chip.0];

    if chip.builtin {
        // The one primitive: Nand(a, b) -> !(a & b)
        let a = args[0].wire();
        let b = args[1].wire();
        return vec![Value::Wire(!(a & b) & 1)];
    }

    debug_assert_eq!(args.len(), chip.params);
    let mut slots: Vec<Option<Value>> = vec![None; chip.slots];
    for (slot, arg) in args.into_iter().enumerate() {
        slots[slot] = Some(arg);
    }
    // Writes scheduled during this invocation, committed at return
    let mut queue: Vec<(usize, Vec<u8>)> = Vec::new();

    for stmt in &chip.body {
        match stmt {
            Stmt::Assign { targets, rhs } => {
                let value = eval_expr(program, rhs, base, &slots, reg_buf);
                match value {
                    // A call's results distribute across the targets
                    Value::Tuple(components) => {
                        for (target, component) in
                            targets.iter().zip(components)
                        {
                            slots[*target] = Some(component);
                        }
                    }
                    single => slots[targets[0]] = Some(single),
                }
            }
            Stmt::RegWrite { reg, rhs } => {
                let value = eval_expr(program, rhs, base, &slots, reg_buf);
                let bytes = match value {
                    Value::Wire(bit) => vec![bit],
                    Value::Slice(bytes) => bytes,
                    other => panic!("non-wire register write {:?}", other),
                };
                let offset = match &slots[*reg] {
                    Some(Value::Reg { offset, .. }) => *offset,
                    other => panic!("write to non-register slot {:?}", other),
                };
                queue.push((offset, bytes));
            }
            Stmt::Return(results) => {
                let outputs: Vec<Value> = results
                    .iter()
                    .map(|result| {
                        eval_expr(program, result, base, &slots, reg_buf)
                    })
                    .collect();
                // Latch phase: outputs are computed, now the queued writes
                // become visible for the next tick
                for (offset, bytes) in queue.drain(..) {
                    reg_buf[offset..offset + bytes.len()]
                        .copy_from_slice(&bytes);
                }
                return outputs;
            }
        }
    }
    // The typechecker rejects bodies without a terminal return
    unreachable!("chip body ended without a return")
}

fn eval_expr(
    program: &Program,
    expr: &Expr,
    base: usize,
    slots: &[Option<Value>],
    reg_buf: &mut [u8],
) -> Value {
    match expr {
        Expr::Slot(slot) => {
            slots[*slot].clone().expect("slot read before assignment")
        }

        Expr::Call { chip, frame, args } => {
            let arg_values: Vec<Value> = args
                .iter()
                .map(|arg| {
                    eval_expr(program, arg, base, slots, reg_buf)
                })
                .collect();
            Value::Tuple(eval_chip(
                program,
                *chip,
                base + frame,
                arg_values,
                reg_buf,
            ))
        }

        Expr::NewRegister {
            offset,
            width,
            scalar,
        } => Value::Reg {
            offset: base + offset,
            width: *width,
            scalar: *scalar,
        },

        Expr::RegRead(slot) => match &slots[*slot] {
            Some(Value::Reg {
                offset,
                width,
                scalar,
            }) => {
                if *scalar {
                    Value::Wire(reg_buf[*offset] & 1)
                } else {
                    Value::Slice(
                        reg_buf[*offset..*offset + *width]
                            .iter()
                            .map(|byte| byte & 1)
                            .collect(),
                    )
                }
            }
            other => panic!("read from non-register slot {:?}", other),
        },

        Expr::SliceIdx { slot, begin, end } => match &slots[*slot] {
            Some(Value::Slice(bytes)) => {
                Value::Slice(bytes[*begin..*end].to_vec())
            }
            // A sub-range of a register bundle is itself a register handle
            Some(Value::Reg { offset, .. }) => Value::Reg {
                offset: *offset + *begin,
                width: end - begin,
                scalar: false,
            },
            other => panic!("slice of non-slice slot {:?}", other),
        },

        Expr::SliceJoin(values) => Value::Slice(
            values
                .iter()
                .map(|value| {
                    eval_expr(program, value, base, slots, reg_buf).wire()
                })
                .collect(),
        ),

        Expr::SliceToWire(inner) => {
            match eval_expr(program, inner, base, slots, reg_buf) {
                Value::Slice(bytes) => Value::Wire(bytes[0]),
                other => panic!("expected slice value, got {:?}", other),
            }
        }

        Expr::TupleToWire(inner) => {
            match eval_expr(program, inner, base, slots, reg_buf) {
                Value::Tuple(mut components) => {
                    Value::Wire(components.swap_remove(0).wire())
                }
                other => panic!("expected tuple value, got {:?}", other),
            }
        }
    }
}

/// Convenience wrapper that owns all three buffers, in the style of a chip
/// on a breadboard: poke input pins, tick the clock, read output pins.
/// Register state starts zeroed and persists across ticks.
#[derive(Clone, Debug)]
pub struct Circuit {
    kernel: Kernel,
    reg_buf: Vec<u8>,
    inputs: Vec<u8>,
    outputs: Vec<u8>,
}

impl Circuit {
    pub fn new(kernel: Kernel) -> Self {
        let reg_buf = vec![0; kernel.buffer_size()];
        let inputs = vec![0; kernel.input_width()];
        let outputs = vec![0; kernel.output_width()];
        Self {
            kernel,
            reg_buf,
            inputs,
            outputs,
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Set one input pin. Stays set until changed again.
    pub fn set_input(&mut self, index: usize, value: bool) {
        self.inputs[index] = value as u8;
    }

    /// Read one output pin, as of the last tick.
    pub fn output(&self, index: usize) -> bool {
        self.outputs[index] != 0
    }

    /// Advance the simulation by one clock tick.
    pub fn tick(&mut self) {
        self.kernel
            .run(&mut self.reg_buf, &self.inputs, &mut self.outputs)
    }
}
