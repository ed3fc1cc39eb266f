//! The stack-based bytecode interpreter.
//!
//! One value stack is shared by every call frame; a frame's local slot
//! space is `arguments + captures + constants + locals` words wide and is
//! always addressed `stack[bp + offset]`. Invoking a function copies its
//! argument/capture values (already bound into the `Partial` by repeated
//! `Apply`) onto the stack, followed by its constant pool, followed by
//! `Value::Null` placeholders for its mutable locals, so a plain slot
//! index means the same thing whether it names an argument, a capture, a
//! constant, or a local.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::function::{Function, Partial};
use crate::iter::JarlIterator;
use crate::opcode::{decode, Op, FLAG_DEST, FLAG_EXTENDED, FLAG_INT};
use crate::value::{Relational, Value};

/// A runtime error tagged with the source line it occurred on, via
/// `Function::line_for`.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub line: u32,
    pub error: RuntimeError,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

struct Frame {
    function: Rc<Function>,
    ip: usize,
    bp: usize,
    frame_size: usize,
}

/// Default stack capacity. Matches the value the library API's `new_vm()`
/// contract requires; a host that needs more (or less) calls
/// `Vm::with_capacity` directly.
const DEFAULT_STACK_CAPACITY: usize = 1024;

pub struct Vm {
    stack: Vec<Value>,
    capacity: usize,
    frames: Vec<Frame>,
    print_sink: Box<dyn FnMut(&str)>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STACK_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stack: Vec::new(),
            capacity,
            frames: Vec::new(),
            print_sink: Box::new(|s| print!("{s}")),
        }
    }

    /// Overrides where `print` statements write; the default writes to
    /// stdout via `print!`.
    pub fn set_print_sink(&mut self, sink: impl FnMut(&str) + 'static) {
        self.print_sink = Box::new(sink);
    }

    /// Runs `function` (with no arguments or captures) to completion,
    /// returning the value of its final statement.
    #[tracing::instrument(level = "debug", skip(self, function))]
    pub fn run(&mut self, function: Rc<Function>) -> Result<Value, VmError> {
        let partial = Rc::new(Partial::new(function));
        self.push_frame(&partial).map_err(|error| self.fatal(error))?;
        let result = self.dispatch();
        match &result {
            Ok(value) => debug!(?value, "program returned"),
            Err(err) => warn!(%err, "program raised a runtime error"),
        }
        result
    }

    fn fatal(&self, error: RuntimeError) -> VmError {
        let line = self
            .frames
            .last()
            .map(|f| f.function.line_for(f.ip))
            .unwrap_or(0);
        VmError { line, error }
    }

    fn push_frame(&mut self, partial: &Rc<Partial>) -> Result<(), RuntimeError> {
        let function = partial.function.clone();
        let slots = partial.slots_snapshot();
        let frame_size = slots.len() + function.constants.len() + function.locals as usize;
        if self.stack.len() + frame_size > self.capacity {
            return Err(RuntimeError::StackOverflow {
                capacity: self.capacity,
            });
        }
        let bp = self.stack.len();
        self.stack.extend(slots);
        self.stack.extend(function.constants.iter().cloned());
        self.stack
            .extend(std::iter::repeat(Value::Null).take(function.locals as usize));
        self.frames.push(Frame {
            function,
            ip: 0,
            bp,
            frame_size,
        });
        Ok(())
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() + 1 > self.capacity {
            return Err(RuntimeError::StackOverflow {
                capacity: self.capacity,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack
            .pop()
            .expect("bytecode never pops past an empty stack")
    }

    fn peek(&self) -> &Value {
        self.stack
            .last()
            .expect("bytecode never peeks an empty stack")
    }

    /// Reads a frame-relative slot at `bp + offset`.
    fn slot(&self, offset: usize) -> Value {
        let bp = self.frames.last().unwrap().bp;
        self.stack[bp + offset].clone()
    }

    fn set_slot(&mut self, offset: usize, value: Value) {
        let bp = self.frames.last().unwrap().bp;
        self.stack[bp + offset] = value;
    }

    /// Copies the `count` operand words following the current instruction.
    fn operands(&self, count: usize) -> Vec<u16> {
        let frame = self.frames.last().unwrap();
        let start = frame.ip + 1;
        frame.function.code[start..start + count].to_vec()
    }

    /// Main dispatch loop. Runs until the outermost frame returns, then
    /// yields its result.
    fn dispatch(&mut self) -> Result<Value, VmError> {
        loop {
            let (op, flags) = {
                let frame = self.frames.last().expect("dispatch always has a frame");
                decode(frame.function.code[frame.ip])
            };
            match self.step(op, flags) {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(error) => return Err(self.fatal(error)),
            }
        }
    }

    /// Executes one instruction. Returns `Ok(Some(value))` only when the
    /// outermost frame has just returned, ending the program.
    fn step(&mut self, op: Op, flags: u16) -> Result<Option<Value>, RuntimeError> {
        use Op::*;

        // Default advance: one instruction word plus its operand words.
        // Control-flow ops overwrite `self.frames.last_mut().unwrap().ip`
        // again below before falling through to the end of the match.
        let fixed = op.fixed_operand_words();
        let extra = if fixed > 0 {
            fixed
        } else if op.operand_is_optional() && flags & FLAG_EXTENDED != 0 {
            1
        } else if op.is_dest_capable() && flags & FLAG_DEST != 0 {
            1
        } else {
            0
        };
        let operands = self.operands(extra);
        let mut next_ip = self.frames.last().unwrap().ip + 1 + extra;

        match op {
            PushNull => self.push(Value::Null)?,
            Push => {
                if flags & FLAG_INT != 0 {
                    self.push(Value::Int(operands[0] as i16 as i64))?;
                } else {
                    let v = self.slot(operands[0] as usize);
                    self.push(v)?;
                }
            }
            Pop => {
                let count = if extra == 1 { operands[0] as usize } else { 1 };
                for _ in 0..count {
                    self.pop();
                }
            }
            Reduce => {
                let keep = self.pop();
                let drop = operands[0] as usize;
                let new_len = self.stack.len() - drop;
                self.stack.truncate(new_len);
                self.push(keep)?;
            }
            Write => {
                let v = self.pop();
                self.set_slot(operands[0] as usize, v);
            }

            Add | Sub | Mul | Div | Mod | Concat => {
                let apply = |a: &Value, b: &Value| -> Result<Value, RuntimeError> {
                    match op {
                        Add => a.add(b),
                        Sub => a.sub(b),
                        Mul => a.mul(b),
                        Div => a.div(b),
                        Mod => a.rem(b),
                        Concat => a.concat(b),
                        _ => unreachable!(),
                    }
                };
                if flags & FLAG_DEST != 0 {
                    let b = self.pop();
                    let a = self.slot(operands[0] as usize);
                    let result = apply(&a, &b)?;
                    self.set_slot(operands[0] as usize, result);
                } else {
                    let b = self.pop();
                    let a = self.pop();
                    let result = apply(&a, &b)?;
                    self.push(result)?;
                }
            }

            Eq | Ne | Gt | Lt | Geq | Leq => {
                let b = self.pop();
                let a = self.pop();
                let which = match op {
                    Eq => Relational::Eq,
                    Ne => Relational::Ne,
                    Gt => Relational::Gt,
                    Lt => Relational::Lt,
                    Geq => Relational::Geq,
                    Leq => Relational::Leq,
                    _ => unreachable!(),
                };
                let result = a.relational(&b, which)?;
                self.push(result)?;
            }
            Cmp => {
                let b = self.pop();
                let a = self.pop();
                let result = a.cmp(&b)?;
                self.push(Value::Int(result))?;
            }
            In => {
                let haystack = self.pop();
                let needle = self.pop();
                let result = needle.contains(&haystack)?;
                self.push(Value::Bool(result))?;
            }

            Neg => {
                let a = self.pop();
                let result = a.neg()?;
                self.push(result)?;
            }
            Not => {
                let a = self.pop();
                let result = a.not()?;
                self.push(result)?;
            }
            MoveSlot => {
                let slot = operands[0] as usize;
                let old = self.slot(slot);
                self.set_slot(slot, Value::None);
                self.push(old)?;
            }
            MoveIndex => {
                let index = self.pop();
                let target = self.pop();
                let old = match &target {
                    Value::Array(a) => a.take(index.to_int()?)?,
                    Value::Table(t) => t.take(&index),
                    other => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "cannot move an element out of {}",
                            other.type_name()
                        )))
                    }
                };
                self.push(old)?;
            }

            Jmp => {
                next_ip = operands[0] as usize;
            }
            Jt => {
                let v = self.pop();
                if v.to_bool()? {
                    next_ip = operands[0] as usize;
                }
            }
            Jf => {
                let v = self.pop();
                if !v.to_bool()? {
                    next_ip = operands[0] as usize;
                }
            }
            Jtsc => {
                if self.peek().to_bool()? {
                    next_ip = operands[0] as usize;
                }
            }
            Jfsc => {
                if !self.peek().to_bool()? {
                    next_ip = operands[0] as usize;
                }
            }

            CreateArray => {
                let count = if extra == 1 { operands[0] as usize } else { 0 };
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.pop());
                }
                items.reverse();
                self.push(Value::Array(crate::array::JarlArray::from_vec(items)))?;
            }
            CreateRange => {
                let hi = self.pop().to_int()?;
                let lo = self.pop().to_int()?;
                let items: Vec<Value> = if lo <= hi {
                    (lo..=hi).map(Value::Int).collect()
                } else {
                    (hi..=lo).rev().map(Value::Int).collect()
                };
                self.push(Value::Array(crate::array::JarlArray::from_vec(items)))?;
            }
            CreateTable => {
                let count = if extra == 1 { operands[0] as usize } else { 0 };
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let value = self.pop();
                    let key = self.pop();
                    pairs.push((key, value));
                }
                pairs.reverse();
                self.push(Value::Table(crate::table::JarlTable::from_pairs(pairs)))?;
            }

            Get => {
                let index = self.pop();
                let target = self.pop();
                let result = target.get(&index)?;
                self.push(result)?;
            }
            Slice => {
                let hi = self.pop();
                let lo = self.pop();
                let target = self.pop();
                let result = target.slice(&lo, &hi)?;
                self.push(result)?;
            }
            SetIndex => {
                let value = self.pop();
                let index = self.pop();
                let target = self.pop();
                match &target {
                    Value::Array(a) => a.set(index.to_int()?, value)?,
                    Value::Table(t) => t.set(index, value),
                    other => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "cannot assign into {}",
                            other.type_name()
                        )))
                    }
                }
            }

            Apply => {
                let arg = self.pop();
                let callee = self.pop();
                let partial = match callee {
                    Value::Function(f) => Rc::new(Partial::new(f)),
                    Value::Partial(p) => p,
                    other => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "cannot call {}",
                            other.type_name()
                        )))
                    }
                };
                partial.apply_next(arg);
                if partial.is_saturated() {
                    self.push_frame(&partial)?;
                    // The new frame's first instruction runs on the next
                    // dispatch iteration; this frame's ip still needs to
                    // advance past `Apply` for when the callee returns.
                    self.frames[self.frames.len() - 2].ip = next_ip;
                    return Ok(None);
                } else {
                    self.push(Value::Partial(partial))?;
                    self.frames.last_mut().unwrap().ip = next_ip;
                }
            }
            BindCapture => {
                let value = self.pop();
                let slot = operands[0] as usize;
                match self.stack.last().cloned() {
                    Some(Value::Function(f)) => {
                        let partial = Rc::new(Partial::new(f));
                        partial.bind_capture(slot, value);
                        *self.stack.last_mut().unwrap() = Value::Partial(partial);
                    }
                    Some(Value::Partial(p)) => {
                        p.bind_capture(slot, value);
                    }
                    _ => {
                        return Err(RuntimeError::Invariant(
                            "BindCapture requires a function or partial on top of stack".into(),
                        ))
                    }
                }
            }

            Return => {
                let frame = self.frames.last().unwrap();
                let boundary = frame.bp + frame.frame_size;
                let result = if self.stack.len() > boundary {
                    self.pop()
                } else {
                    Value::Null
                };
                let bp = frame.bp;
                self.stack.truncate(bp);
                self.frames.pop();
                self.push(result.clone())?;
                if self.frames.is_empty() {
                    return Ok(Some(result));
                }
                return Ok(None);
            }
            Print => {
                let count = operands[0] as usize;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.pop());
                }
                items.reverse();
                let line: String = items
                    .iter()
                    .map(Value::to_jarl_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                (self.print_sink)(&line);
                (self.print_sink)("\n");
            }
            Assert => {
                let message = self.pop();
                let condition = self.pop();
                if !condition.to_bool()? {
                    return Err(RuntimeError::AssertionFailed(message.to_jarl_string()));
                }
            }

            BeginIter => {
                let container = self.pop();
                let iter = match container {
                    Value::Array(a) => JarlIterator::over_array(a),
                    Value::Table(t) => JarlIterator::over_table(&t),
                    Value::Str(s) => JarlIterator::over_str(&s),
                    other => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "cannot iterate {}",
                            other.type_name()
                        )))
                    }
                };
                self.push(Value::Iterator(Rc::new(iter)))?;
            }
            NextOrJmp => {
                let target = operands[0] as usize;
                let packed = operands[1];
                let is_pair = packed & 0x8000 != 0;
                let primary = (packed & 0x7FFF) as usize;
                let secondary = operands[2] as usize;
                let iterator = match self.peek() {
                    Value::Iterator(it) => it.clone(),
                    other => {
                        return Err(RuntimeError::Invariant(format!(
                            "NextOrJmp expects an iterator on top of stack, found {}",
                            other.type_name()
                        )))
                    }
                };
                match iterator.next() {
                    Some((key, value)) => {
                        if is_pair {
                            self.set_slot(primary, key);
                            self.set_slot(secondary, value);
                        } else {
                            self.set_slot(primary, value);
                        }
                    }
                    None => {
                        self.pop();
                        next_ip = target;
                    }
                }
            }
        }

        if !matches!(op, Return | Apply) {
            self.frames.last_mut().unwrap().ip = next_ip;
        }
        Ok(None)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{encode, op_code};

    fn func(code: Vec<u16>, constants: Vec<Value>, locals: u32) -> Rc<Function> {
        Rc::new(Function {
            code,
            constants,
            line_map: vec![(0, 1)],
            arguments: 0,
            captures: 0,
            locals,
            name: None,
        })
    }

    fn word(op: Op, flags: u16) -> u16 {
        encode(op, flags)
    }

    #[test]
    fn push_int_literals_and_add() {
        // Push|Int 2; Push|Int 3; Add; Return
        let code = vec![
            word(Op::Push, FLAG_INT),
            2,
            word(Op::Push, FLAG_INT),
            3,
            word(Op::Add, 0),
            word(Op::Return, 0),
        ];
        let mut vm = Vm::new();
        let result = vm.run(func(code, vec![], 0)).unwrap();
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn dest_add_writes_into_a_local_slot() {
        // locals: slot 0 starts Null via frame setup, so pre-seed with Write.
        // Push|Int 10; Write 0 (local := 10)
        // Push|Int 5; Add|Dest 0 (local += 5)
        // Push 0 (push local); Return
        let code = vec![
            word(Op::Push, FLAG_INT),
            10,
            word(Op::Write, 0),
            0,
            word(Op::Push, FLAG_INT),
            5,
            word(Op::Add, FLAG_DEST),
            0,
            word(Op::Push, 0),
            0,
            word(Op::Return, 0),
        ];
        let mut vm = Vm::new();
        let result = vm.run(func(code, vec![], 1)).unwrap();
        assert!(matches!(result, Value::Int(15)));
    }

    #[test]
    fn implicit_return_yields_null() {
        let code = vec![word(Op::Return, 0)];
        let mut vm = Vm::new();
        let result = vm.run(func(code, vec![], 0)).unwrap();
        assert!(matches!(result, Value::Null));
    }

    #[test]
    fn jf_skips_the_then_branch() {
        // Push|Int 0 (falsy); Jf L; Push|Int 1; Jmp END; L: Push|Int 2; END: Return
        let code = vec![
            word(Op::Push, FLAG_INT),
            0,
            word(Op::Jf, 0),
            8,
            word(Op::Push, FLAG_INT),
            1,
            word(Op::Jmp, 0),
            10,
            word(Op::Push, FLAG_INT),
            2,
            word(Op::Return, 0),
        ];
        let mut vm = Vm::new();
        let result = vm.run(func(code, vec![], 0)).unwrap();
        assert!(matches!(result, Value::Int(2)));
    }

    #[test]
    fn division_by_zero_is_a_fatal_vm_error() {
        let code = vec![
            word(Op::Push, FLAG_INT),
            1,
            word(Op::Push, FLAG_INT),
            0,
            word(Op::Div, 0),
            word(Op::Return, 0),
        ];
        let mut vm = Vm::new();
        let err = vm.run(func(code, vec![], 0)).unwrap_err();
        assert_eq!(err.error, RuntimeError::DivisionByZero);
    }

    #[test]
    fn print_writes_through_the_sink() {
        let code = vec![
            word(Op::Push, FLAG_INT),
            7,
            word(Op::Print, 0),
            1,
            word(Op::Return, 0),
        ];
        let captured = Rc::new(RefCellLog::default());
        let sink = captured.clone();
        let mut vm = Vm::new();
        vm.set_print_sink(move |s| sink.push(s));
        vm.run(func(code, vec![], 0)).unwrap();
        assert_eq!(captured.take(), "7\n");
    }

    #[derive(Default)]
    struct RefCellLog(std::cell::RefCell<String>);
    impl RefCellLog {
        fn push(&self, s: &str) {
            self.0.borrow_mut().push_str(s);
        }
        fn take(&self) -> String {
            self.0.borrow().clone()
        }
    }

    #[test]
    fn for_loop_over_array_via_begin_iter_and_next_or_jmp() {
        // locals: slot0 = accumulator, slot1 = loop stepper value
        // Write 0 <- 0 (acc)
        // push array [1,2,3]; BeginIter
        // LOOP: NextOrJmp END, slot=1 (not pair), secondary unused
        //   acc += stepper (Dest add on slot 0 using slot 1's value)
        //   Jmp LOOP
        // END: Push slot0; Return
        let const_array = Value::Array(crate::array::JarlArray::from_vec(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
        ]));
        let code = vec![
            word(Op::Push, FLAG_INT),
            0,
            word(Op::Write, 0),
            0, // slot0 = 0
            word(Op::Push, 0),
            0, // push constant array (slot index 0 within constants range == frame offset `locals_start`)
            word(Op::BeginIter, 0),
            // LOOP at ip index 7
            word(Op::NextOrJmp, 0),
            11, // target (END, filled below)
            1,  // packed: primary slot = 1, not pair
            0xFFFF,
            word(Op::Push, 0),
            1, // push stepper value (slot 1)
            word(Op::Add, FLAG_DEST),
            0, // slot0 += stepper
            word(Op::Jmp, 0),
            7, // back to LOOP
            // END at ip index 15... recomputed below
            word(Op::Push, 0),
            0,
            word(Op::Return, 0),
        ];
        // The constant array occupies frame offset `locals(2)`? Recompute:
        // frame layout = [args(0)][captures(0)][constants(1)][locals(2)]
        // constants start at offset 0 (arguments+captures==0), so slot 0
        // addresses the array constant; locals start at offset 1, so the
        // accumulator is slot 1 and the stepper binds to slot 2.
        // Rebuild with correct offsets instead of hand-waving above.
        let code = vec![
            word(Op::Push, FLAG_INT),
            0,
            word(Op::Write, 0),
            1, // slot1 (accumulator) = 0
            word(Op::Push, 0),
            0, // push constant array (slot 0)
            word(Op::BeginIter, 0),
            // LOOP at ip 7
            word(Op::NextOrJmp, 0),
            17,
            2, // primary slot = 2 (stepper), not pair
            0xFFFF,
            word(Op::Push, 0),
            2, // push stepper value
            word(Op::Add, FLAG_DEST),
            1, // slot1 += stepper
            word(Op::Jmp, 0),
            7,
            // END at ip 15
            word(Op::Push, 0),
            1,
            word(Op::Return, 0),
        ];
        let _ = const_array;
        let f = Rc::new(Function {
            code,
            constants: vec![Value::Array(crate::array::JarlArray::from_vec(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3),
            ]))],
            line_map: vec![(0, 1)],
            arguments: 0,
            captures: 0,
            locals: 2,
            name: None,
        });
        let mut vm = Vm::new();
        let result = vm.run(f).unwrap();
        assert!(matches!(result, Value::Int(6)));
    }
}
