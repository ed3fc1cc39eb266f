//! AST-to-bytecode emission.
//!
//! One [`Compiler`] walks a function body exactly once, maintaining a
//! stack of [`FuncState`]s that mirrors the nesting of function literals
//! in the source. Every node-emitting method takes a `retain: bool`: a
//! value-producing node always leaves exactly one value on the runtime
//! stack when `retain` is true, and exactly zero when it's false — that
//! invariant is what makes `Block`'s "last statement's value is the
//! block's value" rule and a function body's implicit return free to
//! implement (just thread the flag through).
//!
//! Identifier resolution is a clox-style recursive search up the
//! `FuncState` stack: a miss in the current function asks the enclosing
//! one, and a hit there is recorded as a new capture on every level in
//! between on its way back down, each paired with how *that* level reads
//! the value. The function literal that owns the capture then emits one
//! `Push` (of the enclosing value) plus one `BindCapture` right after its
//! own `Function` constant is pushed, reusing `jarl-rt`'s `BindCapture`
//! opcode exactly as documented there — no separate closure-conversion
//! pass is needed.

use std::rc::Rc;

use tracing::debug;

use jarl_par::{AssignOp, BinaryOp, Expr, ForStepper, FunctionLit, LogicalOp, UnaryOp};
use jarl_rt::opcode::{encode, FLAG_DEST, FLAG_EXTENDED, FLAG_INT};
use jarl_rt::{Function, Op, Value};
use jarl_util::{Handler, Symbol};

use crate::state::{FixKind, FuncState, Resolved};

/// Compiles a whole program (as produced by `jarl_par::parse`) into a
/// zero-argument `Function`, ready to hand to `jarl_rt::Vm::run`.
///
/// Returns `None` without compiling anything if `handler` already carries
/// errors from an earlier pipeline stage (lex, parse, check) — codegen
/// never runs over a tree it can't trust, per the pipeline's single-sink
/// error model. Also returns `None` if codegen itself reports a new
/// error (an undeclared identifier), in which case `handler` holds it.
#[tracing::instrument(level = "debug", skip(program, handler))]
pub fn compile(program: &[Expr], handler: &Handler) -> Option<Rc<Function>> {
    if handler.has_errors() {
        debug!("skipping codegen, earlier pipeline stage reported errors");
        return None;
    }
    let mut compiler = Compiler {
        funcs: vec![FuncState::new(&[])],
        handler,
    };
    compiler.compile_body(program);
    let top = compiler.funcs.pop().expect("root FuncState always present");
    if handler.has_errors() {
        return None;
    }
    let function = compiler.finish(top, None);
    debug!(code_words = function.code.len(), "compiled program");
    Some(Rc::new(function))
}

struct Compiler<'a> {
    funcs: Vec<FuncState>,
    handler: &'a Handler,
}

impl<'a> Compiler<'a> {
    fn cur(&mut self) -> &mut FuncState {
        self.funcs.last_mut().expect("at least one FuncState")
    }

    fn finish(&self, mut state: FuncState, name: Option<String>) -> Function {
        state.apply_fixups();
        Function {
            code: state.code,
            constants: state.constants,
            // `Expr` carries no source position (a deliberately deferred
            // refinement shared with `jarl-sem`'s line-0 diagnostics); a
            // function's instructions are all attributed to line 1 rather
            // than fabricating a more precise number that doesn't exist.
            line_map: vec![(0, 1)],
            arguments: state.arguments as u32,
            captures: state.captures.len() as u32,
            locals: state.local_count as u32,
            name,
        }
    }

    // ---- low-level emission ----------------------------------------

    fn emit_op(&mut self, op: Op, flags: u16) {
        self.cur().code.push(encode(op, flags));
    }

    fn emit_fixed(&mut self, value: u16) {
        self.cur().code.push(value);
    }

    fn emit_const_fixup(&mut self, raw: u16) {
        let pos = self.cur().code.len();
        self.cur().code.push(0);
        self.cur().fixups.push(crate::state::Fixup {
            pos,
            kind: FixKind::Const,
            raw,
            or_mask: 0,
        });
    }

    fn emit_local_fixup(&mut self, raw: u16) {
        self.emit_local_fixup_masked(raw, 0);
    }

    fn emit_local_fixup_masked(&mut self, raw: u16, or_mask: u16) {
        let pos = self.cur().code.len();
        self.cur().code.push(0);
        self.cur().fixups.push(crate::state::Fixup {
            pos,
            kind: FixKind::Local,
            raw,
            or_mask,
        });
    }

    /// Emits the single operand word for a resolved slot: `Arg`/`Capture`
    /// are already absolute, `Local` needs the deferred bias.
    fn emit_slot_operand(&mut self, resolved: Resolved) {
        match resolved {
            Resolved::Arg(i) | Resolved::Capture(i) => self.emit_fixed(i),
            Resolved::Local(i) => self.emit_local_fixup(i),
        }
    }

    fn emit_pop(&mut self) {
        self.emit_op(Op::Pop, 0);
    }

    /// Emits a jump with a placeholder target, returning the position of
    /// the operand word to patch once the destination is known.
    fn emit_jump(&mut self, op: Op) -> usize {
        self.emit_op(op, 0);
        let pos = self.cur().code.len();
        self.emit_fixed(0);
        pos
    }

    fn patch_jump(&mut self, pos: usize) {
        let here = self.cur().code.len() as u16;
        self.cur().code[pos] = here;
    }

    fn here(&mut self) -> usize {
        self.cur().code.len()
    }

    fn emit_push_resolved(&mut self, resolved: Resolved) {
        self.emit_op(Op::Push, 0);
        self.emit_slot_operand(resolved);
    }

    fn emit_push_int(&mut self, v: i64) {
        if let Ok(v16) = i16::try_from(v) {
            self.emit_op(Op::Push, FLAG_INT);
            self.emit_fixed(v16 as u16);
        } else {
            let idx = self.cur().intern_constant(Value::Int(v));
            self.emit_op(Op::Push, 0);
            self.emit_const_fixup(idx);
        }
    }

    fn emit_push_constant(&mut self, value: Value) {
        let idx = self.cur().intern_constant(value);
        self.emit_op(Op::Push, 0);
        self.emit_const_fixup(idx);
    }

    // ---- identifier resolution --------------------------------------

    fn resolve_current(&mut self, name: &Symbol) -> Option<Resolved> {
        self.resolve_at(self.funcs.len() - 1, name)
    }

    fn resolve_at(&mut self, level: usize, name: &Symbol) -> Option<Resolved> {
        if let Some(r) = self.funcs[level].lookup_own(name) {
            return Some(r);
        }
        if level == 0 {
            return None;
        }
        let from_parent = self.resolve_at(level - 1, name)?;
        let idx = self.funcs[level].captures.len() as u16;
        self.funcs[level]
            .captures
            .push((name.clone(), from_parent));
        let abs = self.funcs[level].arguments + idx;
        let here = Resolved::Capture(abs);
        self.funcs[level]
            .scopes
            .last_mut()
            .expect("function always has a scope")
            .insert(name.clone(), here);
        Some(here)
    }

    // ---- top-level / function bodies --------------------------------

    /// Emits a sequence of statements as a function or program body: every
    /// statement but the last is emitted discarded, the last retained iff
    /// `retain`. Appends the trailing `Return` unconditionally.
    fn compile_body(&mut self, stmts: &[Expr]) {
        match stmts.split_last() {
            None => {
                self.emit_op(Op::PushNull, 0);
            }
            Some((last, rest)) => {
                for stmt in rest {
                    self.emit(stmt, false);
                }
                self.emit(last, true);
            }
        }
        self.emit_op(Op::Return, 0);
    }

    /// Compiles a nested function literal, leaving the resulting
    /// `Function` (or `Partial`, if it captures anything) on top of the
    /// *enclosing* function's stack.
    ///
    /// `self_slot` is `Some(slot)` when this literal is the direct
    /// initializer of `var name = func...` and the literal's own body
    /// refers back to `name` — i.e. ordinary self-recursion. That case
    /// needs special handling: `BindCapture` binds by copying the
    /// *current* value out of the resolved slot, but `name`'s slot still
    /// holds whatever `Write` hasn't gotten around to storing yet (it
    /// runs after this whole expression finishes), so a naive capture
    /// would freeze in a stale value instead of the closure itself. See
    /// the self-reference handling below.
    fn compile_function_literal(&mut self, lit: &FunctionLit, self_slot: Option<u16>) {
        self.funcs.push(FuncState::new(&lit.params));
        self.compile_body(std::slice::from_ref(lit.body.as_ref()));
        let inner = self.funcs.pop().expect("just pushed");
        let captures = inner.captures.clone();
        let compiled = self.finish(inner, None);
        let idx = self.cur().push_constant(Value::Function(Rc::new(compiled)));
        self.emit_op(Op::Push, 0);
        self.emit_const_fixup(idx);

        let params_len = lit.params.len() as u16;
        let mut self_capture_abs = None;
        for (capture_idx, (_name, parent_resolved)) in captures.into_iter().enumerate() {
            let abs_slot = params_len + capture_idx as u16;
            let is_self = matches!((self_slot, parent_resolved),
                (Some(slot), Resolved::Local(i)) if slot == i);
            if is_self {
                // Placeholder bind: the real value isn't known yet, but
                // binding *something* forces the VM to convert the bare
                // `Function` on top of stack into a genuine `Partial` —
                // a stable, shared identity we can clone a self-reference
                // out of once it has one. See the fixup below.
                self.emit_op(Op::PushNull, 0);
                self.emit_op(Op::BindCapture, 0);
                self.emit_fixed(abs_slot);
                self_capture_abs = Some(abs_slot);
            } else {
                self.emit_push_resolved(parent_resolved);
                self.emit_op(Op::BindCapture, 0);
                self.emit_fixed(abs_slot);
            }
        }
        if let (Some(slot), Some(abs)) = (self_slot, self_capture_abs) {
            // Store the now-stable closure, read two clones of it back
            // (cheap `Rc` bumps), and bind one into the other's own
            // capture slot: the closure ends up holding a reference to
            // itself. This is an intentional cycle — the accepted
            // tradeoff of the `Rc`-based, non-cycle-collecting value
            // model for making self-recursive closures possible at all.
            self.emit_op(Op::Write, 0);
            self.emit_local_fixup(slot);
            self.emit_op(Op::Push, 0);
            self.emit_local_fixup(slot);
            self.emit_op(Op::Push, 0);
            self.emit_local_fixup(slot);
            self.emit_op(Op::BindCapture, 0);
            self.emit_fixed(abs);
        }
    }

    // ---- statement-shaped nodes --------------------------------------

    fn declare_and_init(&mut self, name: &Symbol, init: &Expr, retain: bool) {
        let slot = self.cur().declare_local(name.clone());
        // Registering the slot before compiling `init` is what lets a
        // function literal assigned here resolve its own name as a
        // capture (ordinary self-recursion). When it does,
        // `compile_function_literal` needs to know which slot that is.
        match init {
            Expr::Function(lit) => self.compile_function_literal(lit, Some(slot)),
            _ => self.emit(init, true),
        }
        self.emit_op(Op::Write, 0);
        self.emit_local_fixup(slot);
        if retain {
            self.emit_op(Op::Push, 0);
            self.emit_local_fixup(slot);
        }
    }

    fn emit_while(&mut self, cond: &Expr, body: &Expr, retain: bool) {
        if retain {
            self.emit_op(Op::PushNull, 0);
        }
        let loop_top = self.here();
        self.emit(cond, true);
        let exit = self.emit_jump(Op::Jf);
        if retain {
            self.emit(body, true);
            self.emit_op(Op::Reduce, 0);
            self.emit_fixed(1);
        } else {
            self.emit(body, false);
        }
        self.emit_op(Op::Jmp, 0);
        self.emit_fixed(loop_top as u16);
        self.patch_jump(exit);
    }

    /// `for` always runs its body discarded: unlike `while`, the iterator
    /// must stay on top of the stack for every `NextOrJmp` to peek, so
    /// there's no room to also carry a retained accumulator value above
    /// it. A `for` loop used in a value position (the rare case of being
    /// a retained block's tail statement) simply evaluates to `null` —
    /// a deliberate simplification over accumulating the body's value,
    /// noted in DESIGN.md.
    fn emit_for(&mut self, stepper: &ForStepper, iter: &Expr, body: &Expr, retain: bool) {
        self.emit(iter, true);
        self.emit_op(Op::BeginIter, 0);
        self.cur().push_scope();
        let (primary, secondary, is_pair) = match stepper {
            ForStepper::Value(name) => (self.cur().declare_local(name.clone()), None, false),
            ForStepper::KeyValue(k, v) => {
                let k_slot = self.cur().declare_local(k.clone());
                let v_slot = self.cur().declare_local(v.clone());
                (k_slot, Some(v_slot), true)
            }
        };
        let loop_top = self.here();
        self.emit_op(Op::NextOrJmp, 0);
        let exit = self.cur().code.len();
        self.emit_fixed(0); // loop-exit target, patched below
        let or_mask = if is_pair { 0x8000 } else { 0 };
        self.emit_local_fixup_masked(primary, or_mask);
        match secondary {
            Some(slot) => self.emit_local_fixup(slot),
            None => self.emit_fixed(0xFFFF),
        }
        self.emit(body, false);
        self.emit_op(Op::Jmp, 0);
        self.emit_fixed(loop_top as u16);
        let end = self.here() as u16;
        self.cur().code[exit] = end;
        self.cur().pop_scope();
        if retain {
            self.emit_op(Op::PushNull, 0);
        }
    }

    fn emit_print(&mut self, args: &[Expr], retain: bool) {
        for arg in args {
            self.emit(arg, true);
        }
        self.emit_op(Op::Print, 0);
        self.emit_fixed(args.len() as u16);
        if retain {
            self.emit_op(Op::PushNull, 0);
        }
    }

    fn emit_assert(&mut self, cond: &Expr, msg: &Expr, retain: bool) {
        self.emit(cond, true);
        self.emit(msg, true);
        self.emit_op(Op::Assert, 0);
        if retain {
            self.emit_op(Op::PushNull, 0);
        }
    }

    fn emit_return(&mut self, value: &Option<Box<Expr>>) {
        match value {
            Some(v) => self.emit(v, true),
            None => self.emit_op(Op::PushNull, 0),
        }
        self.emit_op(Op::Return, 0);
    }

    fn emit_block(&mut self, stmts: &[Expr], retain: bool) {
        self.cur().push_scope();
        match stmts.split_last() {
            None => {
                if retain {
                    self.emit_op(Op::PushNull, 0);
                }
            }
            Some((last, rest)) => {
                for stmt in rest {
                    self.emit(stmt, false);
                }
                self.emit(last, retain);
            }
        }
        self.cur().pop_scope();
    }

    fn emit_if(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: &Option<Box<Expr>>,
        retain: bool,
    ) {
        self.emit(cond, true);
        let to_else = self.emit_jump(Op::Jf);
        self.emit(then_branch, retain);
        let to_end = self.emit_jump(Op::Jmp);
        self.patch_jump(to_else);
        match else_branch {
            Some(branch) => self.emit(branch, retain),
            None => {
                if retain {
                    self.emit_op(Op::PushNull, 0);
                }
            }
        }
        self.patch_jump(to_end);
    }

    // ---- assignment ----------------------------------------------------

    fn emit_assign(&mut self, op: AssignOp, left: &Expr, right: &Expr, retain: bool) {
        match left {
            Expr::Ident(name) => self.emit_assign_to_ident(op, name, right, retain),
            Expr::Index(target, sub) => self.emit_assign_to_index(op, target, sub, right, retain),
            other => {
                self.handler
                    .error(0, format!("cannot assign into {other:?}"));
                if retain {
                    self.emit_op(Op::PushNull, 0);
                }
            }
        }
    }

    fn emit_assign_to_ident(&mut self, op: AssignOp, name: &Symbol, right: &Expr, retain: bool) {
        let Some(resolved) = self.resolve_current(name) else {
            self.handler
                .error(0, format!("assignment to undeclared identifier '{name}'"));
            self.emit(right, false);
            if retain {
                self.emit_op(Op::PushNull, 0);
            }
            return;
        };
        match op {
            AssignOp::Set => {
                self.emit(right, true);
                self.emit_op(Op::Write, 0);
                self.emit_slot_operand(resolved);
            }
            AssignOp::Move => {
                self.emit_move_of(right);
                self.emit_op(Op::Write, 0);
                self.emit_slot_operand(resolved);
            }
            _ => {
                self.emit(right, true);
                self.emit_op(dest_op_for(op), FLAG_DEST);
                self.emit_slot_operand(resolved);
            }
        }
        if retain {
            self.emit_push_resolved(resolved);
        }
    }

    /// Compound assignment into an index target (`a[i] += v`) has no
    /// `Dest`-style opcode to overwrite an arbitrary element in place, so
    /// the target/subscript pair is evaluated twice: once to read the
    /// current value, once to address the write. Fine as long as the
    /// target/subscript expressions are side-effect free, which is the
    /// common case (`a[i]`, not `next_container()[i]`) — a known
    /// simplification, not a correctness issue for the former.
    fn emit_assign_to_index(
        &mut self,
        op: AssignOp,
        target: &Expr,
        sub: &Expr,
        right: &Expr,
        retain: bool,
    ) {
        match op {
            AssignOp::Set => {
                self.emit(target, true);
                self.emit(sub, true);
                self.emit(right, true);
                self.emit_op(Op::SetIndex, 0);
                if retain {
                    self.emit(target, true);
                    self.emit(sub, true);
                    self.emit_op(Op::Get, 0);
                }
            }
            AssignOp::Move => {
                self.emit(target, true);
                self.emit(sub, true);
                self.emit_move_of(right);
                self.emit_op(Op::SetIndex, 0);
                if retain {
                    self.emit(target, true);
                    self.emit(sub, true);
                    self.emit_op(Op::Get, 0);
                }
            }
            _ => {
                // Push target/sub once for the eventual write, then again
                // to read the current value — `SetIndex` needs
                // `[target, sub, value]` with `value` on top, and nothing
                // here can rearrange an already-pushed value without a
                // dup primitive, so the pair is evaluated twice.
                self.emit(target, true);
                self.emit(sub, true);
                self.emit(target, true);
                self.emit(sub, true);
                self.emit_op(Op::Get, 0);
                self.emit(right, true);
                self.emit_op(binop_for_assign(op), 0);
                self.emit_op(Op::SetIndex, 0);
                if retain {
                    self.emit(target, true);
                    self.emit(sub, true);
                    self.emit_op(Op::Get, 0);
                }
            }
        }
    }

    fn emit_move_of(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(name) => {
                if let Some(resolved) = self.resolve_current(name) {
                    self.emit_op(Op::MoveSlot, 0);
                    self.emit_slot_operand(resolved);
                } else {
                    self.handler
                        .error(0, format!("move of undeclared identifier '{name}'"));
                    self.emit_op(Op::PushNull, 0);
                }
            }
            Expr::Index(target, sub) => {
                self.emit(target, true);
                self.emit(sub, true);
                self.emit_op(Op::MoveIndex, 0);
            }
            other => {
                self.handler.error(0, format!("cannot move {other:?}"));
                self.emit_op(Op::PushNull, 0);
            }
        }
    }

    // ---- value-producing nodes -----------------------------------------

    fn emit_value(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLit(v) => self.emit_push_int(*v),
            Expr::FloatLit(v) => self.emit_push_constant(Value::Float(*v)),
            Expr::StrLit(s) => self.emit_push_constant(Value::Str(s.clone())),
            Expr::BoolLit(b) => self.emit_push_constant(Value::Bool(*b)),
            Expr::NullLit | Expr::Nop | Expr::Error => self.emit_op(Op::PushNull, 0),
            Expr::Ident(name) => match self.resolve_current(name) {
                Some(resolved) => self.emit_push_resolved(resolved),
                None => {
                    self.handler
                        .error(0, format!("undeclared identifier '{name}'"));
                    self.emit_op(Op::PushNull, 0);
                }
            },
            Expr::Unary(UnaryOp::Move, operand) => self.emit_move_of(operand),
            Expr::Unary(UnaryOp::Neg, operand) => {
                self.emit(operand, true);
                self.emit_op(Op::Neg, 0);
            }
            Expr::Unary(UnaryOp::Not, operand) => {
                self.emit(operand, true);
                self.emit_op(Op::Not, 0);
            }
            Expr::Binary(op, l, r) => {
                self.emit(l, true);
                self.emit(r, true);
                self.emit_op(binop(*op), 0);
            }
            Expr::Logical(LogicalOp::And, l, r) => self.emit_short_circuit(l, r, Op::Jfsc),
            Expr::Logical(LogicalOp::Or, l, r) => self.emit_short_circuit(l, r, Op::Jtsc),
            Expr::Index(target, sub) => {
                self.emit(target, true);
                self.emit(sub, true);
                self.emit_op(Op::Get, 0);
            }
            Expr::Slice(target, lo, hi) => {
                self.emit(target, true);
                self.emit(lo, true);
                self.emit(hi, true);
                self.emit_op(Op::Slice, 0);
            }
            Expr::Call(callee, arg) => {
                self.emit(callee, true);
                self.emit(arg, true);
                self.emit_op(Op::Apply, 0);
            }
            Expr::Array(items) => {
                for item in items {
                    self.emit(item, true);
                }
                if items.is_empty() {
                    self.emit_op(Op::CreateArray, 0);
                } else {
                    self.emit_op(Op::CreateArray, FLAG_EXTENDED);
                    self.emit_fixed(items.len() as u16);
                }
            }
            Expr::Range(lo, hi) => {
                self.emit(lo, true);
                self.emit(hi, true);
                self.emit_op(Op::CreateRange, 0);
            }
            Expr::Table(pairs) => {
                for (k, v) in pairs {
                    self.emit(k, true);
                    self.emit(v, true);
                }
                if pairs.is_empty() {
                    self.emit_op(Op::CreateTable, 0);
                } else {
                    self.emit_op(Op::CreateTable, FLAG_EXTENDED);
                    self.emit_fixed(pairs.len() as u16);
                }
            }
            Expr::Function(lit) => self.compile_function_literal(lit, None),
            _ => unreachable!("statement-shaped node routed through emit_value"),
        }
    }

    fn emit_short_circuit(&mut self, l: &Expr, r: &Expr, op: Op) {
        self.emit(l, true);
        let end = self.emit_jump(op);
        self.emit_pop();
        self.emit(r, true);
        self.patch_jump(end);
    }

    // ---- dispatcher ------------------------------------------------

    fn emit(&mut self, expr: &Expr, retain: bool) {
        match expr {
            Expr::Var { name, init } => self.declare_and_init(name, init, retain),
            Expr::Assign(op, l, r) => self.emit_assign(*op, l, r, retain),
            Expr::While { cond, body } => self.emit_while(cond, body, retain),
            Expr::For {
                stepper,
                iter,
                body,
            } => self.emit_for(stepper, iter, body, retain),
            Expr::Return(value) => self.emit_return(value),
            Expr::Print(args) => self.emit_print(args, retain),
            Expr::Assert(cond, msg) => self.emit_assert(cond, msg, retain),
            Expr::Block(stmts) => self.emit_block(stmts, retain),
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => self.emit_if(cond, then_branch, else_branch, retain),
            _ => {
                self.emit_value(expr);
                if !retain {
                    self.emit_pop();
                }
            }
        }
    }
}

fn binop(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Concat => Op::Concat,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::Ne => Op::Ne,
        BinaryOp::Cmp => Op::Cmp,
        BinaryOp::Gt => Op::Gt,
        BinaryOp::Lt => Op::Lt,
        BinaryOp::Geq => Op::Geq,
        BinaryOp::Leq => Op::Leq,
        BinaryOp::In => Op::In,
    }
}

fn dest_op_for(op: AssignOp) -> Op {
    match op {
        AssignOp::Add => Op::Add,
        AssignOp::Sub => Op::Sub,
        AssignOp::Mul => Op::Mul,
        AssignOp::Div => Op::Div,
        AssignOp::Mod => Op::Mod,
        AssignOp::Concat => Op::Concat,
        AssignOp::Set | AssignOp::Move => unreachable!("handled separately"),
    }
}

fn binop_for_assign(op: AssignOp) -> Op {
    dest_op_for(op)
}
