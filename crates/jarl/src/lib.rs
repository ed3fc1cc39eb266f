//! The glue crate: one entry point that lexes, parses, checks, compiles and
//! runs a Jarl script, sequencing `jarl-lex`/`jarl-par`/`jarl-sem`/
//! `jarl-codegen`/`jarl-rt` behind a small host-facing API.
//!
//! Exposes `new_vm`/`destroy_vm`/`set_print_func`/`execute`/
//! `set_error_print_func` as ordinary Rust methods on [`Vm`] rather than
//! five free functions operating on an opaque handle. `destroy_vm` has no
//! Rust equivalent beyond `Drop`, which [`Vm`] gets for free, so only a
//! thin `destroy_vm(vm)` wrapper is kept for callers that want to spell
//! it out explicitly.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use jarl_rt::{Value, VmError};
use jarl_util::Handler;

type Sink = Rc<RefCell<Box<dyn FnMut(&str)>>>;

fn default_sink() -> Sink {
    Rc::new(RefCell::new(Box::new(|s: &str| print!("{s}"))))
}

/// Everything that can keep `execute` from returning a value: diagnostics
/// accumulated during lex/parse/check/codegen (compilation never reached
/// the VM), or a runtime error the VM hit partway through. Either the VM
/// ran the program to completion, or it ran to the first failure and
/// stopped; there is no partial result either way.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("compilation failed:\n{0}")]
    Diagnostics(String),
    #[error("runtime error: {0}")]
    Runtime(VmError),
}

/// A Jarl virtual machine: one value stack, one call-frame stack, and the
/// host sinks `print`/diagnostics are delivered through.
///
/// `print_sink` and `error_sink` are reference-counted so that replacing
/// one with [`Vm::set_print_func`]/[`Vm::set_error_print_func`] is visible
/// to the closure already wired into the underlying `jarl_rt::Vm` without
/// having to re-wire it. The inner VM only ever sees one stable closure
/// per slot, which forwards through whatever is currently stored.
pub struct Vm {
    inner: jarl_rt::Vm,
    print_sink: Sink,
    error_sink: Option<Sink>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new_vm()
    }
}

impl Vm {
    /// Creates a VM with the default stack capacity (1024 slots).
    pub fn new_vm() -> Self {
        let print_sink = default_sink();
        let mut inner = jarl_rt::Vm::new();
        wire_print_sink(&mut inner, &print_sink);
        Self {
            inner,
            print_sink,
            error_sink: None,
        }
    }

    /// Creates a VM whose value stack holds `capacity` slots instead of the
    /// default. A host embedding Jarl in a memory-constrained environment,
    /// or one running scripts with unusually deep recursion, calls this
    /// directly instead of [`Vm::new_vm`].
    pub fn with_capacity(capacity: usize) -> Self {
        let print_sink = default_sink();
        let mut inner = jarl_rt::Vm::with_capacity(capacity);
        wire_print_sink(&mut inner, &print_sink);
        Self {
            inner,
            print_sink,
            error_sink: None,
        }
    }

    /// Installs the host's output sink. The VM calls it once per `print`
    /// statement, and (absent a separate error sink) for diagnostics too.
    pub fn set_print_func(&mut self, f: impl FnMut(&str) + 'static) {
        *self.print_sink.borrow_mut() = Box::new(f);
    }

    /// Installs a separate sink for compile/runtime diagnostics, so a host
    /// that wants script output and error reporting on different streams
    /// (e.g. stdout vs stderr) doesn't have to demultiplex one sink itself.
    pub fn set_error_print_func(&mut self, f: impl FnMut(&str) + 'static) {
        self.error_sink = Some(Rc::new(RefCell::new(Box::new(f))));
    }

    fn report(&self, message: &str) {
        match &self.error_sink {
            Some(sink) => (sink.borrow_mut())(message),
            None => (self.print_sink.borrow_mut())(message),
        }
    }

    /// Compiles and runs `source` to completion. Diagnostics from any
    /// pipeline stage are delivered to the configured sink as well as
    /// returned, so a host can both stream them live and inspect the final
    /// outcome.
    #[tracing::instrument(level = "debug", skip(self, source))]
    pub fn execute(&mut self, source: &str) -> Result<Value, ExecuteError> {
        let handler = Handler::new();
        let tokens = jarl_lex::lex(source, &handler);
        let program = jarl_par::parse(tokens, &handler);
        jarl_sem::check(&program, &handler);
        let function = jarl_codegen::compile(&program, &handler);

        if handler.has_errors() {
            let rendered = handler.render();
            self.report(&rendered);
            return Err(ExecuteError::Diagnostics(rendered));
        }
        let function = function.expect("no diagnostics implies codegen produced a function");

        match self.inner.run(function) {
            Ok(value) => {
                debug!("execute completed");
                Ok(value)
            }
            Err(err) => {
                self.report(&err.to_string());
                Err(ExecuteError::Runtime(err))
            }
        }
    }
}

fn wire_print_sink(inner: &mut jarl_rt::Vm, sink: &Sink) {
    let sink = sink.clone();
    inner.set_print_sink(move |s| (sink.borrow_mut())(s));
}

/// Free-function alias for [`Vm::new_vm`].
pub fn new_vm() -> Vm {
    Vm::new_vm()
}

/// Releases `vm` and every heap object reachable only through it. Rust's
/// `Drop` already does this the moment `vm` goes out of scope; this exists
/// only so a caller that wants to spell destruction out explicitly has
/// something to call.
pub fn destroy_vm(vm: Vm) {
    drop(vm);
}
