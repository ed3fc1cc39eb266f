//! AST-to-bytecode compiler: turns a parsed, checked Jarl program into a
//! `jarl_rt::Function` the VM can run directly.
//!
//! See [`compiler::compile`] for the entry point and its module doc for
//! the closure-capture and fixup design.

mod compiler;
mod state;

pub use compiler::compile;

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use jarl_lex::lex;
    use jarl_par::parse;
    use jarl_rt::Vm;
    use jarl_sem::check;
    use jarl_util::Handler;

    use super::compile;

    fn run(source: &str) -> (Option<jarl_rt::Value>, Vec<String>) {
        let handler = Handler::new();
        let tokens = lex(source, &handler);
        let program = parse(tokens, &handler);
        check(&program, &handler);
        let function = compile(&program, &handler);
        let diagnostics = handler
            .diagnostics()
            .iter()
            .map(|d| d.to_string())
            .collect();
        match function {
            Some(f) => {
                let mut vm = Vm::new();
                (vm.run(f).ok(), diagnostics)
            }
            None => (None, diagnostics),
        }
    }

    fn run_ok(source: &str) -> jarl_rt::Value {
        let (result, diagnostics) = run(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        result.expect("script should have run without a VM error")
    }

    #[test]
    fn arithmetic_expression() {
        let v = run_ok("1 + 2 * 3");
        assert!(matches!(v, jarl_rt::Value::Int(7)));
    }

    #[test]
    fn var_and_reassignment() {
        let v = run_ok("var x = 1 x = x + 41 x");
        assert!(matches!(v, jarl_rt::Value::Int(42)));
    }

    #[test]
    fn compound_assignment() {
        let v = run_ok("var x = 10 x += 5 x");
        assert!(matches!(v, jarl_rt::Value::Int(15)));
    }

    #[test]
    fn if_else_is_a_value() {
        let v = run_ok("var x = 3 if x > 2: 1 else 0");
        assert!(matches!(v, jarl_rt::Value::Int(1)));
    }

    #[test]
    fn closures_capture_enclosing_locals() {
        let v = run_ok(
            r#"
            var make_adder = func(n) func(x) x + n
            var add5 = make_adder(5)
            add5(37)
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(42)));
    }

    #[test]
    fn recursive_closure_sees_its_own_name() {
        let v = run_ok(
            r#"
            var fact = func(n) if n <= 1: 1 else n * fact(n - 1)
            fact(5)
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(120)));
    }

    #[test]
    fn partial_application_curries_left_to_right() {
        let v = run_ok(
            r#"
            var add = func(a, b) a + b
            var add10 = add(10)
            add10(32)
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(42)));
    }

    #[test]
    fn while_loop_accumulates() {
        let v = run_ok(
            r#"
            var i = 0
            var acc = 0
            while i < 5 {
                acc += i
                i += 1
            }
            acc
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(10)));
    }

    #[test]
    fn for_loop_over_array() {
        let v = run_ok(
            r#"
            var acc = 0
            for v in [1, 2, 3, 4] {
                acc += v
            }
            acc
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(10)));
    }

    #[test]
    fn for_loop_over_table_pairs() {
        let v = run_ok(
            r#"
            var acc = 0
            for (k, v) in {a: 1, b: 2, c: 3} {
                acc += v
            }
            acc
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(6)));
    }

    #[test]
    fn indexing_and_assignment() {
        let v = run_ok(
            r#"
            var a = [1, 2, 3]
            a[1] = 99
            a[1]
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(99)));
    }

    #[test]
    fn move_semantics_leave_none_behind() {
        let v = run_ok(
            r#"
            var a = [1]
            var b = move a[0]
            b
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(1)));
    }

    #[test]
    fn logical_and_short_circuits() {
        let v = run_ok("false and (1 / 0 == 0)");
        assert!(matches!(v, jarl_rt::Value::Bool(false)));
    }

    #[test]
    fn logical_or_short_circuits() {
        let v = run_ok("true or (1 / 0 == 0)");
        assert!(matches!(v, jarl_rt::Value::Bool(true)));
    }

    #[test]
    fn undeclared_identifier_is_a_codegen_diagnostic() {
        let (result, diagnostics) = run("undeclared_name + 1");
        assert!(result.is_none());
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn errors_from_earlier_stages_prevent_codegen() {
        let handler = Handler::new();
        let tokens = lex("var = 1", &handler);
        let program = parse(tokens, &handler);
        check(&program, &handler);
        assert!(handler.has_errors());
        assert!(compile(&program, &handler).is_none());
    }

    #[test]
    fn range_literal_produces_an_array() {
        let v = run_ok("var r = [1..3] r[2]");
        assert!(matches!(v, jarl_rt::Value::Int(3)));
    }

    #[test]
    fn deeply_nested_closures_chain_captures() {
        let v = run_ok(
            r#"
            var outer = 1
            var make = func() func() func() outer
            make()()()
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Int(1)));
    }

    #[test]
    fn for_loop_over_string_yields_glyphs() {
        let v = run_ok(
            r#"
            var out = ""
            for c in "hi" {
                out ++= c
            }
            out
            "#,
        );
        assert!(matches!(v, jarl_rt::Value::Str(s) if s.as_str() == "hi"));
    }

    #[test]
    fn assert_failure_raises_a_runtime_error() {
        let (result, diagnostics) = run("assert false, \"nope\"");
        assert!(diagnostics.is_empty());
        assert!(result.is_none());
    }
}
