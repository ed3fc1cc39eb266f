//! Ten worked example scripts, each checked byte-for-byte through the
//! public [`jarl::Vm`] API.

use std::cell::RefCell;
use std::rc::Rc;

use jarl::Vm;

fn run(source: &str) -> String {
    let mut vm = Vm::new_vm();
    let captured = Rc::new(RefCell::new(String::new()));
    let sink = captured.clone();
    vm.set_print_func(move |s| sink.borrow_mut().push_str(s));
    vm.execute(source).expect("script should run without error");
    Rc::try_unwrap(captured).unwrap().into_inner()
}

#[test]
fn scenario_1_precedence() {
    assert_eq!(run("print 1 + 2 * 3"), "7\n");
}

#[test]
fn scenario_2_negative_index_assignment() {
    assert_eq!(run("var a = [1,2,3]\na[-1] = 9\nprint a"), "[1, 2, 9]\n");
}

#[test]
fn scenario_3_two_argument_application() {
    assert_eq!(run("var f = func(x,y) x+y\nprint f 10 5"), "15\n");
}

#[test]
fn scenario_4_closure_captures_outer_argument() {
    assert_eq!(
        run("var g = func(x) func(y) x+y\nprint (g 7) 3"),
        "10\n"
    );
}

#[test]
fn scenario_5_string_iteration_yields_glyphs() {
    assert_eq!(
        run("var s = \"hi\"\nfor c in s: print c"),
        "h\ni\n"
    );
}

#[test]
fn scenario_6_table_iteration_yields_both_pairs() {
    let output = run("var t = {\"a\": 1, \"b\": 2}\nfor (k,v) in t: print k ++ \"=\" ++ v");
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["a=1", "b=2"]);
}

#[test]
fn scenario_7_while_loop_prints_each_iteration() {
    assert_eq!(
        run("var i = 0\nwhile i < 3: { print i\ni += 1 }"),
        "0\n1\n2\n"
    );
}

#[test]
fn scenario_8_if_is_a_value_on_both_sides_of_plus() {
    assert_eq!(
        run("print (if true : 1 else 2) + (if false : 10 else 20)"),
        "21\n"
    );
}

#[test]
fn scenario_9_slice_is_half_open_on_the_high_end() {
    assert_eq!(run("print [1,2,3,4,5][1:4]"), "[2, 3, 4]\n");
}

#[test]
fn scenario_10_recursion_via_name_binding() {
    assert_eq!(
        run("var acc = func(n) if n == 0 : 0 else n + acc (n-1)\nprint acc 5"),
        "15\n"
    );
}
