// loxvm: a bytecode virtual machine for a small dynamically-typed
// scripting language.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! End-to-end scenarios driving `Vm::interpret` with real source text.
//! These check `InterpretResult`/exit codes rather than captured
//! stdout (the `print` statement writes straight to the process's
//! stdout, same as the teacher's own renderer output; there is no
//! stdout-capturing crate anywhere in the pack to reach for).

use loxvm::error::InterpretResult;
use loxvm::Vm;

fn interpret_ok(source: &str) {
    let mut vm = Vm::new();
    let result = vm.interpret(source);
    assert!(
        matches!(result, InterpretResult::Ok),
        "expected Ok, got {:?}",
        result
    );
    assert_eq!(result.exit_code(), 0);
}

#[test]
fn e1_arithmetic_precedence() {
    interpret_ok("print 1 + 2 * 3;"); // 7
}

#[test]
fn e2_string_concatenation() {
    interpret_ok(r#"var a = "hi"; var b = "!"; print a + b;"#); // hi!
}

#[test]
fn e3_while_loop() {
    interpret_ok("var i = 0; while (i < 3) { print i; i = i + 1; }"); // 0 1 2
}

#[test]
fn e4_function_call() {
    interpret_ok("fun f(x) { return x * x; } print f(5);"); // 25
}

#[test]
fn e5_native_function_call() {
    interpret_ok("print triple(4);"); // 12
}

#[test]
fn e6_undefined_global_is_a_runtime_error() {
    let mut vm = Vm::new();
    let result = vm.interpret("print x;");
    assert!(matches!(result, InterpretResult::RuntimeError(_)));
    assert_eq!(result.exit_code(), 70);
    if let InterpretResult::RuntimeError(error) = result {
        assert_eq!(error.kind.to_string(), "Undefined variable 'x'.");
        assert_eq!(error.backtrace.len(), 1);
        assert_eq!(error.backtrace[0].to_string(), "[line 1] in script");
    }
}

#[test]
fn e7_unbounded_recursion_overflows_the_frame_stack() {
    let mut vm = Vm::new();
    let result = vm.interpret("fun r() { return r(); } r();");
    assert!(matches!(result, InterpretResult::RuntimeError(_)));
    assert_eq!(result.exit_code(), 70);
    if let InterpretResult::RuntimeError(error) = result {
        assert_eq!(error.kind.to_string(), "Stack overflow.");
        assert_eq!(error.backtrace.len(), 64);
    }
}

#[test]
fn if_else_takes_the_correct_branch() {
    interpret_ok("if (1 < 2) { print \"yes\"; } else { print \"no\"; }");
}

#[test]
fn for_loop_desugars_correctly() {
    interpret_ok("for (var i = 0; i < 3; i = i + 1) { print i; }");
}

#[test]
fn logical_and_or_short_circuit() {
    interpret_ok("print true and false; print false or true;");
}

#[test]
fn nested_blocks_pop_locals_on_scope_exit() {
    interpret_ok("{ var a = 1; { var b = 2; print a + b; } print a; }");
}

#[test]
fn compile_error_on_unterminated_string_maps_to_exit_code_65() {
    let mut vm = Vm::new();
    let result = vm.interpret("print \"unterminated;");
    assert!(matches!(result, InterpretResult::CompileError(_)));
    assert_eq!(result.exit_code(), 65);
}

#[test]
fn calling_a_number_is_a_runtime_error() {
    let mut vm = Vm::new();
    let result = vm.interpret("var x = 1; x();");
    assert!(matches!(result, InterpretResult::RuntimeError(_)));
}

#[test]
fn a_script_can_continue_after_a_runtime_error_in_a_repl_style_session() {
    let mut vm = Vm::new();
    let first = vm.interpret("print y;");
    assert!(matches!(first, InterpretResult::RuntimeError(_)));
    // Globals defined before the error (here, the natives) still work.
    let second = vm.interpret("print triple(2);");
    assert!(matches!(second, InterpretResult::Ok));
}
