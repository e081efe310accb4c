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

//! The dispatch loop (component C6) together with the call-frame /
//! operand stack (component C5). This is where arithmetic,
//! comparison, control flow, calls, and variable access all live,
//! fanning out to `Value`, `Heap`, and `Table` for the actual data.

use crate::chunk::OpCode;
use crate::compiler;
use crate::config::VmConfig;
use crate::error::{BacktraceFrame, InterpretResult, RuntimeError, RuntimeErrorKind};
use crate::native::{self, NativeContext, NativeResult};
use crate::object::{FunctionHandle, Heap, ObjHandle};
use crate::table::{self, ValueTable};
use crate::value::{values_equal, Value};

/// One activation record: which function is running, where its
/// instruction pointer is, and where its stack slots begin. This
/// replaces the original's cached raw `ip`/`slots` pointers with a
/// plain index pair (Design Note D2).
struct CallFrame {
    function: FunctionHandle,
    ip: usize,
    slot_base: usize,
}

/// The entire VM state: heap, both hash tables, the operand stack,
/// and the frame stack. An ordinary owned struct rather than a
/// process-wide singleton (Design Note D4), so nothing stops an
/// embedder from running several independent `Vm`s side by side.
pub struct Vm {
    heap: Heap,
    strings: ValueTable,
    globals: ValueTable,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    config: VmConfig,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut vm = Vm {
            heap: Heap::new(),
            strings: ValueTable::new(),
            globals: ValueTable::new(),
            stack: Vec::with_capacity(config.stack_max),
            frames: Vec::with_capacity(config.frames_max),
            config,
        };
        vm.define_native("clock", native::clock);
        vm.define_native("triple", native::triple);
        vm.define_native("print_line", native::print_line);
        vm.define_native("type_name", native::type_name);
        vm
    }

    /// Interns `name`, allocates a `Native` object, and binds it in
    /// `globals`. Mirrors `defineNative` exactly, including pushing
    /// both intermediates onto the operand stack first: a future
    /// tracing collector that scans the stack for roots would
    /// otherwise have a window where neither value is reachable from
    /// anywhere while the second allocation runs.
    fn define_native(&mut self, name: &'static str, function: native::NativeFn) {
        let name_handle = table::intern(&mut self.heap, &mut self.strings, name);
        self.stack.push(Value::Obj(ObjHandle::String(name_handle)));
        let native_handle = self.heap.alloc_native(function, name);
        self.stack.push(Value::Obj(ObjHandle::Native(native_handle)));
        let hash = self.heap.string(name_handle).hash;
        self.globals.set(name_handle, hash, self.stack[self.stack.len() - 1]);
        self.stack.pop();
        self.stack.pop();
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn strings_mut(&mut self) -> &mut ValueTable {
        &mut self.strings
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack
            .pop()
            .expect("operand stack underflow: compiler emitted unbalanced bytecode")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn backtrace(&self) -> Vec<BacktraceFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(frame.function);
                let line = function.chunk.get_line(frame.ip.saturating_sub(1));
                let function_name = function
                    .name
                    .map(|h| self.heap.string(h).as_str().to_string());
                BacktraceFrame { line, function_name }
            })
            .collect()
    }

    /// Builds the error, prints it to stderr along with the
    /// backtrace, and resets the stack/frames — matching the
    /// original's `runtimeError`, including that globals and the
    /// intern table are left untouched.
    fn runtime_error(&mut self, kind: RuntimeErrorKind) -> RuntimeError {
        let backtrace = self.backtrace();
        let error = RuntimeError::new(kind, backtrace);
        error.emit();
        self.reset_stack();
        error
    }

    /// `call`: validates arity and frame depth, then pushes a new
    /// activation record.
    fn call(&mut self, function: FunctionHandle, argc: u8) -> Result<(), RuntimeError> {
        if self.frames.len() == self.config.frames_max {
            return Err(self.runtime_error(RuntimeErrorKind::StackOverflow));
        }
        let arity = self.heap.function(function).arity;
        if arity != argc {
            let function_name = self
                .heap
                .function(function)
                .name
                .map(|h| self.heap.string(h).as_str().to_string())
                .unwrap_or_else(|| "script".to_string());
            return Err(self.runtime_error(RuntimeErrorKind::Arity {
                expected: arity,
                got: argc,
                function_name,
            }));
        }
        self.frames.push(CallFrame {
            function,
            ip: 0,
            slot_base: self.stack.len() - argc as usize - 1,
        });
        Ok(())
    }

    /// `callValue`: dispatches on the callee's object type.
    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeError> {
        match callee {
            Value::Obj(ObjHandle::Function(handle)) => self.call(handle, argc),
            Value::Obj(ObjHandle::Native(handle)) => {
                let native = self.heap.native(handle);
                let function = native.function;
                let name = native.name;
                let argv_start = self.stack.len() - argc as usize;
                let result = {
                    let mut ctx = NativeContext {
                        heap: &mut self.heap,
                        strings: &mut self.strings,
                    };
                    function(&mut ctx, argc as u32, &self.stack[argv_start..])
                };
                match result {
                    NativeResult::Value(value) => {
                        self.stack.truncate(argv_start - 1);
                        self.push(value);
                        Ok(())
                    }
                    NativeResult::ErrorArgc => {
                        Err(self.runtime_error(RuntimeErrorKind::NativeArgc {
                            native_name: name.to_string(),
                        }))
                    }
                    NativeResult::ErrorArgv => {
                        Err(self.runtime_error(RuntimeErrorKind::NativeArgv {
                            native_name: name.to_string(),
                        }))
                    }
                }
            }
            _ => Err(self.runtime_error(RuntimeErrorKind::NotCallable)),
        }
    }

    /// `OP_ADD` on two strings: concatenate then intern by content, so
    /// that two scripts building the same string via concatenation
    /// still end up sharing one `StringHandle`.
    fn concatenate(&mut self) {
        let b = self.pop().as_string().expect("peeked as string");
        let a = self.pop().as_string().expect("peeked as string");
        let mut joined =
            String::with_capacity(self.heap.string(a).len() + self.heap.string(b).len());
        joined.push_str(self.heap.string(a).as_str());
        joined.push_str(self.heap.string(b).as_str());
        let handle = table::intern(&mut self.heap, &mut self.strings, &joined);
        self.push(Value::Obj(ObjHandle::String(handle)));
    }

    fn type_error(&mut self, message: impl Into<String>) -> RuntimeError {
        self.runtime_error(RuntimeErrorKind::TypeError(message.into()))
    }

    /// Compiles `source` and runs it to completion. This is the
    /// `interpret(source) -> InterpretResult` embedder entry point.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let function = match compiler::compile(&mut self.heap, &mut self.strings, source) {
            Ok(function) => function,
            Err(errors) => return InterpretResult::CompileError(errors),
        };
        self.interpret_function(function)
    }

    /// Runs a pre-built `Function` directly, bypassing the front end
    /// entirely. Used by tests and by embedders that construct chunks
    /// programmatically instead of compiling source text.
    pub fn interpret_function(&mut self, function: FunctionHandle) -> InterpretResult {
        self.push(Value::Obj(ObjHandle::Function(function)));
        if let Err(error) = self.call(function, 0) {
            return InterpretResult::RuntimeError(error);
        }
        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(error) => InterpretResult::RuntimeError(error),
        }
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().unwrap();
        let byte = self.heap.function(frame.function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        let frame = self.frames.last().unwrap();
        self.heap.function(frame.function).chunk.constants[index as usize]
    }

    fn read_string(&mut self) -> crate::object::StringHandle {
        self.read_constant()
            .as_string()
            .expect("compiler only ever emits string constants for name operands")
    }

    /// The dispatch loop. Exactly one instruction is decoded and
    /// executed per iteration; it never yields mid-instruction.
    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            #[cfg(feature = "trace_execution")]
            {
                let frame = self.frames.last().unwrap();
                crate::debug::trace_stack(&self.stack);
                crate::debug::disassemble_instruction(
                    &self.heap.function(frame.function).chunk,
                    frame.ip,
                    &self.heap,
                );
            }

            let instruction = self.read_byte();
            let op =
                OpCode::from_byte(instruction).expect("compiler only ever emits valid opcodes");

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::PopN => {
                    let n = self.read_byte();
                    let new_len = self.stack.len() - n as usize;
                    self.stack.truncate(new_len);
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slot_base;
                    self.push(self.stack[base + slot]);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames.last().unwrap().slot_base;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string(name).hash;
                    match self.globals.get(name, hash) {
                        Some(&value) => self.push(value),
                        None => {
                            let message = self.heap.string(name).as_str().to_string();
                            return Err(
                                self.runtime_error(RuntimeErrorKind::UndefinedVariable(message))
                            );
                        }
                    }
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string(name).hash;
                    let value = self.peek(0);
                    // `set` both creates a binding and reports whether
                    // it was new; an assignment to an undefined global
                    // must not silently create one, so undo it again.
                    if self.globals.set(name, hash, value) {
                        self.globals.delete(name, hash);
                        let message = self.heap.string(name).as_str().to_string();
                        return Err(
                            self.runtime_error(RuntimeErrorKind::UndefinedVariable(message))
                        );
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(values_equal(&a, &b)));
                }
                OpCode::Greater => self.binary_compare(|a, b| a > b)?,
                OpCode::Less => self.binary_compare(|a, b| a < b)?,
                OpCode::Add => {
                    if self.peek(0).is_string() && self.peek(1).is_string() {
                        self.concatenate();
                    } else if self.peek(0).is_number() && self.peek(1).is_number() {
                        let b = self.pop().as_number().unwrap();
                        let a = self.pop().as_number().unwrap();
                        self.push(Value::Number(a + b));
                    } else {
                        return Err(self.type_error(
                            "+ can only be used to concatenate two strings or add two numbers.",
                        ));
                    }
                }
                OpCode::Subtract => self.binary_numeric(|a, b| a - b)?,
                OpCode::Multiply => self.binary_numeric(|a, b| a * b)?,
                OpCode::Divide => self.binary_numeric(|a, b| a / b)?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    if !self.peek(0).is_number() {
                        return Err(self.type_error("Operand must be a number."));
                    }
                    let n = self.pop().as_number().unwrap();
                    self.push(Value::Number(-n));
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{}", self.stringify(&value));
                }
                OpCode::Jump => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16();
                    self.frames.last_mut().unwrap().ip -= offset as usize;
                }
                OpCode::Call => {
                    let argc = self.read_byte();
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    if self.frames.is_empty() {
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.slot_base);
                    self.push(result);
                }
            }
        }
    }

    fn binary_numeric(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        if !self.peek(0).is_number() || !self.peek(1).is_number() {
            return Err(self.type_error("Operands must be numbers."));
        }
        let b = self.pop().as_number().unwrap();
        let a = self.pop().as_number().unwrap();
        self.push(Value::Number(op(a, b)));
        Ok(())
    }

    fn binary_compare(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        if !self.peek(0).is_number() || !self.peek(1).is_number() {
            return Err(self.type_error("Operands must be numbers."));
        }
        let b = self.pop().as_number().unwrap();
        let a = self.pop().as_number().unwrap();
        self.push(Value::Bool(op(a, b)));
        Ok(())
    }

    /// Human-readable rendering used by `OP_PRINT`.
    fn stringify(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Obj(handle) => self.heap.display(*handle),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::FunctionObj;

    fn build_function(vm: &mut Vm, build: impl FnOnce(&mut FunctionObj)) -> FunctionHandle {
        let mut function = FunctionObj::new(None);
        build(&mut function);
        vm.heap_mut().alloc_function(function)
    }

    #[test]
    fn empty_chunk_with_nil_return_interprets_ok() {
        let mut vm = Vm::new();
        let handle = build_function(&mut vm, |f| {
            f.chunk.write_op(OpCode::Nil, 1);
            f.chunk.write_op(OpCode::Return, 1);
        });
        assert!(matches!(vm.interpret_function(handle), InterpretResult::Ok));
    }

    #[test]
    fn arithmetic_respects_precedence() {
        // equivalent to: print 1 + 2 * 3;
        let mut vm = Vm::new();
        let handle = build_function(&mut vm, |f| {
            let one = f.chunk.add_constant(Value::Number(1.0)).unwrap();
            let two = f.chunk.add_constant(Value::Number(2.0)).unwrap();
            let three = f.chunk.add_constant(Value::Number(3.0)).unwrap();
            f.chunk.write_op(OpCode::Constant, 1);
            f.chunk.write_byte(one, 1);
            f.chunk.write_op(OpCode::Constant, 1);
            f.chunk.write_byte(two, 1);
            f.chunk.write_op(OpCode::Constant, 1);
            f.chunk.write_byte(three, 1);
            f.chunk.write_op(OpCode::Multiply, 1);
            f.chunk.write_op(OpCode::Add, 1);
            f.chunk.write_op(OpCode::Print, 1);
            f.chunk.write_op(OpCode::Nil, 1);
            f.chunk.write_op(OpCode::Return, 1);
        });
        assert!(matches!(vm.interpret_function(handle), InterpretResult::Ok));
    }

    #[test]
    fn reading_an_undefined_global_is_a_runtime_error_and_resets_stack() {
        let mut vm = Vm::new();
        let name = vm
            .heap_mut()
            .alloc_string(table::fnv1a_hash(b"missing"), "missing".into());
        let handle = build_function(&mut vm, |f| {
            let index = f
                .chunk
                .add_constant(Value::Obj(ObjHandle::String(name)))
                .unwrap();
            f.chunk.write_op(OpCode::GetGlobal, 1);
            f.chunk.write_byte(index, 1);
            f.chunk.write_op(OpCode::Return, 1);
        });
        assert!(matches!(
            vm.interpret_function(handle),
            InterpretResult::RuntimeError(_)
        ));
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    #[test]
    fn adding_a_number_to_a_string_is_a_type_error() {
        let mut vm = Vm::new();
        let s = vm.heap_mut().alloc_string(table::fnv1a_hash(b"x"), "x".into());
        let handle = build_function(&mut vm, |f| {
            let s_index = f.chunk.add_constant(Value::Obj(ObjHandle::String(s))).unwrap();
            let n_index = f.chunk.add_constant(Value::Number(1.0)).unwrap();
            f.chunk.write_op(OpCode::Constant, 1);
            f.chunk.write_byte(s_index, 1);
            f.chunk.write_op(OpCode::Constant, 1);
            f.chunk.write_byte(n_index, 1);
            f.chunk.write_op(OpCode::Add, 1);
            f.chunk.write_op(OpCode::Return, 1);
        });
        assert!(matches!(
            vm.interpret_function(handle),
            InterpretResult::RuntimeError(_)
        ));
    }

    #[test]
    fn calling_a_native_with_the_wrong_argument_count_is_a_runtime_error() {
        let mut vm = Vm::new();
        let clock_name = table::intern(vm.heap_mut(), vm.strings_mut(), "clock");
        let handle = build_function(&mut vm, |f| {
            let index = f
                .chunk
                .add_constant(Value::Obj(ObjHandle::String(clock_name)))
                .unwrap();
            let one = f.chunk.add_constant(Value::Number(1.0)).unwrap();
            f.chunk.write_op(OpCode::GetGlobal, 1);
            f.chunk.write_byte(index, 1);
            f.chunk.write_op(OpCode::Constant, 1);
            f.chunk.write_byte(one, 1);
            f.chunk.write_op(OpCode::Call, 1);
            f.chunk.write_byte(1, 1);
            f.chunk.write_op(OpCode::Return, 1);
        });
        assert!(matches!(
            vm.interpret_function(handle),
            InterpretResult::RuntimeError(_)
        ));
    }
}
