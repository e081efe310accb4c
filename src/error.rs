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

//! Runtime and compile error reporting (component C8).

use std::fmt;

/// One line of the textual backtrace: `[line L] in NAME()` or
/// `[line L] in script`.
#[derive(Debug, Clone)]
pub struct BacktraceFrame {
    pub line: u32,
    /// `None` for the synthetic top-level script frame.
    pub function_name: Option<String>,
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function_name {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// The distinct ways the dispatch loop can fail, per §7. Each variant
/// carries exactly the data its message needs.
#[derive(Debug, Clone)]
pub enum RuntimeErrorKind {
    /// Generic operand-type mismatch, e.g. "Operands must be numbers."
    TypeError(String),
    Arity {
        expected: u8,
        got: u8,
        function_name: String,
    },
    UndefinedVariable(String),
    StackOverflow,
    NotCallable,
    NativeArgc {
        native_name: String,
    },
    NativeArgv {
        native_name: String,
    },
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeErrorKind::TypeError(message) => write!(f, "{}", message),
            RuntimeErrorKind::Arity {
                expected,
                got,
                function_name,
            } => write!(
                f,
                "Expected {} arguments, got {}, for function '{}'.",
                expected, got, function_name
            ),
            RuntimeErrorKind::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{}'.", name)
            }
            RuntimeErrorKind::StackOverflow => write!(f, "Stack overflow."),
            RuntimeErrorKind::NotCallable => {
                write!(f, "Can only call functions and classes")
            }
            RuntimeErrorKind::NativeArgc { native_name } => write!(
                f,
                "Invalid argument count for native function '{}'.",
                native_name
            ),
            RuntimeErrorKind::NativeArgv { native_name } => write!(
                f,
                "Invalid argument type for native function '{}'.",
                native_name
            ),
        }
    }
}

/// A runtime error together with the backtrace over every frame that
/// was active when it was raised, innermost first.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub backtrace: Vec<BacktraceFrame>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, backtrace: Vec<BacktraceFrame>) -> Self {
        RuntimeError { kind, backtrace }
    }

    /// Writes the message followed by the backtrace to stderr, one
    /// frame per line, innermost first — matching §6's "Runtime error
    /// output" contract exactly.
    pub fn emit(&self) {
        eprintln!("{}", self.kind);
        for frame in &self.backtrace {
            eprintln!("{}", frame);
        }
    }
}

/// One error from the front end, with the source line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error: {}", self.line, self.message)
    }
}

/// The three-way result of `Vm::interpret`, matching §6.
#[derive(Debug)]
pub enum InterpretResult {
    Ok,
    CompileError(Vec<CompileError>),
    RuntimeError(RuntimeError),
}

impl InterpretResult {
    /// The conventional *nix exit code for this result, per §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            InterpretResult::Ok => 0,
            InterpretResult::CompileError(_) => 65,
            InterpretResult::RuntimeError(_) => 70,
        }
    }
}
