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

//! The object heap (component C2): allocation and linkage of
//! `Function`, `Native`, and `String` objects.
//!
//! The original design links every heap object into a process-wide
//! singly-linked list purely so a GC (or final teardown) can walk and
//! free everything exactly once. In Rust that ownership is expressed
//! directly: each object lives in one of three flat `Vec`s owned by
//! the `Heap`, addressed by a small `u32` handle, and is dropped for
//! free when the `Heap` itself is dropped (see Design Note D1).

use std::fmt;

use crate::chunk::Chunk;
use crate::native::NativeFn;

/// Index into `Heap::strings`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StringHandle(pub u32);

/// Index into `Heap::functions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub u32);

/// Index into `Heap::natives`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u32);

/// A `Value::Obj` payload: which kind of heap object, and which one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjHandle {
    String(StringHandle),
    Function(FunctionHandle),
    Native(NativeHandle),
}

/// An interned, immutable string. Two `StringObj`s with equal bytes
/// never coexist in a single `Heap` (see `Heap::intern`).
#[derive(Debug)]
pub struct StringObj {
    pub hash: u32,
    pub bytes: Box<str>,
}

impl StringObj {
    pub fn as_str(&self) -> &str {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A compiled function: its arity, its bytecode, and (for named
/// functions) the interned name used in stack traces. `name` is
/// `None` for the synthetic top-level script.
#[derive(Debug)]
pub struct FunctionObj {
    pub arity: u8,
    pub chunk: Chunk,
    pub name: Option<StringHandle>,
}

impl FunctionObj {
    pub fn new(name: Option<StringHandle>) -> Self {
        FunctionObj {
            arity: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

/// A host-provided function reachable from script code.
pub struct NativeObj {
    pub function: NativeFn,
    pub name: &'static str,
}

impl fmt::Debug for NativeObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObj").field("name", &self.name).finish()
    }
}

/// Owns every heap object ever allocated by a `Vm`. Objects are never
/// individually freed during execution (this VM has no garbage
/// collector, per the Non-goals); they are all released at once when
/// the `Heap` is dropped.
#[derive(Debug, Default)]
pub struct Heap {
    strings: Vec<StringObj>,
    functions: Vec<FunctionObj>,
    natives: Vec<NativeObj>,
}

impl Heap {
    pub fn new() -> Self {
        Heap::default()
    }

    pub fn alloc_string(&mut self, hash: u32, bytes: Box<str>) -> StringHandle {
        self.strings.push(StringObj { hash, bytes });
        StringHandle((self.strings.len() - 1) as u32)
    }

    pub fn alloc_function(&mut self, function: FunctionObj) -> FunctionHandle {
        self.functions.push(function);
        FunctionHandle((self.functions.len() - 1) as u32)
    }

    pub fn alloc_native(&mut self, function: NativeFn, name: &'static str) -> NativeHandle {
        self.natives.push(NativeObj { function, name });
        NativeHandle((self.natives.len() - 1) as u32)
    }

    pub fn string(&self, handle: StringHandle) -> &StringObj {
        &self.strings[handle.0 as usize]
    }

    pub fn function(&self, handle: FunctionHandle) -> &FunctionObj {
        &self.functions[handle.0 as usize]
    }

    pub fn function_mut(&mut self, handle: FunctionHandle) -> &mut FunctionObj {
        &mut self.functions[handle.0 as usize]
    }

    pub fn native(&self, handle: NativeHandle) -> &NativeObj {
        &self.natives[handle.0 as usize]
    }

    /// Human-readable rendering of any object, used by `OP_PRINT` and
    /// by the disassembler's constant dump.
    pub fn display(&self, handle: ObjHandle) -> String {
        match handle {
            ObjHandle::String(h) => self.string(h).as_str().to_string(),
            ObjHandle::Function(h) => match self.function(h).name {
                Some(name) => format!("<fn {}>", self.string(name).as_str()),
                None => "<script>".to_string(),
            },
            ObjHandle::Native(h) => format!("<native fn {}>", self.native(h).name),
        }
    }
}
