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

//! The native-function registry (component C7).

use std::time::Instant;

use crate::object::{Heap, ObjHandle, StringHandle};
use crate::table::{self, ValueTable};
use crate::value::Value;

lazy_static! {
    static ref PROCESS_START: Instant = Instant::now();
}

/// What a native function hands back to `call_value`. The two error
/// arms are the idiomatic replacement for the original's reserved
/// `ErrorArgc`/`ErrorArgv` sentinel `Value`s (Design Note D3): they
/// can never leak onto the operand stack because they are not a
/// `Value` at all.
pub enum NativeResult {
    Value(Value),
    ErrorArgc,
    ErrorArgv,
}

impl From<Value> for NativeResult {
    fn from(value: Value) -> Self {
        NativeResult::Value(value)
    }
}

/// Everything a native function needs besides its arguments: the heap
/// (to allocate) and the intern table (so any string it manufactures
/// stays canonical, preserving invariant 2 of the data model).
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    pub strings: &'a mut ValueTable,
}

impl<'a> NativeContext<'a> {
    pub fn intern(&mut self, s: &str) -> StringHandle {
        table::intern(self.heap, self.strings, s)
    }
}

/// `argv` is exactly `argc` values long; natives never see the callee
/// slot.
pub type NativeFn = fn(ctx: &mut NativeContext, argc: u32, argv: &[Value]) -> NativeResult;

pub fn clock(_ctx: &mut NativeContext, argc: u32, _argv: &[Value]) -> NativeResult {
    if argc != 0 {
        return NativeResult::ErrorArgc;
    }
    NativeResult::Value(Value::Number(PROCESS_START.elapsed().as_secs_f64()))
}

pub fn triple(_ctx: &mut NativeContext, argc: u32, argv: &[Value]) -> NativeResult {
    if argc != 1 {
        return NativeResult::ErrorArgc;
    }
    match argv[0].as_number() {
        Some(n) => NativeResult::Value(Value::Number(n * 3.0)),
        None => NativeResult::ErrorArgv,
    }
}

/// Prints its single string argument without the trailing-value
/// semantics `OP_PRINT` has (it leaves nothing but `Nil` behind),
/// useful to embedders that want a callable alternative to the
/// `print` statement.
pub fn print_line(ctx: &mut NativeContext, argc: u32, argv: &[Value]) -> NativeResult {
    if argc != 1 {
        return NativeResult::ErrorArgc;
    }
    match argv[0].as_string() {
        Some(handle) => {
            println!("{}", ctx.heap.string(handle).as_str());
            NativeResult::Value(Value::Nil)
        }
        None => NativeResult::ErrorArgv,
    }
}

/// Names the dynamic type of its argument, grounded in the original's
/// `printObject`/`AS_CSTRING` family of per-`ObjType` dispatch.
pub fn type_name(ctx: &mut NativeContext, argc: u32, argv: &[Value]) -> NativeResult {
    if argc != 1 {
        return NativeResult::ErrorArgc;
    }
    let name = match &argv[0] {
        Value::Nil => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::Obj(handle) => match handle {
            ObjHandle::String(_) => "string",
            ObjHandle::Function(_) => "function",
            ObjHandle::Native(_) => "native",
        },
    };
    let handle = ctx.intern(name);
    NativeResult::Value(Value::Obj(ObjHandle::String(handle)))
}
