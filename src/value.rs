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

//! The tagged runtime value union (component C1).

use crate::object::{FunctionHandle, NativeHandle, ObjHandle, StringHandle};

/// Every value a running program can hold on the stack, in a local, or
/// in a global.
#[derive(Clone, Copy, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Obj(ObjHandle),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_obj(&self) -> bool {
        matches!(self, Value::Obj(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::Obj(ObjHandle::String(_)))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Obj(ObjHandle::Function(_)))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Value::Obj(ObjHandle::Native(_)))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<StringHandle> {
        match self {
            Value::Obj(ObjHandle::String(h)) => Some(*h),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionHandle> {
        match self {
            Value::Obj(ObjHandle::Function(h)) => Some(*h),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<NativeHandle> {
        match self {
            Value::Obj(ObjHandle::Native(h)) => Some(*h),
            _ => None,
        }
    }

    /// `nil` and `false` are falsey; everything else, including `0` and
    /// the empty string, is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }
}

/// Identity/structural equality used by `OP_EQUAL` and by the hash
/// table's probe-matching. `NaN` is not equal to itself, matching
/// IEEE-754 and the host language's own `==`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Obj(x), Value::Obj(y)) => x == y,
        _ => false,
    }
}

