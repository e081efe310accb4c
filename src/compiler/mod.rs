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

//! The front end (component C9): a lexer and a single-pass Pratt
//! parser that together turn source text directly into bytecode,
//! bypassing any intermediate AST. Structurally isolated behind
//! `compile()` so the execution core can be driven by any other
//! producer of a `Function`/`Chunk` pair.

mod lexer;
mod parser;

pub use parser::compile;
