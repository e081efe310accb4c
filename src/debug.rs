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

//! A read-only disassembler (component C10), used by the
//! `trace_execution` feature and available to embedders that want to
//! print a chunk for debugging. Shares `OpCode` with the compiler so
//! the two can never disagree about what a byte means.

use crate::chunk::{Chunk, OpCode};
use crate::object::Heap;
use crate::value::Value;

fn print_value(value: &Value, heap: &Heap) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Obj(handle) => heap.display(*handle),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{:<16} {:4}", name, slot);
    offset + 2
}

fn jump_instruction(name: &str, sign: i64, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = (hi << 8) | lo;
    let target = offset as i64 + 3 + sign * jump as i64;
    println!("{:<16} {:4} -> {}", name, offset, target);
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize, heap: &Heap) -> usize {
    let constant = chunk.code[offset + 1];
    println!(
        "{:<16} {:4} '{}'",
        name,
        constant,
        print_value(&chunk.constants[constant as usize], heap)
    );
    offset + 2
}

/// Disassembles every instruction in `chunk`, labeled `name`.
pub fn disassemble_chunk(chunk: &Chunk, name: &str, heap: &Heap) {
    println!("== start chunk: {} ==", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, heap);
    }
    println!("== end chunk: {} ==", name);
}

/// Disassembles the single instruction at `offset`, returning the
/// offset of the next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize, heap: &Heap) -> usize {
    print!("{:04} ", offset);
    let line = chunk.get_line(offset);
    if offset > 0 && line == chunk.get_line(offset - 1) {
        print!("   | ");
    } else {
        print!("{:4} ", line);
    }

    let instruction = chunk.code[offset];
    match OpCode::from_byte(instruction) {
        Some(OpCode::Constant) => constant_instruction("OP_CONSTANT", chunk, offset, heap),
        Some(OpCode::Nil) => simple_instruction("OP_NIL", offset),
        Some(OpCode::True) => simple_instruction("OP_TRUE", offset),
        Some(OpCode::False) => simple_instruction("OP_FALSE", offset),
        Some(OpCode::Pop) => simple_instruction("OP_POP", offset),
        Some(OpCode::PopN) => byte_instruction("OP_POPN", chunk, offset),
        Some(OpCode::GetLocal) => byte_instruction("OP_GET_LOCAL", chunk, offset),
        Some(OpCode::SetLocal) => byte_instruction("OP_SET_LOCAL", chunk, offset),
        Some(OpCode::DefineGlobal) => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset, heap),
        Some(OpCode::GetGlobal) => constant_instruction("OP_GET_GLOBAL", chunk, offset, heap),
        Some(OpCode::SetGlobal) => constant_instruction("OP_SET_GLOBAL", chunk, offset, heap),
        Some(OpCode::Equal) => simple_instruction("OP_EQUAL", offset),
        Some(OpCode::Greater) => simple_instruction("OP_GREATER", offset),
        Some(OpCode::Less) => simple_instruction("OP_LESS", offset),
        Some(OpCode::Add) => simple_instruction("OP_ADD", offset),
        Some(OpCode::Subtract) => simple_instruction("OP_SUBTRACT", offset),
        Some(OpCode::Multiply) => simple_instruction("OP_MULTIPLY", offset),
        Some(OpCode::Divide) => simple_instruction("OP_DIVIDE", offset),
        Some(OpCode::Not) => simple_instruction("OP_NOT", offset),
        Some(OpCode::Negate) => simple_instruction("OP_NEGATE", offset),
        Some(OpCode::Print) => simple_instruction("OP_PRINT", offset),
        Some(OpCode::Jump) => jump_instruction("OP_JUMP", 1, chunk, offset),
        Some(OpCode::JumpIfFalse) => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        Some(OpCode::Loop) => jump_instruction("OP_LOOP", -1, chunk, offset),
        Some(OpCode::Call) => byte_instruction("OP_CALL", chunk, offset),
        Some(OpCode::Return) => simple_instruction("OP_RETURN", offset),
        None => {
            println!("unknown opcode {}", instruction);
            offset + 1
        }
    }
}

/// Prints the operand stack, bottom to top, as `[ v1 ][ v2 ]...`.
/// Takes bare `Value`s rather than going through `Heap::display` for
/// objects, since callers under `trace_execution` want this to be as
/// cheap as possible and objects are rare on hot stack traces.
pub fn trace_stack(stack: &[Value]) {
    print!("          ");
    for value in stack {
        print!("[ {} ]", format!("{:?}", value));
    }
    println!();
}
