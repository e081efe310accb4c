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

//! A single-pass Pratt parser (component C9, back half), compiling
//! directly to bytecode with no intermediate AST. One `FunctionScope`
//! per nested `fun` body; since the language has no closures, each
//! scope can only ever see its own locals (reserved slot 0 for the
//! callee itself, per `Vm::call`'s `slot_base` convention) plus
//! globals.

use crate::chunk::{Chunk, OpCode};
use crate::error::CompileError;
use crate::object::{FunctionHandle, FunctionObj, Heap};
use crate::table::{self, ValueTable};
use crate::value::Value;

use super::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

struct Local<'src> {
    name: &'src str,
    /// `-1` marks a local whose initializer has not finished
    /// executing yet (so `var a = a;` can be rejected).
    depth: i32,
}

struct FunctionScope<'src> {
    function: FunctionObj,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
}

impl<'src> FunctionScope<'src> {
    fn new(name: Option<crate::object::StringHandle>) -> Self {
        FunctionScope {
            function: FunctionObj::new(name),
            // Slot 0 always holds the callee itself, matching
            // `Vm::call`'s `slot_base` pointing at the function value
            // rather than its first argument.
            locals: vec![Local { name: "", depth: 0 }],
            scope_depth: 0,
        }
    }
}

pub struct Parser<'a, 'src> {
    heap: &'a mut Heap,
    strings: &'a mut ValueTable,
    lexer: Lexer<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    scopes: Vec<FunctionScope<'src>>,
}

type ParseFn<'a, 'src> = fn(&mut Parser<'a, 'src>, bool);

struct ParseRule<'a, 'src> {
    prefix: Option<ParseFn<'a, 'src>>,
    infix: Option<ParseFn<'a, 'src>>,
    precedence: Precedence,
}

fn rule<'a, 'src>(
    prefix: Option<ParseFn<'a, 'src>>,
    infix: Option<ParseFn<'a, 'src>>,
    precedence: Precedence,
) -> ParseRule<'a, 'src> {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

fn get_rule<'a, 'src>(kind: TokenKind) -> ParseRule<'a, 'src> {
    use Precedence::*;
    use TokenKind::*;
    match kind {
        LeftParen => rule(Some(Parser::grouping), Some(Parser::call), Call),
        Minus => rule(Some(Parser::unary), Some(Parser::binary), Term),
        Plus => rule(None, Some(Parser::binary), Term),
        Slash => rule(None, Some(Parser::binary), Factor),
        Star => rule(None, Some(Parser::binary), Factor),
        Bang => rule(Some(Parser::unary), None, None),
        BangEqual => rule(None, Some(Parser::binary), Equality),
        EqualEqual => rule(None, Some(Parser::binary), Equality),
        Greater => rule(None, Some(Parser::binary), Comparison),
        GreaterEqual => rule(None, Some(Parser::binary), Comparison),
        Less => rule(None, Some(Parser::binary), Comparison),
        LessEqual => rule(None, Some(Parser::binary), Comparison),
        Identifier => rule(Some(Parser::variable), None, None),
        String => rule(Some(Parser::string), None, None),
        Number => rule(Some(Parser::number), None, None),
        And => rule(None, Some(Parser::and), Precedence::And),
        Or => rule(None, Some(Parser::or), Precedence::Or),
        False | True | Nil => rule(Some(Parser::literal), None, None),
        _ => rule(None, None, None),
    }
}

impl<'a, 'src> Parser<'a, 'src> {
    fn new(heap: &'a mut Heap, strings: &'a mut ValueTable, source: &'src str) -> Self {
        let dummy = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 0,
        };
        Parser {
            heap,
            strings,
            lexer: Lexer::new(source),
            previous: dummy,
            current: dummy,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            scopes: vec![FunctionScope::new(None)],
        }
    }

    // --- token stream -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    // --- error reporting / recovery ----------------------------------

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let where_ = if token.kind == TokenKind::Eof {
            "at end".to_string()
        } else if token.kind == TokenKind::Error {
            String::new()
        } else {
            format!("at '{}'", token.lexeme)
        };
        let full = if where_.is_empty() {
            message.to_string()
        } else {
            format!("{}: {}", where_, message)
        };
        self.errors.push(CompileError {
            line: token.line,
            message: full,
        });
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            match self.current.kind {
                Fun | Var | For | If | While | Print | Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // --- bytecode emission -------------------------------------------

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.scopes.last_mut().unwrap().function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.current_chunk().write_op(op, line);
    }

    fn emit_constant(&mut self, value: Value) {
        match self.current_chunk().add_constant(value) {
            Ok(index) => {
                self.emit_op(OpCode::Constant);
                self.emit_byte(index);
            }
            Err(_) => self.error("Too many constants in one chunk."),
        }
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.previous.line;
        self.current_chunk().emit_jump(op, line)
    }

    fn patch_jump(&mut self, offset: usize) {
        if self.current_chunk().patch_jump(offset).is_err() {
            self.error("Too much code to jump over.");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        if self.current_chunk().emit_loop(loop_start, line).is_err() {
            self.error("Loop body too large.");
        }
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let handle = table::intern(self.heap, self.strings, name);
        match self
            .current_chunk()
            .add_constant(Value::Obj(crate::object::ObjHandle::String(handle)))
        {
            Ok(index) => index,
            Err(_) => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    // --- scopes / locals ----------------------------------------------

    fn begin_scope(&mut self) {
        self.scopes.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let scope = self.scopes.last_mut().unwrap();
        scope.scope_depth -= 1;
        let depth = scope.scope_depth;
        let mut popped = 0u8;
        while let Some(local) = scope.locals.last() {
            if local.depth <= depth {
                break;
            }
            scope.locals.pop();
            popped += 1;
        }
        if popped == 1 {
            self.emit_op(OpCode::Pop);
        } else if popped > 1 {
            self.emit_op(OpCode::PopN);
            self.emit_byte(popped);
        }
    }

    fn add_local(&mut self, name: &'src str) {
        let too_many = self.scopes.last().unwrap().locals.len() >= 256;
        if too_many {
            self.error("Too many local variables in function.");
            return;
        }
        self.scopes
            .last_mut()
            .unwrap()
            .locals
            .push(Local { name, depth: -1 });
    }

    fn declare_variable(&mut self) {
        let depth = self.scopes.last().unwrap().scope_depth;
        if depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let mut duplicate = false;
        {
            let scope = self.scopes.last().unwrap();
            for local in scope.locals.iter().rev() {
                if local.depth != -1 && local.depth < depth {
                    break;
                }
                if local.name == name {
                    duplicate = true;
                    break;
                }
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.scopes.last().unwrap().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn mark_initialized(&mut self) {
        let scope = self.scopes.last_mut().unwrap();
        if scope.scope_depth == 0 {
            return;
        }
        let depth = scope.scope_depth;
        scope.locals.last_mut().unwrap().depth = depth;
    }

    fn define_variable(&mut self, global: u8) {
        if self.scopes.last().unwrap().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let mut found: Option<(u8, i32)> = None;
        {
            let scope = self.scopes.last().unwrap();
            for (index, local) in scope.locals.iter().enumerate().rev() {
                if local.name == name {
                    found = Some((index as u8, local.depth));
                    break;
                }
            }
        }
        let (index, depth) = found?;
        if depth == -1 {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(index)
    }

    // --- expressions ----------------------------------------------------

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = get_rule(self.previous.kind).prefix;
        let prefix = match prefix {
            Some(f) => f,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix = get_rule(self.previous.kind).infix.unwrap();
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(0.0);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let contents = &lexeme[1..lexeme.len() - 1];
        let handle = table::intern(self.heap, self.strings, contents);
        self.emit_constant(Value::Obj(crate::object::ObjHandle::String(handle)));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => unreachable!("literal() only called for false/true/nil"),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let kind = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match kind {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!("unary() only called for -/!"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let kind = self.previous.kind;
        let rule = get_rule(kind);
        self.parse_precedence(rule.precedence.next());
        match kind {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!("binary() only called for binary operators"),
        }
    }

    fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        let local_slot = self.resolve_local(name);
        let (get_op, set_op, arg) = match local_slot {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let constant = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, constant)
            }
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(set_op);
            self.emit_byte(arg);
        } else {
            self.emit_op(get_op);
            self.emit_byte(arg);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u32 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn call(&mut self, _can_assign: bool) {
        let argc = self.argument_list();
        self.emit_op(OpCode::Call);
        self.emit_byte(argc);
    }

    // --- statements -------------------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function();
        self.define_variable(global);
    }

    fn function(&mut self) {
        let name_lexeme = self.previous.lexeme;
        let name_handle = table::intern(self.heap, self.strings, name_lexeme);
        self.scopes.push(FunctionScope::new(Some(name_handle)));

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.scopes.last_mut().unwrap().function.arity += 1;
                let too_many_params = self.scopes.last().unwrap().function.arity > 255;
                if too_many_params {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let param = self.parse_variable("Expect parameter name.");
                self.define_variable(param);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);

        let scope = self.scopes.pop().unwrap();
        let handle = self.heap.alloc_function(scope.function);
        self.emit_function_constant(handle);
    }

    fn emit_function_constant(&mut self, handle: FunctionHandle) {
        self.emit_constant(Value::Obj(crate::object::ObjHandle::Function(handle)));
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.match_token(TokenKind::Semicolon) {
            self.emit_op(OpCode::Nil);
            self.emit_op(OpCode::Return);
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // no initializer
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }
}

/// Compiles `source` into a top-level `Function`, or the accumulated
/// front-end errors if any statement failed to parse. String and
/// identifier constants are interned into `heap`/`strings` as they are
/// encountered, so the compiled chunk's constant pool only ever holds
/// canonical handles.
pub fn compile(
    heap: &mut Heap,
    strings: &mut ValueTable,
    source: &str,
) -> Result<FunctionHandle, Vec<CompileError>> {
    let mut parser = Parser::new(heap, strings, source);
    parser.advance();
    while !parser.match_token(TokenKind::Eof) {
        parser.declaration();
    }
    parser.emit_op(OpCode::Nil);
    parser.emit_op(OpCode::Return);

    if parser.had_error {
        return Err(parser.errors);
    }
    let scope = parser.scopes.pop().unwrap();
    Ok(parser.heap.alloc_function(scope.function))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Vm;

    #[test]
    fn compiles_a_simple_program() {
        let mut vm = Vm::new();
        let result = vm.interpret("print 1 + 2 * 3;");
        assert!(matches!(result, crate::error::InterpretResult::Ok));
    }

    #[test]
    fn reports_an_unterminated_string_as_a_compile_error() {
        let mut heap = Heap::new();
        let mut strings = ValueTable::new();
        let result = compile(&mut heap, &mut strings, "print \"abc;");
        assert!(result.is_err());
    }

    #[test]
    fn reports_multiple_errors_via_panic_mode_synchronization() {
        let mut heap = Heap::new();
        let mut strings = ValueTable::new();
        let result = compile(&mut heap, &mut strings, "print ; print ;");
        match result {
            Err(errors) => assert!(errors.len() >= 2),
            Ok(_) => panic!("expected compile errors"),
        }
    }

    #[test]
    fn functions_and_locals_compile_and_run() {
        let mut vm = Vm::new();
        let result = vm.interpret("fun f(x) { return x * x; } print f(5);");
        assert!(matches!(result, crate::error::InterpretResult::Ok));
    }
}
