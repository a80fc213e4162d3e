//! The single-pass Pratt compiler: tokens in, a top-level `ObjFunction`
//! out. One recursive-descent/precedence-climbing pass with no separate
//! AST stage, handling slot-indexed globals, `const` bindings, and
//! per-iteration `for`-loop variable capture along the way.

use fax_gc::{Heap, Obj, ObjFunction, ObjKind, OpCode, RootProvider, Value};
use fax_lex::{Scanner, Token, TokenKind};
use fax_util::FaxError;

use crate::class_context::ClassContext;
use crate::context::{CompilationContext, FunctionKind, LocalName, VarState};
use crate::globals::GlobalsTable;
use crate::rules::{get_rule, Precedence};

/// Where a name resolved to, and the state (uninitialized/const/mutable)
/// of whatever it resolved to. Shared by plain identifier lookups, `this`,
/// and `super`, so the local/upvalue/global fallback chain is written once.
enum ResolvedVar {
    Local(u8, VarState),
    Upvalue(u8, VarState),
    Global(u8, VarState),
}

/// A view onto just the fields `Heap::alloc_obj`/`copy_string` need to mark
/// while compilation is still in progress: every context's constant pool
/// and function name, plus the interned global names. Built fresh at each
/// call site from `&self.contexts`/`&self.globals` directly (never through
/// a `&self`-taking helper) so the borrow checker sees it's disjoint from
/// the `&mut self.heap` borrow the allocation itself needs.
struct CompilerRoots<'b> {
    contexts: &'b [CompilationContext],
    globals: &'b GlobalsTable,
}

impl RootProvider for CompilerRoots<'_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for ctx in self.contexts {
            if let Some(name) = ctx.function_name {
                heap.mark_object(name);
            }
            for constant in &ctx.chunk.constants {
                heap.mark_value(*constant);
            }
        }
        self.globals.mark_roots(heap);
    }
}

pub struct Compiler<'a> {
    source: &'a [u8],
    scanner: Scanner<'a>,
    heap: &'a mut Heap,
    globals: &'a mut GlobalsTable,
    current: Token,
    previous: Token,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<String>,
    contexts: Vec<CompilationContext>,
    classes: Vec<ClassContext>,
}

/// Compiles `source` to a top-level `ObjFunction`, or collects every
/// compile error found (the compiler keeps going after an error rather
/// than stopping at the first one). `globals` is expected to outlive a
/// single source string in the REPL: slots assigned on one line stay
/// valid on the next.
pub fn compile(
    source: &[u8],
    heap: &mut Heap,
    globals: &mut GlobalsTable,
) -> Result<*mut Obj, FaxError> {
    let eof_marker = Token {
        kind: TokenKind::Error,
        span: fax_util::Span::new(0, 0, 1),
    };
    let mut compiler = Compiler {
        source,
        scanner: Scanner::new(source),
        heap,
        globals,
        current: eof_marker,
        previous: eof_marker,
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        contexts: vec![CompilationContext::new(FunctionKind::Script, None)],
        classes: Vec::new(),
    };

    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    let function_ptr = compiler.end_function();

    if compiler.had_error {
        Err(FaxError::compile(compiler.errors))
    } else {
        Ok(function_ptr)
    }
}

impl<'a> Compiler<'a> {
    // ---- parser driver -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.scanner.error_message().to_string();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
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

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let mut text = format!("[line {}] Error", token.line());
        match token.kind {
            TokenKind::Eof => text.push_str(" at end"),
            TokenKind::Error => {}
            _ => {
                let lexeme = String::from_utf8_lossy(token.lexeme(self.source));
                text.push_str(&format!(" at '{lexeme}'"));
            }
        }
        text.push_str(&format!(": {message}"));
        self.errors.push(text);
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ---- bytecode emission --------------------------------------------

    fn current_chunk(&mut self) -> &mut fax_gc::Chunk {
        &mut self.contexts.last_mut().unwrap().chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line();
        self.current_chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        if let Err(message) = self.current_chunk().patch_jump(offset) {
            self.error(message);
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk().code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    /// The implicit return every function body falls through to:
    /// initializers return `this`, everything else returns `nil`.
    fn emit_return(&mut self) {
        if self.contexts.last().unwrap().kind == FunctionKind::Initializer {
            self.emit_bytes(OpCode::GetLocal as u8, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_chunk().add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_bytes(OpCode::Constant as u8, index);
    }

    // ---- heap interaction ----------------------------------------------

    fn intern(&mut self, bytes: &[u8]) -> *mut Obj {
        let roots = CompilerRoots {
            contexts: &self.contexts,
            globals: self.globals,
        };
        self.heap.copy_string(bytes, &[&roots])
    }

    fn identifier_constant(&mut self, name: Token) -> u8 {
        let ptr = self.intern(name.lexeme(self.source));
        self.make_constant(Value::Obj(ptr))
    }

    // ---- name resolution -----------------------------------------------

    fn resolve_name(&mut self, name: &[u8]) -> ResolvedVar {
        let top = self.contexts.len() - 1;
        if let Some((slot, state)) = self.contexts[top].resolve_local(name, self.source) {
            return ResolvedVar::Local(slot as u8, state);
        }
        if let Some((slot, state)) = self.resolve_upvalue(top, name) {
            return ResolvedVar::Upvalue(slot, state);
        }
        let ptr = self.intern(name);
        let slot = match self.globals.slot_for(ptr) {
            Ok(slot) => slot,
            Err(message) => {
                self.error(message);
                0
            }
        };
        let state = self.globals.state(slot);
        ResolvedVar::Global(slot, state)
    }

    /// Resolves `name` as an upvalue of `self.contexts[level]`, capturing
    /// it through every enclosing function along the way.
    fn resolve_upvalue(&mut self, level: usize, name: &[u8]) -> Option<(u8, VarState)> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;
        if let Some((local_slot, state)) = self.contexts[enclosing].resolve_local(name, self.source) {
            self.contexts[enclosing].locals[local_slot].is_captured = true;
            return match self.contexts[level].add_upvalue(local_slot as u8, true) {
                Some(index) => Some((index, state)),
                None => {
                    self.error("Too many closure variables in function.");
                    None
                }
            };
        }
        if let Some((up_slot, state)) = self.resolve_upvalue(enclosing, name) {
            return match self.contexts[level].add_upvalue(up_slot, false) {
                Some(index) => Some((index, state)),
                None => {
                    self.error("Too many closure variables in function.");
                    None
                }
            };
        }
        None
    }

    /// Resolves `name` and either emits the matching `GET_*`, or (when
    /// `can_assign` and an `=` follows) the matching `SET_*`.
    fn resolve_and_emit(&mut self, name: &[u8], can_assign: bool) {
        let resolved = self.resolve_name(name);
        if let ResolvedVar::Local(_, VarState::Uninitialized) = resolved {
            self.error("Can't read local variable in its own initializer.");
        }
        let (get_op, set_op, slot, state) = match resolved {
            ResolvedVar::Local(slot, state) => (OpCode::GetLocal, OpCode::SetLocal, slot, state),
            ResolvedVar::Upvalue(slot, state) => (OpCode::GetUpvalue, OpCode::SetUpvalue, slot, state),
            ResolvedVar::Global(slot, state) => (OpCode::GetGlobal, OpCode::SetGlobal, slot, state),
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            if state == VarState::Readable {
                self.error("Writing to const variable.");
            }
            self.expression();
            self.emit_bytes(set_op as u8, slot);
        } else {
            self.emit_bytes(get_op as u8, slot);
        }
    }

    fn named_variable(&mut self, name: Token, can_assign: bool) {
        self.resolve_and_emit(name.lexeme(self.source), can_assign);
    }

    // ---- scopes and locals ----------------------------------------------

    fn begin_scope(&mut self) {
        self.contexts.last_mut().unwrap().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let line = self.previous.line();
        let ctx = self.contexts.last_mut().unwrap();
        ctx.scope_depth -= 1;
        let depth = ctx.scope_depth;
        while let Some(local) = ctx.locals.last() {
            if local.depth <= depth {
                break;
            }
            let local = ctx.locals.pop().unwrap();
            if local.is_captured {
                ctx.chunk.write_op(OpCode::CloseUpvalue, line);
            } else {
                ctx.chunk.write_op(OpCode::Pop, line);
            }
        }
    }

    fn declare_variable(&mut self, name: Token) {
        let scope_depth = self.contexts.last().unwrap().scope_depth;
        if scope_depth == 0 {
            return;
        }
        let name_bytes = name.lexeme(self.source);
        let mut duplicate = false;
        {
            let ctx = self.contexts.last().unwrap();
            for local in ctx.locals.iter().rev() {
                if local.depth < scope_depth {
                    break;
                }
                if local.name.bytes(self.source) == name_bytes {
                    duplicate = true;
                    break;
                }
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        let ctx = self.contexts.last_mut().unwrap();
        if ctx.locals.len() >= crate::context::LOCALS_MAX {
            self.error("Too many local variables in function.");
            return;
        }
        let ctx = self.contexts.last_mut().unwrap();
        ctx.locals.push(crate::context::Local {
            name: LocalName::Source(name),
            depth: scope_depth,
            is_captured: false,
            state: VarState::Uninitialized,
        });
    }

    /// Parses a name, declares it as a local (if inside a scope) or
    /// reserves its global slot, and returns `Some(slot)` for globals.
    /// `define_variable` needs the slot to emit `DEFINE_GLOBAL`, but has
    /// nothing to do for locals until the initializer finishes.
    fn parse_variable(&mut self, error_message: &str) -> Option<u8> {
        self.consume(TokenKind::Identifier, error_message);
        let name = self.previous;
        self.declare_variable(name);
        if self.contexts.last().unwrap().scope_depth > 0 {
            return None;
        }
        let ptr = self.intern(name.lexeme(self.source));
        match self.globals.slot_for(ptr) {
            Ok(slot) => Some(slot),
            Err(message) => {
                self.error(message);
                Some(0)
            }
        }
    }

    /// Finalizes the most recently declared variable's const/mutable
    /// state: for a global, also emits `DEFINE_GLOBAL`; for a local,
    /// there's no bytecode, since the value is already sitting in its
    /// slot.
    fn define_variable(&mut self, global: Option<u8>, is_const: bool) {
        match global {
            Some(slot) => {
                self.globals.define(slot, is_const);
                self.emit_bytes(OpCode::DefineGlobal as u8, slot);
            }
            None => {
                let ctx = self.contexts.last_mut().unwrap();
                let idx = ctx.locals.len() - 1;
                ctx.locals[idx].state = if is_const {
                    VarState::Readable
                } else {
                    VarState::Writeable
                };
            }
        }
    }

    /// Marks the most recently declared local readable before its
    /// initializer is compiled, used only by `fun_declaration` so a
    /// function can call itself by name from inside its own body. No-op
    /// at global scope: global recursion needs no compile-time marking.
    fn mark_initialized(&mut self) {
        let ctx = self.contexts.last_mut().unwrap();
        if ctx.scope_depth == 0 {
            return;
        }
        let idx = ctx.locals.len() - 1;
        ctx.locals[idx].state = VarState::Writeable;
    }

    // ---- expressions -----------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix_rule = get_rule(self.previous.kind).prefix;
        let prefix_rule = match prefix_rule {
            Some(rule) => rule,
            None => {
                self.error("Expect expression.");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix_rule = get_rule(self.previous.kind).infix.unwrap();
            infix_rule(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    pub(crate) fn number(&mut self, _can_assign: bool) {
        let text = self.previous.lexeme(self.source);
        let value: f64 = std::str::from_utf8(text)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        self.emit_constant(Value::Number(value));
    }

    pub(crate) fn string(&mut self, _can_assign: bool) {
        let full = self.previous.lexeme(self.source);
        let inner = &full[1..full.len() - 1];
        let ptr = self.intern(inner);
        self.emit_constant(Value::Obj(ptr));
    }

    pub(crate) fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal() dispatched from a non-literal rule"),
        }
    }

    pub(crate) fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    pub(crate) fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary() dispatched from a non-unary rule"),
        }
    }

    pub(crate) fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = get_rule(operator);
        self.parse_precedence(rule.precedence.next());
        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
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
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => unreachable!("binary() dispatched from a non-binary rule"),
        }
    }

    pub(crate) fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    pub(crate) fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    pub(crate) fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    pub(crate) fn this(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.resolve_and_emit(b"this", false);
    }

    pub(crate) fn super_(&mut self, _can_assign: bool) {
        if self.classes.is_empty() {
            self.error("Can't use 'super' outside of a class.");
        } else if !self.classes.last().unwrap().has_superclass {
            self.error("Can't use 'super' in a class with no superclass.");
        }
        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name_const = self.identifier_constant(self.previous);

        self.resolve_and_emit(b"this", false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.resolve_and_emit(b"super", false);
            self.emit_bytes(OpCode::SuperInvoke as u8, name_const);
            self.emit_byte(arg_count);
        } else {
            self.resolve_and_emit(b"super", false);
            self.emit_bytes(OpCode::GetSuper as u8, name_const);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
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

    pub(crate) fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_bytes(OpCode::Call as u8, arg_count);
    }

    pub(crate) fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name_const = self.identifier_constant(self.previous);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(OpCode::SetProperty as u8, name_const);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_bytes(OpCode::Invoke as u8, name_const);
            self.emit_byte(arg_count);
        } else {
            self.emit_bytes(OpCode::GetProperty as u8, name_const);
        }
    }

    // ---- functions ---------------------------------------------------

    /// Compiles one function's `(params) { body }`, pushing a fresh
    /// `CompilationContext` and popping it back via `end_function` when
    /// the closing brace is reached.
    fn function(&mut self, kind: FunctionKind, name: Option<Token>) {
        let function_name_ptr = name.map(|tok| self.intern(tok.lexeme(self.source)));
        self.contexts.push(CompilationContext::new(kind, function_name_ptr));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let arity = {
                    let ctx = self.contexts.last_mut().unwrap();
                    ctx.arity += 1;
                    ctx.arity
                };
                if arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let global = self.parse_variable("Expect parameter name.");
                self.define_variable(global, false);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();
        self.end_function();
    }

    /// Finishes the innermost context: emits the implicit return, wraps
    /// its chunk in an `ObjFunction`, and (unless this was the top-level
    /// script) emits `CLOSURE` plus its upvalue descriptors into the
    /// now-current enclosing chunk.
    fn end_function(&mut self) -> *mut Obj {
        self.emit_return();
        let ctx = self.contexts.pop().expect("end_function with no active context");
        let upvalue_count = ctx.upvalues.len() as u8;
        let kind = ObjKind::Function(ObjFunction {
            arity: ctx.arity,
            upvalue_count,
            name: ctx.function_name,
            chunk: ctx.chunk,
        });
        let function_ptr = {
            let roots = CompilerRoots {
                contexts: &self.contexts,
                globals: self.globals,
            };
            self.heap.alloc_obj(kind, &[&roots])
        };

        if !self.contexts.is_empty() {
            let line = self.previous.line();
            match self.current_chunk().add_constant(Value::Obj(function_ptr)) {
                Some(index) => {
                    self.emit_bytes(OpCode::Closure as u8, index);
                    for upvalue in &ctx.upvalues {
                        self.current_chunk().write(upvalue.is_local as u8, line);
                        self.current_chunk().write(upvalue.index, line);
                    }
                }
                None => self.error("Too many constants in one chunk."),
            }
        }
        function_ptr
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        let name = self.previous;
        self.function(FunctionKind::Function, Some(name));
        self.define_variable(global, false);
    }

    // ---- classes -----------------------------------------------------

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let name = self.previous;
        let name_const = self.identifier_constant(name);
        let kind = if name.lexeme(self.source) == b"init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind, Some(name));
        self.emit_bytes(OpCode::Method as u8, name_const);
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_const = self.identifier_constant(class_name);
        self.declare_variable(class_name);
        self.emit_bytes(OpCode::Class as u8, name_const);
        let global = if self.contexts.last().unwrap().scope_depth > 0 {
            None
        } else {
            let ptr = self.intern(class_name.lexeme(self.source));
            match self.globals.slot_for(ptr) {
                Ok(slot) => Some(slot),
                Err(message) => {
                    self.error(message);
                    Some(0)
                }
            }
        };
        self.define_variable(global, false);

        self.classes.push(ClassContext { has_superclass: false });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            let superclass_name = self.previous;
            self.variable(false);
            if superclass_name.lexeme(self.source) == class_name.lexeme(self.source) {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.contexts.last_mut().unwrap().declare_synthetic_local("super");
            self.named_variable(class_name, false);
            self.emit_op(OpCode::Inherit);
            self.classes.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if self.classes.last().unwrap().has_superclass {
            self.end_scope();
        }
        self.classes.pop();
    }

    // ---- statements ----------------------------------------------------

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expr_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
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

    /// Parses a `for`-loop's `var`/`const NAME = init;` clause, returning
    /// the name token and the slot it landed in (always a local, since
    /// the enclosing scope was already opened by `for_statement`).
    fn for_loop_variable(&mut self, is_const: bool) -> (Token, u8) {
        self.consume(TokenKind::Identifier, "Expect loop variable name.");
        let name = self.previous;
        self.declare_variable(name);
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            if is_const {
                self.error("Const declaration requires an initializer.");
            }
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after loop variable.");
        self.define_variable(None, is_const);
        let outer_slot = (self.contexts.last().unwrap().locals.len() - 1) as u8;
        (name, outer_slot)
    }

    /// A `for` loop whose header declares its own variable gets a fresh
    /// copy of it opened in its own scope before each run of the body, so
    /// a closure the body creates captures that iteration's value rather
    /// than the one shared slot every iteration would otherwise write
    /// through. The body runs wrapped in an extra scope that shadows the
    /// loop variable and writes it back to the outer slot afterward.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        let mut loop_var: Option<(Token, u8, bool)> = None;
        if self.match_token(TokenKind::Semicolon) {
            // no initializer clause
        } else if self.match_token(TokenKind::Var) {
            let (name, slot) = self.for_loop_variable(false);
            loop_var = Some((name, slot, false));
        } else if self.match_token(TokenKind::Const) {
            let (name, slot) = self.for_loop_variable(true);
            loop_var = Some((name, slot, true));
        } else {
            self.expr_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.check(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        } else {
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");
        }

        if let Some((name, outer_slot, is_const)) = loop_var {
            self.begin_scope();
            self.emit_bytes(OpCode::GetLocal as u8, outer_slot);
            self.contexts
                .last_mut()
                .unwrap()
                .push_initialized_local(LocalName::Source(name), is_const);
            let inner_slot = (self.contexts.last().unwrap().locals.len() - 1) as u8;

            self.statement();

            self.emit_bytes(OpCode::GetLocal as u8, inner_slot);
            self.emit_bytes(OpCode::SetLocal as u8, outer_slot);
            self.emit_op(OpCode::Pop);
            self.end_scope();
        } else {
            self.statement();
        }
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        let kind = self.contexts.last().unwrap().kind;
        if kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if kind == FunctionKind::Initializer {
                self.error("Can't return a value from an initializer.");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
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
            self.expr_statement();
        }
    }

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration(false);
        } else if self.match_token(TokenKind::Const) {
            self.var_declaration(true);
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self, is_const: bool) {
        let global = self.parse_variable(if is_const {
            "Expect constant name."
        } else {
            "Expect variable name."
        });
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            if is_const {
                self.error("Const declaration requires an initializer.");
            }
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global, is_const);
    }
}
