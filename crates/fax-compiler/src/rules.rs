//! The Pratt parsing driver table: one `{prefix, infix, precedence}` rule
//! per token kind, keyed off `TokenKind` with function pointers rather
//! than a closure table. A classic precedence enum works here, rather
//! than binding-power pairs, since every operator in this grammar is
//! either strictly left- or strictly right-associative, never both at
//! once.

use fax_lex::TokenKind;

use crate::compiler::Compiler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    pub fn next(self) -> Precedence {
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

pub type ParseFn = fn(&mut Compiler, can_assign: bool);

#[derive(Clone, Copy)]
pub struct ParseRule {
    pub prefix: Option<ParseFn>,
    pub infix: Option<ParseFn>,
    pub precedence: Precedence,
}

const fn rule(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> ParseRule {
    ParseRule { prefix, infix, precedence }
}

/// Looks up the rule for `kind`. Every `TokenKind` has an entry, even if
/// it's the all-`None` rule.
pub fn get_rule(kind: TokenKind) -> ParseRule {
    use Precedence::{And, Call, Comparison, Equality, Factor, Or, Term};
    use TokenKind as T;
    let none = Precedence::None;
    match kind {
        T::LeftParen => rule(Some(Compiler::grouping), Some(Compiler::call), Call),
        T::RightParen => rule(None, None, none),
        T::LeftBrace => rule(None, None, none),
        T::RightBrace => rule(None, None, none),
        T::Comma => rule(None, None, none),
        T::Dot => rule(None, Some(Compiler::dot), Call),
        T::Minus => rule(Some(Compiler::unary), Some(Compiler::binary), Term),
        T::Plus => rule(None, Some(Compiler::binary), Term),
        T::Semicolon => rule(None, None, none),
        T::Slash => rule(None, Some(Compiler::binary), Factor),
        T::Star => rule(None, Some(Compiler::binary), Factor),
        T::Bang => rule(Some(Compiler::unary), None, none),
        T::BangEqual => rule(None, Some(Compiler::binary), Equality),
        T::Equal => rule(None, None, none),
        T::EqualEqual => rule(None, Some(Compiler::binary), Equality),
        T::Greater => rule(None, Some(Compiler::binary), Comparison),
        T::GreaterEqual => rule(None, Some(Compiler::binary), Comparison),
        T::Less => rule(None, Some(Compiler::binary), Comparison),
        T::LessEqual => rule(None, Some(Compiler::binary), Comparison),
        T::Identifier => rule(Some(Compiler::variable), None, none),
        T::String => rule(Some(Compiler::string), None, none),
        T::Number => rule(Some(Compiler::number), None, none),
        T::And => rule(None, Some(Compiler::and), And),
        T::Class => rule(None, None, none),
        T::Else => rule(None, None, none),
        T::False => rule(Some(Compiler::literal), None, none),
        T::For => rule(None, None, none),
        T::Fun => rule(None, None, none),
        T::If => rule(None, None, none),
        T::Nil => rule(Some(Compiler::literal), None, none),
        T::Or => rule(None, Some(Compiler::or), Or),
        T::Print => rule(None, None, none),
        T::Return => rule(None, None, none),
        T::Super => rule(Some(Compiler::super_), None, none),
        T::This => rule(Some(Compiler::this), None, none),
        T::True => rule(Some(Compiler::literal), None, none),
        T::Var => rule(None, None, none),
        T::Const => rule(None, None, none),
        T::While => rule(None, None, none),
        T::Error => rule(None, None, none),
        T::Eof => rule(None, None, none),
    }
}
