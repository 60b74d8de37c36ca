// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Lexical scanning of single G-code source lines.
//!
//! The scanner is a lazy iterator of tokens over one line.  There is no
//! syntax that spans lines.  Whitespace is insignificant everywhere except
//! inside comments, so `X 1 0` scans the same as `X10`.
//!
//! Which single letters are valid word letters depends on the active
//! dialect, so the scanner is handed the dialect's letter set instead of
//! hardcoding one.

use std::fmt;
use std::iter::{Enumerate, Peekable};
use std::rc::Rc;
use std::str::Chars;

use fixedbitset::FixedBitSet;
use thiserror::Error;

use crate::util::letter_bit;

/// Unary operators usable in expressions.  Trigonometric functions work
/// in degrees at the language boundary.
pub const UNARY_OPS: &[&str] = &[
    "ABS", "ACOS", "ASIN", "ATAN", "COS", "EXP", "FIX", "FUP", "LN",
    "ROUND", "SIN", "SQRT", "TAN",
];

/// Binary operators with additive precedence.
pub const BINARY_ADD_OPS: &[&str] = &["AND", "OR", "XOR"];

/// Binary operators with multiplicative precedence.
pub const BINARY_MUL_OPS: &[&str] = &["MOD"];

fn operators() -> impl Iterator<Item = &'static str> {
    UNARY_OPS.iter()
        .chain(BINARY_ADD_OPS)
        .chain(BINARY_MUL_OPS)
        .cloned()
}

fn is_op_prefix(prefix: &str) -> bool {
    operators().any(|op| op.starts_with(prefix))
}

fn canonical_op(name: &str) -> Option<&'static str> {
    operators().find(|op| *op == name)
}

/// One raw source line plus provenance.  Cheap to clone.
#[derive(Clone, Debug)]
pub struct SourceLine {
    text: Rc<str>,
    src: Rc<str>,
    lineno: usize,
}

impl SourceLine {
    pub fn new(text: &str, src: &str, lineno: usize) -> Self {
        SourceLine { text: Rc::from(text), src: Rc::from(src), lineno }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lineno(&self) -> usize {
        self.lineno
    }

    /// Position of the given 1-based column within this line.
    pub fn pos_at(&self, col: usize) -> SourcePos {
        SourcePos {
            src: self.src.clone(),
            text: self.text.clone(),
            lineno: self.lineno,
            col,
        }
    }
}

/// A position within a source line, carried by every token and
/// diagnostic.
#[derive(Clone, Debug)]
pub struct SourcePos {
    pub src: Rc<str>,
    /// The raw text of the offending line.
    pub text: Rc<str>,
    pub lineno: usize,
    pub col: usize,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}.{}", self.src, self.lineno, self.col)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Comment or message text, verbatim (parens/semicolon stripped).
    Comment(String),
    /// `N` followed by up to five digits.
    LineNumber(u32),
    /// A multi-letter operator like `ABS` or `MOD`, canonical spelling.
    Operator(&'static str),
    /// A single valid word letter, uppercased.
    WordLetter(char),
    /// An unsigned numeric literal.
    Number(f64),
    /// One of `[ ] # + - * / =`.
    Sym(char),
    /// The two-character exponentiation operator `**`.
    ExpOp,
    /// Synthesized at end of line by the token cursor.
    Eol,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub pos: SourcePos,
    pub kind: TokenKind,
}

/// An error detected during scanning or parsing of a line.
#[derive(Debug, Error)]
#[error("{pos}: {kind}")]
pub struct SyntaxError {
    pub pos: SourcePos,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub fn new(pos: SourcePos, kind: SyntaxErrorKind) -> Self {
        SyntaxError { pos, kind }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SyntaxErrorKind {
    #[error("nested comment")]
    NestedComment,
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("invalid line number")]
    InvalidLineNumber,
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    #[error("unknown code letter {0}")]
    UnknownCodeLetter(char),
    #[error("invalid number")]
    InvalidNumber,
    #[error("unknown character {0:?}")]
    UnknownCharacter(char),
    #[error("can't parse segment")]
    BadSegment,
    #[error("can't parse value")]
    BadValue,
    #[error("can't parse parameter setting")]
    BadParamSetting,
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("division by zero")]
    DivByZero,
    #[error("parameter index {0} is not close to an integer")]
    FractionalParamIndex(f64),
    #[error("parameter index {0} is not in range 1..5399")]
    ParamIndexRange(f64),
    #[error("unknown code {0}")]
    UnknownCode(String),
    #[error("{0} and {1} of group '{2}' cannot be used together")]
    ConflictingCodes(String, String, &'static str),
    #[error("word {0} is claimed by both {1} and {2}")]
    AmbiguousWord(char, String, String),
    #[error("{0} requires one of the words {1}")]
    MissingRequiredWord(String, String),
}

/// Lazy token stream over one source line.
///
/// Yields `Err` at most once; afterwards the stream is exhausted.
pub struct Scanner<'a> {
    line: &'a SourceLine,
    chars: Peekable<Enumerate<Chars<'a>>>,
    letters: &'a FixedBitSet,
    failed: bool,
}

impl<'a> Scanner<'a> {
    /// `letters` is the dialect's set of valid word letters (code letters
    /// plus argument letters), indexed A=0..Z=25.
    pub fn new(line: &'a SourceLine, letters: &'a FixedBitSet) -> Self {
        Scanner {
            line,
            chars: line.text().chars().enumerate().peekable(),
            letters,
            failed: false,
        }
    }

    /// Next character, whitespace included.  Column is 1-based.
    fn bump_raw(&mut self) -> Option<(usize, char)> {
        self.chars.next().map(|(i, c)| (i + 1, c))
    }

    /// Next character, skipping whitespace.
    fn bump(&mut self) -> Option<(usize, char)> {
        loop {
            let (col, c) = self.bump_raw()?;
            if !c.is_whitespace() {
                return Some((col, c));
            }
        }
    }

    /// Peek the next non-whitespace character.  Consumes the whitespace
    /// in front of it, which is fine: whitespace is never significant
    /// outside comments, and comments use the raw accessors.
    fn peek(&mut self) -> Option<char> {
        loop {
            match self.chars.peek() {
                Some(&(_, c)) if c.is_whitespace() => { self.chars.next(); }
                Some(&(_, c)) => return Some(c),
                None => return None,
            }
        }
    }

    fn peek_raw(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Collect non-whitespace characters while the predicate holds.  The
    /// predicate sees the characters accepted so far and the candidate.
    fn collect_while(&mut self, mut pred: impl FnMut(&str, char) -> bool) -> String {
        let mut chars = String::new();
        while let Some(c) = self.peek() {
            if !pred(&chars, c) {
                break;
            }
            self.bump();
            chars.push(c);
        }
        chars
    }

    fn err(&mut self, col: usize, kind: SyntaxErrorKind) -> Result<Token, SyntaxError> {
        self.failed = true;
        Err(SyntaxError::new(self.line.pos_at(col), kind))
    }

    fn token(&self, col: usize, kind: TokenKind) -> Result<Token, SyntaxError> {
        Ok(Token { pos: self.line.pos_at(col), kind })
    }

    fn scan_paren_comment(&mut self, col: usize) -> Result<Token, SyntaxError> {
        let mut comment = String::new();
        loop {
            match self.bump_raw() {
                None => return self.err(col, SyntaxErrorKind::UnterminatedComment),
                Some((_, '(')) => return self.err(col, SyntaxErrorKind::NestedComment),
                Some((_, ')')) => break,
                Some((_, c)) => comment.push(c),
            }
        }
        self.token(col, TokenKind::Comment(comment))
    }

    fn scan_line_comment(&mut self, col: usize) -> Result<Token, SyntaxError> {
        let mut comment = String::new();
        while let Some((_, c)) = self.bump_raw() {
            comment.push(c);
        }
        self.token(col, TokenKind::Comment(comment))
    }

    fn scan_line_number(&mut self, col: usize) -> Result<Token, SyntaxError> {
        let digits = self.collect_while(|prefix, c| c.is_ascii_digit() && prefix.len() < 5);
        match digits.parse::<u32>() {
            Ok(n) => self.token(col, TokenKind::LineNumber(n)),
            Err(_) => self.err(col, SyntaxErrorKind::InvalidLineNumber),
        }
    }

    fn scan_word(&mut self, col: usize, first: char) -> Result<Token, SyntaxError> {
        let first = first.to_ascii_uppercase();
        let mut name = first.to_string();
        name += &self.collect_while(|prefix, c| {
            let mut candidate = String::with_capacity(prefix.len() + 2);
            candidate.push(first);
            candidate += prefix;
            candidate.push(c.to_ascii_uppercase());
            is_op_prefix(&candidate)
        });
        let name = name.to_ascii_uppercase();
        if name.len() > 1 {
            match canonical_op(&name) {
                Some(op) => self.token(col, TokenKind::Operator(op)),
                None => self.err(col, SyntaxErrorKind::UnknownOperator(name)),
            }
        } else if self.letters.contains(letter_bit(first)) {
            self.token(col, TokenKind::WordLetter(first))
        } else {
            self.err(col, SyntaxErrorKind::UnknownCodeLetter(first))
        }
    }

    fn scan_number(&mut self, col: usize, first: char) -> Result<Token, SyntaxError> {
        let mut number = first.to_string();
        number += &self.collect_while(|_, c| c.is_ascii_digit());
        if first != '.' && self.peek() == Some('.') {
            self.bump();
            number.push('.');
            number += &self.collect_while(|_, c| c.is_ascii_digit());
        }
        if number == "." {
            return self.err(col, SyntaxErrorKind::InvalidNumber);
        }
        match number.parse::<f64>() {
            Ok(n) => self.token(col, TokenKind::Number(n)),
            Err(_) => self.err(col, SyntaxErrorKind::InvalidNumber),
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (col, c) = self.bump()?;
        Some(match c {
            '(' => self.scan_paren_comment(col),
            ';' => self.scan_line_comment(col),
            'N' | 'n' => self.scan_line_number(col),
            '[' | ']' | '#' | '+' | '-' | '/' | '=' => self.token(col, TokenKind::Sym(c)),
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    self.token(col, TokenKind::ExpOp)
                } else {
                    self.token(col, TokenKind::Sym('*'))
                }
            }
            _ if c.is_ascii_alphabetic() => self.scan_word(col, c),
            _ if c.is_ascii_digit() || c == '.' => self.scan_number(col, c),
            _ => self.err(col, SyntaxErrorKind::UnknownCharacter(c)),
        })
    }
}
