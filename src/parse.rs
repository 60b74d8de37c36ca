// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Recursive-descent parsing of single G-code lines.
//!
//! Expressions and parameter references are evaluated *while* parsing, so
//! a parsed line carries plain numbers, not an AST.  Parameter reads see
//! the committed store only; assignments made on the same line become
//! visible after the whole line has parsed and been committed.
//!
//! The productions follow Appendix E of the NIST RS274/NGC document,
//! rewritten to express operator precedence:
//!
//! ```text
//! line       = [block_delete] [line_number] {segment} end_of_line
//! segment    = mid_line_word | comment | parameter_setting
//! real_value = signed_number | expression | parameter_value | unary_combo
//! expression = '[' term { add_op term } ']'
//! term       = factor { mul_op factor }
//! factor     = real_value { '**' real_value }
//! ```
//!
//! where the add ops are `+ - AND OR XOR`, the mul ops are `* / MOD`, and
//! each level is left-associative.

use fixedbitset::FixedBitSet;

use crate::param::ParameterStore;
use crate::scan::{Scanner, SourceLine, SourcePos, SyntaxError, SyntaxErrorKind, Token,
                  TokenKind, UNARY_OPS};

/// The side effects of one parsed source line.  Immutable once parsing
/// completes.
#[derive(Clone, Debug)]
pub struct ParsedLine {
    pub source: SourceLine,
    pub block_delete: bool,
    pub line_number: Option<u32>,
    /// Word pairs in order of appearance, letters uppercased.
    pub words: Vec<(char, f64)>,
    /// Pending parameter assignments, in order of appearance.  Not yet
    /// applied to any store.
    pub settings: Vec<(u16, f64)>,
    pub comment: Option<String>,
}

impl ParsedLine {
    fn new(source: SourceLine) -> Self {
        ParsedLine {
            source,
            block_delete: false,
            line_number: None,
            words: vec![],
            settings: vec![],
            comment: None,
        }
    }

    /// Position of the start of the line, for line-level diagnostics.
    pub fn pos(&self) -> SourcePos {
        self.source.pos_at(1)
    }
}

/// Token cursor with one-token lookahead, yielding `Eol` past the end.
struct Tokens<'a> {
    scanner: Scanner<'a>,
    peeked: Option<Token>,
    eol: SourcePos,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a SourceLine, letters: &'a FixedBitSet) -> Self {
        let eol = line.pos_at(line.text().chars().count() + 1);
        Tokens { scanner: Scanner::new(line, letters), peeked: None, eol }
    }

    fn next(&mut self) -> Result<Token, SyntaxError> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        match self.scanner.next() {
            Some(res) => res,
            None => Ok(Token { pos: self.eol.clone(), kind: TokenKind::Eol }),
        }
    }

    fn peek(&mut self) -> Result<&Token, SyntaxError> {
        if self.peeked.is_none() {
            let tok = self.next()?;
            self.peeked = Some(tok);
        }
        Ok(self.peeked.as_ref().expect("just peeked"))
    }
}

/// Line parser for one dialect, given by its valid word letter set.
///
/// The parser itself is stateless across lines; parameter state lives in
/// the store passed to `parse_line`.
pub struct Parser {
    letters: FixedBitSet,
}

impl Parser {
    pub fn new(letters: FixedBitSet) -> Self {
        Parser { letters }
    }

    /// Parse one line against the committed parameter values.  Does not
    /// commit the line's own assignments; that is the interpreter's job
    /// once the whole line has validated.
    pub fn parse_line(&self, params: &ParameterStore, text: &str, src: &str,
                      lineno: usize) -> Result<ParsedLine, SyntaxError> {
        let line = SourceLine::new(text, src, lineno);
        let mut lp = LineParser {
            toks: Tokens::new(&line, &self.letters),
            params,
            result: ParsedLine::new(line.clone()),
        };
        lp.parse_line()?;
        Ok(lp.result)
    }
}

struct LineParser<'a> {
    toks: Tokens<'a>,
    params: &'a ParameterStore,
    result: ParsedLine,
}

impl<'a> LineParser<'a> {
    fn parse_line(&mut self) -> Result<(), SyntaxError> {
        if self.toks.peek()?.kind == TokenKind::Sym('/') {
            self.toks.next()?;
            self.result.block_delete = true;
        }
        if let TokenKind::LineNumber(n) = self.toks.peek()?.kind {
            self.toks.next()?;
            self.result.line_number = Some(n);
        }
        while self.toks.peek()?.kind != TokenKind::Eol {
            self.parse_segment()?;
        }
        Ok(())
    }

    fn parse_segment(&mut self) -> Result<(), SyntaxError> {
        match &self.toks.peek()?.kind {
            TokenKind::WordLetter(_) => self.parse_mid_line_word(),
            TokenKind::Comment(_) => {
                if let TokenKind::Comment(text) = self.toks.next()?.kind {
                    self.result.comment = Some(text);
                }
                Ok(())
            }
            TokenKind::Sym('#') => self.parse_parameter_setting(),
            _ => {
                let tok = self.toks.next()?;
                Err(SyntaxError::new(tok.pos, SyntaxErrorKind::BadSegment))
            }
        }
    }

    fn parse_mid_line_word(&mut self) -> Result<(), SyntaxError> {
        let letter = match self.toks.next()?.kind {
            TokenKind::WordLetter(l) => l,
            _ => unreachable!("peeked a word letter"),
        };
        let value = self.parse_real_value()?;
        self.result.words.push((letter, value));
        Ok(())
    }

    fn parse_real_value(&mut self) -> Result<f64, SyntaxError> {
        let next = self.toks.peek()?;
        match &next.kind {
            // A sign may precede any value form, e.g. `X-[10]`.
            TokenKind::Sym('+') => {
                self.toks.next()?;
                self.parse_real_value()
            }
            TokenKind::Sym('-') => {
                self.toks.next()?;
                Ok(-self.parse_real_value()?)
            }
            TokenKind::Number(_) => match self.toks.next()?.kind {
                TokenKind::Number(n) => Ok(n),
                _ => unreachable!("peeked a number"),
            },
            TokenKind::Sym('[') => self.parse_expression(),
            TokenKind::Sym('#') => self.parse_parameter_value(),
            TokenKind::Operator(op) if UNARY_OPS.contains(op) => self.parse_unary_combo(),
            _ => {
                let pos = next.pos.clone();
                Err(SyntaxError::new(pos, SyntaxErrorKind::BadValue))
            }
        }
    }

    fn parse_parameter_setting(&mut self) -> Result<(), SyntaxError> {
        let hash = self.toks.next()?;
        debug_assert_eq!(hash.kind, TokenKind::Sym('#'));
        let raw_index = self.parse_real_value()?;
        let index = ParameterStore::check_index(raw_index)
            .map_err(|kind| SyntaxError::new(hash.pos.clone(), kind))?;
        let eq = self.toks.next()?;
        if eq.kind != TokenKind::Sym('=') {
            return Err(SyntaxError::new(eq.pos, SyntaxErrorKind::BadParamSetting));
        }
        let value = self.parse_real_value()?;
        self.result.settings.push((index, value));
        Ok(())
    }

    fn parse_parameter_value(&mut self) -> Result<f64, SyntaxError> {
        let hash = self.toks.next()?;
        debug_assert_eq!(hash.kind, TokenKind::Sym('#'));
        let raw_index = self.parse_real_value()?;
        let index = ParameterStore::check_index(raw_index)
            .map_err(|kind| SyntaxError::new(hash.pos, kind))?;
        // Reads see the committed store only; this line's own settings are
        // still pending.
        Ok(self.params.get(index))
    }

    fn parse_expression(&mut self) -> Result<f64, SyntaxError> {
        let lb = self.toks.next()?;
        debug_assert_eq!(lb.kind, TokenKind::Sym('['));
        let mut left = self.parse_term()?;
        loop {
            let op = match &self.toks.peek()?.kind {
                TokenKind::Sym(c @ '+') | TokenKind::Sym(c @ '-') => AddOp::Sym(*c),
                TokenKind::Operator(op) if is_logical(op) => AddOp::Logical(*op),
                _ => break,
            };
            self.toks.next()?;
            let right = self.parse_term()?;
            left = match op {
                AddOp::Sym('+') => left + right,
                AddOp::Sym(_) => left - right,
                AddOp::Logical("AND") => bool_val(truthy(left) && truthy(right)),
                AddOp::Logical("OR") => bool_val(truthy(left) || truthy(right)),
                AddOp::Logical(_) => bool_val(truthy(left) != truthy(right)),
            };
        }
        let rb = self.toks.next()?;
        if rb.kind != TokenKind::Sym(']') {
            return Err(SyntaxError::new(rb.pos, SyntaxErrorKind::Expected("]")));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<f64, SyntaxError> {
        let mut left = self.parse_factor()?;
        loop {
            let div = match &self.toks.peek()?.kind {
                TokenKind::Sym('*') => MulOp::Mul,
                TokenKind::Sym('/') => MulOp::Div,
                TokenKind::Operator(op) if *op == "MOD" => MulOp::Mod,
                _ => break,
            };
            let op_pos = self.toks.next()?.pos;
            let right = self.parse_factor()?;
            left = match div {
                MulOp::Mul => left * right,
                MulOp::Div if right == 0.0 =>
                    return Err(SyntaxError::new(op_pos, SyntaxErrorKind::DivByZero)),
                MulOp::Div => left / right,
                MulOp::Mod if right == 0.0 =>
                    return Err(SyntaxError::new(op_pos, SyntaxErrorKind::DivByZero)),
                MulOp::Mod => left % right,
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<f64, SyntaxError> {
        let mut left = self.parse_real_value()?;
        while self.toks.peek()?.kind == TokenKind::ExpOp {
            self.toks.next()?;
            let right = self.parse_real_value()?;
            left = left.powf(right);
        }
        Ok(left)
    }

    fn parse_unary_combo(&mut self) -> Result<f64, SyntaxError> {
        let op = match self.toks.next()?.kind {
            TokenKind::Operator(op) => op,
            _ => unreachable!("peeked a unary operator"),
        };
        let x = self.parse_real_value()?;
        if op == "ATAN" && self.toks.peek()?.kind == TokenKind::Sym('/') {
            // ATAN has two forms: `ATAN x` and `ATAN y / x` (atan2).
            self.toks.next()?;
            let y = x;
            let x = self.parse_real_value()?;
            return Ok(y.atan2(x).to_degrees());
        }
        Ok(apply_unary(op, x))
    }
}

enum AddOp {
    Sym(char),
    Logical(&'static str),
}

enum MulOp {
    Mul,
    Div,
    Mod,
}

fn is_logical(op: &str) -> bool {
    op == "AND" || op == "OR" || op == "XOR"
}

fn truthy(v: f64) -> bool {
    v != 0.0
}

fn bool_val(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn apply_unary(op: &str, x: f64) -> f64 {
    match op {
        "ABS" => x.abs(),
        "ACOS" => x.acos().to_degrees(),
        "ASIN" => x.asin().to_degrees(),
        "ATAN" => x.atan().to_degrees(),
        "COS" => x.to_radians().cos(),
        "EXP" => x.exp(),
        "FIX" => x.floor(),
        "FUP" => x.ceil(),
        "LN" => x.ln(),
        "ROUND" => x.round(),
        "SIN" => x.to_radians().sin(),
        "SQRT" => x.sqrt(),
        "TAN" => x.to_radians().tan(),
        _ => unreachable!("not a unary operator: {}", op),
    }
}

/// Split a comment of the form `HDR, rest` into its header and payload.
/// Used for `(MSG, ...)` operator messages; anything else is plain text.
pub fn split_comment(comment: &str) -> (Option<&str>, &str) {
    if let Some(idx) = comment.find(',') {
        let hdr = comment[..idx].trim();
        if !hdr.is_empty() && hdr.chars().all(|c| c.is_ascii_alphabetic()) {
            return (Some(hdr), &comment[idx + 1..]);
        }
    }
    (None, comment)
}
