// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The interpretation engine.
//!
//! The `Interpreter` drives one `Executor` over a program, line by line:
//! parse the line, validate its code words against the executor's
//! dialect, commit parameter assignments, merge word values into the
//! letter settings, and then walk the dialect's order of execution,
//! calling each invoked (or implicitly re-fired modal) code's handler.
//!
//! Control actions returned by handlers (pause, end of program,
//! emergency stop) bubble up to the caller of `run`, which can resume
//! the same stream after a pause.

pub mod dialect;
pub mod enums;
pub mod error;

use std::collections::HashMap;
use std::str::Lines;

use fixedbitset::FixedBitSet;
use itertools::Itertools;

use crate::param::ParameterStore;
use crate::parse::{ParsedLine, Parser};
use crate::scan::{SyntaxError, SyntaxErrorKind};
use crate::util::{fmt_code, letter_bit};

pub use self::dialect::{Args, CodeId, Dialect, DialectBuilder, ExecResult, Executor,
                        LineHook, Refire, Step};
pub use self::enums::{ControlAction, DistanceMode, Laser, PulseMode, Units};
pub use self::error::{Error, EvalError, SemanticError};

/// The sticky per-letter values that argument words leave behind.
///
/// Every passive word on a line updates its letter's value here before
/// any code executes; handlers read their arguments from this map via
/// `Args`.  Group finish hooks clear letters that must not leak into
/// the next line.
#[derive(Clone, Debug, Default)]
pub struct Settings(HashMap<char, f64>);

impl Settings {
    pub fn get(&self, letter: char) -> Option<f64> {
        self.0.get(&letter).cloned()
    }

    pub fn set(&mut self, letter: char, value: f64) {
        self.0.insert(letter, value);
    }

    pub fn clear(&mut self, letters: &[char]) {
        for letter in letters {
            self.0.remove(letter);
        }
    }
}

/// A program's worth of source lines, with the percent-sign begin/end
/// convention applied and blank lines skipped.
///
/// If the first nonblank line is a single `%`, it marks the start of
/// the program; any later `%` line ends it.  The stream can also be
/// closed early, which `Interpreter::run` does on M2 and M112.
pub struct LineStream<'a> {
    src: String,
    lines: Lines<'a>,
    lineno: usize,
    nonblank_seen: bool,
    finished: bool,
}

impl<'a> LineStream<'a> {
    pub fn new(text: &'a str, src: &str) -> Self {
        LineStream {
            src: src.to_string(),
            lines: text.lines(),
            lineno: 0,
            nonblank_seen: false,
            finished: false,
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(line) => line,
                None => {
                    self.finished = true;
                    return None;
                }
            };
            self.lineno += 1;
            if line.trim().is_empty() {
                continue;
            }
            if line.trim() == "%" {
                if self.nonblank_seen {
                    self.finished = true;
                    return None;
                }
                self.nonblank_seen = true;
                continue;
            }
            self.nonblank_seen = true;
            return Some((self.lineno, line));
        }
    }
}

/// Interprets a program for one executor.
///
/// Holds all interpretation state that outlives a single line: the
/// parameter store, the letter settings, and the sticky code of each
/// modal group.
pub struct Interpreter<E: Executor> {
    dialect: Dialect<E>,
    parser: Parser,
    params: ParameterStore,
    settings: Settings,
    /// Per group, the last explicitly invoked code (modal groups only).
    sticky: Vec<Option<usize>>,
    exec: E,
    eval_blockdel: bool,
}

impl<E: Executor> Interpreter<E> {
    pub fn new(exec: E) -> Self {
        let dialect = E::dialect();
        let parser = Parser::new(dialect.word_letters());
        let mut settings = Settings::default();
        for (letter, value) in E::initial_settings() {
            settings.set(letter, value);
        }
        let sticky = vec![None; dialect.group_count()];
        Interpreter {
            dialect,
            parser,
            params: ParameterStore::new(),
            settings,
            sticky,
            exec,
            eval_blockdel: false,
        }
    }

    /// Whether lines starting with `/` are interpreted or skipped.
    pub fn evaluate_blockdel(&mut self, evaluate: bool) {
        self.eval_blockdel = evaluate;
    }

    pub fn executor(&self) -> &E {
        &self.exec
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.exec
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    /// Interpret as many lines as possible, stopping at the first
    /// control action or error.  After a pause action, calling `run`
    /// again resumes with the next line; end of program and emergency
    /// stop close the stream for good.
    pub fn run(&mut self, stream: &mut LineStream) -> Result<Option<ControlAction>, EvalError> {
        while let Some((lineno, text)) = stream.next_line() {
            let src = stream.src().to_string();
            let action = self.interpret_line(text, &src, lineno)
                .map_err(|error| EvalError { lineno, error })?;
            if let Some(action) = action {
                match action {
                    ControlAction::EndProgram | ControlAction::EmergencyStop => stream.finish(),
                    ControlAction::Pause | ControlAction::OptionalPause => (),
                }
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    /// Interpret a single line of input.
    pub fn interpret_line(&mut self, text: &str, src: &str,
                          lineno: usize) -> Result<Option<ControlAction>, Error> {
        let line = self.parser.parse_line(&self.params, text, src, lineno)?;
        self.process(&line)
    }

    fn process(&mut self, line: &ParsedLine) -> Result<Option<ControlAction>, Error> {
        if line.block_delete && !self.eval_blockdel {
            return Ok(None);
        }
        let err = |kind| Error::Syntax(SyntaxError::new(line.pos(), kind));

        // Sort the line's words into passive (argument) words and code
        // invocations.  Exact duplicates of a code are no-ops.
        let mut passive = FixedBitSet::with_capacity(26);
        let mut invoked: Vec<CodeId> = vec![];
        for &(letter, value) in &line.words {
            if self.dialect.is_passive_letter(letter) {
                passive.insert(letter_bit(letter));
            } else {
                let id = self.dialect.find_code(letter, value)
                    .ok_or_else(|| err(SyntaxErrorKind::UnknownCode(fmt_code(letter, value))))?;
                if !invoked.contains(&id) {
                    invoked.push(id);
                }
            }
        }

        // Two distinct codes of the same group on one line conflict; a
        // group executes at most once per line.
        for (i, &a) in invoked.iter().enumerate() {
            for &b in &invoked[i + 1..] {
                if a.group == b.group {
                    return Err(err(SyntaxErrorKind::ConflictingCodes(
                        self.dialect.code(a).name.clone(),
                        self.dialect.code(b).name.clone(),
                        self.dialect.group(a).name,
                    )));
                }
            }
        }

        // A passive word present on the line must be wanted by at most
        // one of the invoked codes, else its value is ambiguous.
        for letter in ('A'..='Z').filter(|&l| passive.contains(letter_bit(l))) {
            let mut claimants = invoked.iter()
                .filter(|&&id| self.dialect.code(id).args.contains(&letter));
            if let (Some(&first), Some(&second)) = (claimants.next(), claimants.next()) {
                return Err(err(SyntaxErrorKind::AmbiguousWord(
                    letter,
                    self.dialect.code(first).name.clone(),
                    self.dialect.code(second).name.clone(),
                )));
            }
        }

        // Codes such as G2/G3 insist on at least one of a set of words
        // being given explicitly on the same line.
        for &id in &invoked {
            let code = self.dialect.code(id);
            if !code.require_any.is_empty()
                && !code.require_any.iter().any(|&l| passive.contains(letter_bit(l)))
            {
                return Err(err(SyntaxErrorKind::MissingRequiredWord(
                    code.name.clone(),
                    code.require_any.iter().join(" "),
                )));
            }
        }

        // The line validated as a whole; only now do its parameter
        // assignments become visible to later lines.
        self.params.commit(line);
        for &(letter, value) in &line.words {
            if self.dialect.is_passive_letter(letter) {
                self.settings.set(letter, value);
            }
        }

        // Passive letters no invoked code claims may trigger an
        // implicit modal re-fire below.
        let mut unclaimed = passive;
        for &id in &invoked {
            for &arg in self.dialect.code(id).args {
                unclaimed.set(letter_bit(arg), false);
            }
        }
        let mut by_group: Vec<Option<usize>> = vec![None; self.dialect.group_count()];
        for id in &invoked {
            by_group[id.group] = Some(id.code);
        }

        for i in 0..self.dialect.order().len() {
            match self.dialect.order()[i] {
                Step::Hook(hook) => {
                    if let Some(action) = hook(&mut self.exec, line)? {
                        return Ok(Some(action));
                    }
                }
                Step::Group(name) => {
                    let gi = self.dialect.group_named(name);
                    let group = self.dialect.group_at(gi);
                    let explicit = by_group[gi];
                    let code_idx = match explicit {
                        Some(ci) => Some(ci),
                        None if group.modal => match (self.sticky[gi], group.prepare) {
                            (Some(ci), Some(prepare)) => {
                                let refire = Refire {
                                    unclaimed: &unclaimed,
                                    settings: &self.settings,
                                };
                                if prepare(&refire) { Some(ci) } else { None }
                            }
                            _ => None,
                        },
                        None => None,
                    };
                    if let Some(ci) = code_idx {
                        let code = &group.codes[ci];
                        let args = code.collect_args(&self.settings);
                        tracing::debug!(line = line.source.lineno(), code = %code.name,
                                        "executing");
                        let action = code.invoke(&mut self.exec, &args)?;
                        if group.modal && explicit.is_some() {
                            self.sticky[gi] = Some(ci);
                        }
                        if let Some(finish) = group.finish {
                            finish(&mut self.settings);
                        }
                        if let Some(action) = action {
                            return Ok(Some(action));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}
