// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The declarative code registry.
//!
//! A dialect is the full catalog of codes one executor understands: the
//! modal and nonmodal groups, each code's argument letters and
//! constraints, and the fixed order in which groups execute on a line.
//! Executors assemble their dialect with `DialectBuilder` at construction
//! time; the built dialect is immutable.

use std::collections::HashMap;

use fixedbitset::FixedBitSet;

use crate::parse::ParsedLine;
use crate::util::{approx_eq, letter_bit};
use super::enums::ControlAction;
use super::error::SemanticError;
use super::Settings;

/// What a code or hook returns: possibly a control action for the caller.
pub type ExecResult = Result<Option<ControlAction>, SemanticError>;

/// A code's implementation.
pub type Handler<E> = fn(&mut E, &Args) -> ExecResult;

/// An inline entry in the order of execution, run once per line.
pub type LineHook<E> = fn(&mut E, &ParsedLine) -> ExecResult;

/// Decides whether a group's sticky modal code re-fires implicitly.
pub type PrepareHook = fn(&Refire) -> bool;

/// Runs after a group's code executed; typically clears consumed
/// settings.
pub type FinishHook = fn(&mut Settings);

/// Context handed to a group's prepare hook.
pub struct Refire<'a> {
    /// Letters of this line's passive words that no invoked code claimed.
    pub unclaimed: &'a FixedBitSet,
    /// The merged settings after this line's words were applied.
    pub settings: &'a Settings,
}

impl<'a> Refire<'a> {
    pub fn has_unclaimed(&self, letters: &[char]) -> bool {
        letters.iter().any(|&l| self.unclaimed.contains(letter_bit(l)))
    }
}

/// The argument values a code was invoked with, pulled from the merged
/// settings for the code's declared letters (or its declared defaults).
pub struct Args {
    code: String,
    values: HashMap<char, f64>,
}

impl Args {
    /// The name of the invoked code, e.g. "G1".
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn get(&self, letter: char) -> Option<f64> {
        self.values.get(&letter).cloned()
    }

    pub fn require(&self, letter: char) -> Result<f64, SemanticError> {
        self.get(letter).ok_or_else(|| SemanticError::MissingWord {
            code: self.code.clone(),
            letter,
        })
    }
}

/// One registered code: identity, argument letters, constraints, and the
/// handler to run.
pub struct Code<E> {
    pub name: String,
    pub letter: char,
    pub number: f64,
    pub args: &'static [char],
    /// If nonempty, invoking the code without any of these letters among
    /// the line's words is a syntax error.
    pub require_any: &'static [char],
    /// Values assumed for declared argument letters that are unset.
    pub defaults: Vec<(char, f64)>,
    handler: Handler<E>,
}

impl<E> Code<E> {
    fn new(name: &str, args: &'static [char], handler: Handler<E>) -> Self {
        let mut chars = name.chars();
        let letter = chars.next().expect("empty code name").to_ascii_uppercase();
        let number = chars.as_str().parse::<f64>().expect("bad code number");
        Code {
            name: name.to_string(),
            letter,
            number,
            args,
            require_any: &[],
            defaults: vec![],
            handler,
        }
    }

    pub fn matches(&self, letter: char, number: f64) -> bool {
        self.letter == letter && approx_eq(self.number, number)
    }

    pub(super) fn collect_args(&self, settings: &Settings) -> Args {
        let mut values = HashMap::new();
        for &letter in self.args {
            if let Some(v) = settings.get(letter) {
                values.insert(letter, v);
            }
        }
        for &(letter, value) in &self.defaults {
            values.entry(letter).or_insert(value);
        }
        Args { code: self.name.clone(), values }
    }

    pub(super) fn invoke(&self, exec: &mut E, args: &Args) -> ExecResult {
        (self.handler)(exec, args)
    }
}

/// A named group of codes.  Within a modal group, at most one member may
/// be explicitly invoked per line, and the most recently invoked member
/// stays active across lines.
pub struct Group<E> {
    pub name: &'static str,
    pub modal: bool,
    pub codes: Vec<Code<E>>,
    pub prepare: Option<PrepareHook>,
    pub finish: Option<FinishHook>,
}

/// One entry of a dialect's order of execution.
pub enum Step<E> {
    /// Execute the named group's invoked (or implicitly re-fired) code.
    Group(&'static str),
    /// Run an inline hook unconditionally.
    Hook(LineHook<E>),
}

impl<E> Clone for Step<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Step<E> {}

/// Identifies a code within its dialect.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CodeId {
    pub(super) group: usize,
    pub(super) code: usize,
}

/// The complete, immutable catalog for one executor variant.
pub struct Dialect<E> {
    groups: Vec<Group<E>>,
    order: Vec<Step<E>>,
    group_index: HashMap<&'static str, usize>,
    code_letters: FixedBitSet,
    arg_letters: FixedBitSet,
}

impl<E> Dialect<E> {
    pub fn find_code(&self, letter: char, number: f64) -> Option<CodeId> {
        for (gi, group) in self.groups.iter().enumerate() {
            for (ci, code) in group.codes.iter().enumerate() {
                if code.matches(letter, number) {
                    return Some(CodeId { group: gi, code: ci });
                }
            }
        }
        None
    }

    pub fn code(&self, id: CodeId) -> &Code<E> {
        &self.groups[id.group].codes[id.code]
    }

    pub fn group(&self, id: CodeId) -> &Group<E> {
        &self.groups[id.group]
    }

    pub(super) fn group_at(&self, index: usize) -> &Group<E> {
        &self.groups[index]
    }

    pub(super) fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub(super) fn group_named(&self, name: &str) -> usize {
        self.group_index[name]
    }

    pub(super) fn order(&self) -> &[Step<E>] {
        &self.order
    }

    /// Letters that may start a code word (e.g. G, M).
    pub fn is_code_letter(&self, letter: char) -> bool {
        letter.is_ascii_uppercase() && self.code_letters.contains(letter_bit(letter))
    }

    /// Letters that only ever appear as arguments (e.g. X, F).
    pub fn is_passive_letter(&self, letter: char) -> bool {
        letter.is_ascii_uppercase()
            && self.arg_letters.contains(letter_bit(letter))
            && !self.code_letters.contains(letter_bit(letter))
    }

    /// All valid word letters, for the scanner: code letters plus
    /// argument letters.
    pub fn word_letters(&self) -> FixedBitSet {
        let mut set = self.code_letters.clone();
        set.union_with(&self.arg_letters);
        set
    }
}

/// Accumulates groups and codes, then finalizes an immutable `Dialect`.
pub struct DialectBuilder<E> {
    groups: Vec<Group<E>>,
    order: Vec<Step<E>>,
}

impl<E> DialectBuilder<E> {
    pub fn new() -> Self {
        DialectBuilder { groups: vec![], order: vec![] }
    }

    pub fn modal_group(self, name: &'static str,
                       build: impl FnOnce(&mut GroupBuilder<E>)) -> Self {
        self.add_group(name, true, build)
    }

    pub fn nonmodal_group(self, name: &'static str,
                          build: impl FnOnce(&mut GroupBuilder<E>)) -> Self {
        self.add_group(name, false, build)
    }

    fn add_group(mut self, name: &'static str, modal: bool,
                 build: impl FnOnce(&mut GroupBuilder<E>)) -> Self {
        let mut group = Group { name, modal, codes: vec![], prepare: None, finish: None };
        build(&mut GroupBuilder { group: &mut group });
        self.groups.push(group);
        self
    }

    /// Declares the fixed order of execution.  It must name every
    /// declared group exactly once.
    pub fn order(mut self, steps: Vec<Step<E>>) -> Self {
        self.order = steps;
        self
    }

    pub fn build(self) -> Dialect<E> {
        let mut ordered: Vec<&str> = self.order.iter()
            .filter_map(|s| match s { Step::Group(n) => Some(*n), Step::Hook(_) => None })
            .collect();
        let mut declared: Vec<&str> = self.groups.iter().map(|g| g.name).collect();
        ordered.sort_unstable();
        declared.sort_unstable();
        assert_eq!(ordered, declared,
                   "order of execution must name every group exactly once");

        let mut code_letters = FixedBitSet::with_capacity(26);
        let mut arg_letters = FixedBitSet::with_capacity(26);
        let mut group_index = HashMap::new();
        for (gi, group) in self.groups.iter().enumerate() {
            group_index.insert(group.name, gi);
            for code in &group.codes {
                code_letters.insert(letter_bit(code.letter));
                for &arg in code.args {
                    arg_letters.insert(letter_bit(arg));
                }
            }
        }
        Dialect {
            groups: self.groups,
            order: self.order,
            group_index,
            code_letters,
            arg_letters,
        }
    }
}

/// Adds codes and hooks to the group currently being declared.
pub struct GroupBuilder<'a, E> {
    group: &'a mut Group<E>,
}

impl<'a, E> GroupBuilder<'a, E> {
    pub fn code(&mut self, name: &str, args: &'static [char],
                handler: Handler<E>) -> &mut Self {
        self.group.codes.push(Code::new(name, args, handler));
        self
    }

    /// Applies to the most recently declared code.
    pub fn require_any(&mut self, letters: &'static [char]) -> &mut Self {
        self.group.codes.last_mut().expect("no code declared").require_any = letters;
        self
    }

    /// Applies to the most recently declared code.
    pub fn default_arg(&mut self, letter: char, value: f64) -> &mut Self {
        self.group.codes.last_mut().expect("no code declared")
            .defaults.push((letter, value));
        self
    }

    pub fn prepare(&mut self, hook: PrepareHook) -> &mut Self {
        self.group.prepare = Some(hook);
        self
    }

    pub fn finish(&mut self, hook: FinishHook) -> &mut Self {
        self.group.finish = Some(hook);
        self
    }
}

/// A G-code executor: owns machine state, declares its dialect, and
/// carries out the primitive operations its codes map to.
pub trait Executor: Sized {
    /// Assemble this executor's code catalog.  Called once per
    /// interpreter instance.
    fn dialect() -> Dialect<Self>;

    /// Letters with a value before any line has run.
    fn initial_settings() -> Vec<(char, f64)> {
        vec![]
    }
}
