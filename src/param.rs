// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The numeric parameter register file (`#1` through `#5399`).

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::parse::ParsedLine;
use crate::scan::SyntaxErrorKind;
use crate::util::EPSILON;

pub const MIN_PARAM: u16 = 1;
pub const MAX_PARAM: u16 = 5399;

/// Bounded register file of numeric parameters.  Unset indices read as
/// zero.  Assignments from a line are committed only after the whole line
/// has parsed and validated; `ParsedLine` carries them as pending until
/// then.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParameterStore {
    values: HashMap<u16, f64>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index must have been validated with `check_index`.
    pub fn get(&self, index: u16) -> f64 {
        self.values.get(&index).cloned().unwrap_or(0.0)
    }

    pub fn set(&mut self, index: u16, value: f64) {
        self.values.insert(index, value);
    }

    /// Apply a parsed line's pending assignments, in order of appearance.
    pub fn commit(&mut self, line: &ParsedLine) {
        for &(index, value) in &line.settings {
            self.set(index, value);
        }
    }

    /// Validate a parameter index computed from an expression.  It must be
    /// within 0.0002 of an integer in [1, 5399].
    pub fn check_index(raw: f64) -> Result<u16, SyntaxErrorKind> {
        let index = (raw + 2.0 * EPSILON).floor();
        if (index - raw).abs() >= EPSILON {
            return Err(SyntaxErrorKind::FractionalParamIndex(raw));
        }
        if index < MIN_PARAM as f64 || index > MAX_PARAM as f64 {
            return Err(SyntaxErrorKind::ParamIndexRange(raw));
        }
        Ok(index as u16)
    }

    /// Save the store as an opaque blob.  The format is stable only
    /// within one library version.
    pub fn save<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    pub fn load<R: Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}
