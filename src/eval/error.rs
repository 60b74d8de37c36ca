// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use thiserror::Error;

use crate::scan::SyntaxError;
use super::enums::Laser;

/// A runtime precondition violation raised while executing a line's
/// codes.  Unlike a syntax error, it aborts only the remainder of the
/// line: parameter assignments already committed stay committed.
#[derive(Debug, Error, PartialEq)]
pub enum SemanticError {
    #[error("absolute {0} coordinate before homing")]
    PositionUnknown(char),
    #[error("{0}: can't specify both radius (R) and center (I, J)")]
    ArcCenterAndRadius(String),
    #[error("{0}: must specify either radius (R) or center (I, J)")]
    ArcUnspecified(String),
    #[error("arc radius {0} is too small to reach the destination")]
    ArcRadiusTooSmall(f64),
    #[error("destination ({0}, {1}) is not on arc")]
    OffArc(f64, f64),
    #[error("{code} needs a {letter} word")]
    MissingWord { code: String, letter: char },
    #[error("laser enabled before a pulse mode is set")]
    PulseModeUnset,
    #[error("laser enabled before its power is set")]
    PowerUnset,
    #[error("{0} laser enabled while {1} laser is on")]
    LaserBusy(Laser, Laser),
    #[error("timed pulse mode needs a duration (P)")]
    PulseLengthUnset,
    #[error("distance pulse mode needs a distance (Q)")]
    PulseDistanceUnset,
    #[error("{0} is not a valid tool number")]
    BadToolNumber(f64),
    #[error("feed rate must be positive, not {0}")]
    BadFeedRate(f64),
}

/// Any error the interpreter can report for one line.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

/// An error tagged with the source line it occurred on, as reported by
/// the stream-level loop.
#[derive(Debug, Error)]
#[error("error in line {lineno}: {error}")]
pub struct EvalError {
    pub lineno: usize,
    pub error: Error,
}
