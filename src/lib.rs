// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! A G-code interpreter for a laser-cutter motion controller.
//!
//! This is the host side of the machine: it reads a dialect of G-code
//! line by line, evaluates expressions and parameters while parsing,
//! applies the modal-group rules, and drives an executor that turns
//! codes into primitive machine directives (microstep moves, dwells,
//! laser and peripheral switching).  The firmware side, transport
//! framing and scheduling are out of scope.
//!
//! ## Basic usage
//!
//! Create an `Interpreter` over an executor and feed it lines, or a
//! whole program through a `LineStream`:
//!
//! ```rust
//! use kerf::eval::{Interpreter, LineStream};
//! use kerf::laser::LaserExec;
//!
//! let mut interp = Interpreter::new(LaserExec::default());
//! let mut stream = LineStream::new("G28\nG91 G1 X10 Y5 F600\n", "<demo>");
//! interp.run(&mut stream).unwrap();
//! for directive in interp.executor_mut().take_directives() {
//!     println!("{:?}", directive);
//! }
//! ```
//!
//! The interpretation engine in `eval` is generic over the dialect: an
//! `Executor` implementation declares its codes, their groups and the
//! order of execution, and the engine handles parsing, validation,
//! modal stickiness and parameter state.  `laser::LaserExec` is the
//! machine dialect this crate is built for.

pub mod scan;
pub mod parse;
pub mod param;
pub mod eval;
pub mod laser;

// internal helpers
pub(crate) mod arc;
pub(crate) mod util;
