// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use strum_macros::Display;

/// How axis coordinates are interpreted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum DistanceMode {
    Absolute,
    Relative,
}

impl Default for DistanceMode {
    fn default() -> Self { DistanceMode::Absolute }
}

/// The working length unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum Units {
    Mm,
    Inch,
}

impl Default for Units {
    fn default() -> Self { Units::Mm }
}

/// How the laser fires while it is enabled.
///
/// Timed mode fires fixed-duration pulses; distance mode fires one pulse
/// per configured distance of travel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum PulseMode {
    Off,
    Continuous,
    Timed,
    Distance,
}

impl Default for PulseMode {
    fn default() -> Self { PulseMode::Off }
}

/// The two laser tubes of the machine: the cutting laser and the visible
/// alignment laser.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum Laser {
    Main,
    Visible,
}

/// A control result returned by a code to its caller.  This is a value,
/// not an error: the caller decides how to pause or stop the enclosing
/// stream loop.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum ControlAction {
    /// Unconditional program pause (M0).
    Pause,
    /// Pause only if the operator enabled optional stops (M1).
    OptionalPause,
    /// Normal end of program (M2).
    EndProgram,
    /// Halt everything, unconditionally (M112).
    EmergencyStop,
}
