// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The laser cutter executor.
//!
//! `LaserExec` implements `Executor` for a three-axis machine with two
//! laser tubes (the cutting laser and a visible alignment laser).  It
//! tracks positions both in work units and in integer microsteps, and
//! translates every code into `Directive`s, the flat command stream a
//! transport layer would hand to the firmware.  Only the relative order
//! of directives is meaningful; framing and delivery are not this
//! crate's concern.

use crate::arc::plan_arc;
use crate::eval::dialect::{Args, Dialect, DialectBuilder, ExecResult, Executor, Refire,
                           Step};
use crate::eval::{ControlAction, DistanceMode, Laser, PulseMode, SemanticError, Settings,
                  Units};
use crate::parse::{split_comment, ParsedLine};
use crate::util::EPSILON;

/// Feed rate assumed until the first F word, in units per minute.
const DEFAULT_FEED_RATE: f64 = 6000.0;

const MM_PER_INCH: f64 = 25.4;

/// Static machine description.  The defaults match the reference
/// machine: 1/16 microstepping, XY axes on an MXL belt, Z on a
/// leadscrew, and a 16 MHz stepper clock.
#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub usteps_per_mm: [f64; 3],
    pub ticks_per_sec: f64,
    /// Rapid (G0) rate, in units per minute.
    pub traverse_rate: f64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            // XY: 200 steps/rev, 20-tooth pulley, 0.08"/tooth belt.
            // Z: 48:20 reduction into a 1/20" pitch screw.
            usteps_per_mm: [16.0 / 0.2032, 16.0 / 0.2032, 16.0 / 0.001_219_2],
            ticks_per_sec: 16_000_000.0,
            traverse_rate: 6000.0,
        }
    }
}

/// One machine-facing command.  Durations and pulse widths are in
/// stepper clock ticks, distances in microsteps.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    EnableMotors,
    DisableMotors,
    Move { dx: i64, dy: i64, dz: i64, ticks: u64 },
    Dwell { ticks: u64 },
    Home,
    SelectLaser(Option<Laser>),
    LaserOn(Laser),
    LasersOff,
    LaserPower(f64),
    PulseWidth { ticks: u64 },
    PulseMode(PulseMode),
    Pulses(u64),
    Illumination(f64),
    LowVoltage(bool),
    HighVoltage(bool),
    Water(bool),
    Air(bool),
    EmergencyStop,
}

/// One axis: position in current work units and in microsteps, plus the
/// conversion ratio (which changes with G20/G21).
#[derive(Clone, Copy, Debug)]
struct AxisPos {
    units: f64,
    usteps: i64,
    usteps_per_unit: f64,
}

impl AxisPos {
    fn new(usteps_per_unit: f64) -> Self {
        AxisPos { units: 0.0, usteps: 0, usteps_per_unit }
    }
}

pub struct LaserExec {
    axes: [AxisPos; 3],
    ticks_per_sec: f64,
    distance_mode: DistanceMode,
    units: Units,
    /// False until the first G28; absolute moves are rejected before.
    position_known: bool,
    feed_rate: f64,
    traverse_rate: f64,
    pulse_mode: PulseMode,
    /// Timed-mode pulse width, once configured.
    pulse_ticks: Option<u64>,
    /// Distance-mode pulse spacing in microsteps, once configured.
    usteps_per_pulse: Option<f64>,
    selected: Option<Laser>,
    main_on: bool,
    visible_on: bool,
    power: Option<f64>,
    out: Vec<Directive>,
    message: Option<String>,
}

impl Default for LaserExec {
    fn default() -> Self {
        LaserExec::new(MachineConfig::default())
    }
}

impl LaserExec {
    pub fn new(config: MachineConfig) -> Self {
        LaserExec {
            axes: [
                AxisPos::new(config.usteps_per_mm[0]),
                AxisPos::new(config.usteps_per_mm[1]),
                AxisPos::new(config.usteps_per_mm[2]),
            ],
            ticks_per_sec: config.ticks_per_sec,
            distance_mode: DistanceMode::default(),
            units: Units::default(),
            position_known: false,
            feed_rate: DEFAULT_FEED_RATE,
            traverse_rate: config.traverse_rate,
            pulse_mode: PulseMode::default(),
            pulse_ticks: None,
            usteps_per_pulse: None,
            selected: None,
            main_on: false,
            visible_on: false,
            power: None,
            out: Vec::new(),
            message: None,
        }
    }

    /// Drain the directives emitted since the last call.
    pub fn take_directives(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.out)
    }

    /// The last `(MSG, ...)` comment seen, if any.
    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    pub fn position(&self) -> [f64; 3] {
        [self.axes[0].units, self.axes[1].units, self.axes[2].units]
    }

    /// Ticks per microstep at the given rate (units per minute).  The
    /// machine has a single step clock, scaled by the X axis ratio.
    fn interval(&self, rate: f64) -> f64 {
        self.ticks_per_sec / (rate / 60.0 * self.axes[0].usteps_per_unit)
    }

    /// The new unit position for one axis, or an error when the word
    /// is absolute and the machine has not been homed.
    fn axis_target(&self, axis: usize, letter: char,
                   word: Option<f64>) -> Result<f64, SemanticError> {
        match (word, self.distance_mode) {
            (None, _) => Ok(self.axes[axis].units),
            (Some(v), DistanceMode::Relative) => Ok(self.axes[axis].units + v),
            (Some(v), DistanceMode::Absolute) => {
                if !self.position_known {
                    return Err(SemanticError::PositionUnknown(letter));
                }
                Ok(v)
            }
        }
    }

    /// Move all axes to the given unit positions in one coordinated
    /// segment.  Deltas are rounded to whole microsteps against the
    /// tracked microstep position, so rounding never accumulates.
    fn move_to(&mut self, target: [f64; 3], rate: f64) {
        let mut delta = [0i64; 3];
        let mut dist2 = 0.0;
        for i in 0..3 {
            let usteps = (target[i] * self.axes[i].usteps_per_unit).round() as i64;
            delta[i] = usteps - self.axes[i].usteps;
            dist2 += (delta[i] as f64) * (delta[i] as f64);
            self.axes[i].units = target[i];
            self.axes[i].usteps = usteps;
        }
        if delta == [0, 0, 0] {
            return;
        }
        let dist = dist2.sqrt();
        let ticks = (dist * self.interval(rate)).round() as u64;
        self.out.push(Directive::Move { dx: delta[0], dy: delta[1], dz: delta[2], ticks });
        if self.main_on && self.pulse_mode == PulseMode::Distance {
            if let Some(upp) = self.usteps_per_pulse {
                self.out.push(Directive::Pulses((dist / upp).round() as u64));
            }
        }
    }

    /// Update the sticky feed rate from an F word.  A rate that is not
    /// positive has no usable step interval and is rejected here,
    /// before it can stick.
    fn set_feed_rate(&mut self, args: &Args) -> Result<(), SemanticError> {
        if let Some(f) = args.get('F') {
            if f <= 0.0 {
                return Err(SemanticError::BadFeedRate(f));
            }
            self.feed_rate = f;
        }
        Ok(())
    }

    fn linear(&mut self, args: &Args, rapid: bool) -> ExecResult {
        self.set_feed_rate(args)?;
        let rate = if rapid { self.traverse_rate } else { self.feed_rate };
        if rate <= 0.0 {
            return Err(SemanticError::BadFeedRate(rate));
        }
        let target = [
            self.axis_target(0, 'X', args.get('X'))?,
            self.axis_target(1, 'Y', args.get('Y'))?,
            self.axis_target(2, 'Z', args.get('Z'))?,
        ];
        self.move_to(target, rate);
        Ok(None)
    }

    fn arc(&mut self, args: &Args, clockwise: bool) -> ExecResult {
        let to = (
            self.axis_target(0, 'X', args.get('X'))?,
            self.axis_target(1, 'Y', args.get('Y'))?,
        );
        let from = (self.axes[0].units, self.axes[1].units);
        let offset = match (args.get('I'), args.get('J')) {
            (None, None) => None,
            (i, j) => Some((i.unwrap_or(0.0), j.unwrap_or(0.0))),
        };
        self.set_feed_rate(args)?;
        let waypoints = plan_arc(args.code(), from, to, offset, args.get('R'),
                                 clockwise, self.units)?;
        let z = self.axes[2].units;
        let rate = self.feed_rate;
        for (x, y) in waypoints {
            self.move_to([x, y, z], rate);
        }
        Ok(None)
    }

    fn g0(&mut self, args: &Args) -> ExecResult {
        self.linear(args, true)
    }

    fn g1(&mut self, args: &Args) -> ExecResult {
        self.linear(args, false)
    }

    fn g2(&mut self, args: &Args) -> ExecResult {
        self.arc(args, true)
    }

    fn g3(&mut self, args: &Args) -> ExecResult {
        self.arc(args, false)
    }

    fn g4(&mut self, args: &Args) -> ExecResult {
        let seconds = args.require('P')?;
        self.out.push(Directive::Dwell {
            ticks: (seconds * self.ticks_per_sec).round() as u64,
        });
        Ok(None)
    }

    fn g28(&mut self, _args: &Args) -> ExecResult {
        for axis in &mut self.axes {
            axis.units = 0.0;
            axis.usteps = 0;
        }
        self.position_known = true;
        self.out.push(Directive::Home);
        Ok(None)
    }

    fn set_units(&mut self, units: Units) -> ExecResult {
        if self.units != units {
            // Rescale positions and ratios in place; microstep counts
            // are unit-independent and stay put.
            let factor = match units {
                Units::Inch => MM_PER_INCH,
                Units::Mm => 1.0 / MM_PER_INCH,
            };
            for axis in &mut self.axes {
                axis.units /= factor;
                axis.usteps_per_unit *= factor;
            }
            self.units = units;
        }
        Ok(None)
    }

    fn g20(&mut self, _args: &Args) -> ExecResult {
        self.set_units(Units::Inch)
    }

    fn g21(&mut self, _args: &Args) -> ExecResult {
        self.set_units(Units::Mm)
    }

    fn g90(&mut self, _args: &Args) -> ExecResult {
        self.distance_mode = DistanceMode::Absolute;
        Ok(None)
    }

    fn g91(&mut self, _args: &Args) -> ExecResult {
        self.distance_mode = DistanceMode::Relative;
        Ok(None)
    }

    fn m0(&mut self, _args: &Args) -> ExecResult {
        Ok(Some(ControlAction::Pause))
    }

    fn m1(&mut self, _args: &Args) -> ExecResult {
        Ok(Some(ControlAction::OptionalPause))
    }

    fn m2(&mut self, _args: &Args) -> ExecResult {
        Ok(Some(ControlAction::EndProgram))
    }

    fn m112(&mut self, _args: &Args) -> ExecResult {
        self.main_on = false;
        self.visible_on = false;
        self.out.push(Directive::EmergencyStop);
        Ok(Some(ControlAction::EmergencyStop))
    }

    /// M3: enable the cutting laser.  Needs a configured pulse mode and
    /// a power level (from this line's S word or an earlier one).
    fn m3(&mut self, args: &Args) -> ExecResult {
        if self.visible_on {
            return Err(SemanticError::LaserBusy(Laser::Main, Laser::Visible));
        }
        if self.pulse_mode == PulseMode::Off {
            return Err(SemanticError::PulseModeUnset);
        }
        if let Some(power) = args.get('S') {
            if self.power != Some(power) {
                self.out.push(Directive::LaserPower(power));
            }
            self.power = Some(power);
        }
        if self.power.is_none() {
            return Err(SemanticError::PowerUnset);
        }
        self.main_on = true;
        self.out.push(Directive::LaserOn(Laser::Main));
        Ok(None)
    }

    /// M4: enable the visible alignment laser.  It only lights up the
    /// work, so neither power nor a pulse mode is required.
    fn m4(&mut self, _args: &Args) -> ExecResult {
        if self.main_on {
            return Err(SemanticError::LaserBusy(Laser::Visible, Laser::Main));
        }
        self.visible_on = true;
        self.out.push(Directive::LaserOn(Laser::Visible));
        Ok(None)
    }

    fn m5(&mut self, _args: &Args) -> ExecResult {
        self.main_on = false;
        self.visible_on = false;
        self.out.push(Directive::LasersOff);
        Ok(None)
    }

    fn m6(&mut self, args: &Args) -> ExecResult {
        let tool = args.require('T')?;
        if (tool - tool.round()).abs() > EPSILON {
            return Err(SemanticError::BadToolNumber(tool));
        }
        self.selected = match tool.round() as i64 {
            0 => None,
            1 => Some(Laser::Main),
            2 => Some(Laser::Visible),
            _ => return Err(SemanticError::BadToolNumber(tool)),
        };
        self.out.push(Directive::SelectLaser(self.selected));
        Ok(None)
    }

    fn m17(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::EnableMotors);
        Ok(None)
    }

    fn m18(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::DisableMotors);
        Ok(None)
    }

    fn m80(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::LowVoltage(true));
        Ok(None)
    }

    fn m81(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::LowVoltage(false));
        Ok(None)
    }

    fn m102(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::HighVoltage(true));
        Ok(None)
    }

    fn m103(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::HighVoltage(false));
        Ok(None)
    }

    fn m104(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::Water(true));
        Ok(None)
    }

    fn m105(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::Water(false));
        Ok(None)
    }

    fn m106(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::Air(true));
        Ok(None)
    }

    fn m107(&mut self, _args: &Args) -> ExecResult {
        self.out.push(Directive::Air(false));
        Ok(None)
    }

    fn m108(&mut self, _args: &Args) -> ExecResult {
        self.pulse_mode = PulseMode::Off;
        self.out.push(Directive::PulseMode(PulseMode::Off));
        Ok(None)
    }

    fn m109(&mut self, _args: &Args) -> ExecResult {
        self.pulse_mode = PulseMode::Continuous;
        self.out.push(Directive::PulseMode(PulseMode::Continuous));
        Ok(None)
    }

    fn m110(&mut self, args: &Args) -> ExecResult {
        if let Some(seconds) = args.get('P') {
            self.pulse_ticks = Some((seconds * self.ticks_per_sec).round() as u64);
        }
        let ticks = self.pulse_ticks.ok_or(SemanticError::PulseLengthUnset)?;
        self.pulse_mode = PulseMode::Timed;
        self.out.push(Directive::PulseWidth { ticks });
        self.out.push(Directive::PulseMode(PulseMode::Timed));
        Ok(None)
    }

    fn m111(&mut self, args: &Args) -> ExecResult {
        if let Some(units) = args.get('Q') {
            self.usteps_per_pulse = Some(units * self.axes[0].usteps_per_unit);
        }
        if self.usteps_per_pulse.is_none() {
            return Err(SemanticError::PulseDistanceUnset);
        }
        self.pulse_mode = PulseMode::Distance;
        self.out.push(Directive::PulseMode(PulseMode::Distance));
        Ok(None)
    }

    fn m113(&mut self, args: &Args) -> ExecResult {
        // P defaults to full brightness.
        self.out.push(Directive::Illumination(args.require('P')?));
        Ok(None)
    }
}

fn comment_hook(exec: &mut LaserExec, line: &ParsedLine) -> ExecResult {
    if let Some(comment) = &line.comment {
        let (hdr, text) = split_comment(comment);
        if hdr.map_or(false, |h| h.eq_ignore_ascii_case("MSG")) {
            let text = text.trim();
            tracing::info!(message = text, "program message");
            exec.message = Some(text.to_string());
        } else {
            tracing::debug!(comment = comment.as_str(), "comment");
        }
    }
    Ok(None)
}

fn motion_refire(refire: &Refire) -> bool {
    refire.has_unclaimed(&['X', 'Y', 'Z'])
}

fn motion_finish(settings: &mut Settings) {
    settings.clear(&['X', 'Y', 'Z', 'I', 'J', 'R']);
}

impl Executor for LaserExec {
    fn dialect() -> Dialect<Self> {
        DialectBuilder::new()
            .modal_group("low voltage", |g| {
                g.code("M80", &[], Self::m80)
                 .code("M81", &[], Self::m81);
            })
            .modal_group("high voltage", |g| {
                g.code("M102", &[], Self::m102)
                 .code("M103", &[], Self::m103);
            })
            .nonmodal_group("illumination", |g| {
                g.code("M113", &['P'], Self::m113)
                 .default_arg('P', 1.0);
            })
            .nonmodal_group("tool change", |g| {
                g.code("M6", &['T'], Self::m6);
            })
            .modal_group("laser", |g| {
                g.code("M3", &['S'], Self::m3)
                 .code("M4", &[], Self::m4)
                 .code("M5", &[], Self::m5);
            })
            .modal_group("water", |g| {
                g.code("M104", &[], Self::m104)
                 .code("M105", &[], Self::m105);
            })
            .modal_group("air", |g| {
                g.code("M106", &[], Self::m106)
                 .code("M107", &[], Self::m107);
            })
            .modal_group("pulse mode", |g| {
                g.code("M108", &[], Self::m108)
                 .code("M109", &[], Self::m109)
                 .code("M110", &['P'], Self::m110)
                 .code("M111", &['Q'], Self::m111);
            })
            .modal_group("motors", |g| {
                g.code("M17", &[], Self::m17)
                 .code("M18", &[], Self::m18);
            })
            .nonmodal_group("dwell", |g| {
                g.code("G4", &['P'], Self::g4);
            })
            .modal_group("units", |g| {
                g.code("G20", &[], Self::g20)
                 .code("G21", &[], Self::g21);
            })
            .modal_group("distance mode", |g| {
                g.code("G90", &[], Self::g90)
                 .code("G91", &[], Self::g91);
            })
            .nonmodal_group("homing", |g| {
                g.code("G28", &[], Self::g28);
            })
            .modal_group("motion", |g| {
                g.code("G0", &['X', 'Y', 'Z'], Self::g0)
                 .code("G1", &['X', 'Y', 'Z', 'F'], Self::g1)
                 .code("G2", &['X', 'Y', 'I', 'J', 'R', 'F'], Self::g2)
                 .require_any(&['X', 'Y'])
                 .code("G3", &['X', 'Y', 'I', 'J', 'R', 'F'], Self::g3)
                 .require_any(&['X', 'Y'])
                 .prepare(motion_refire)
                 .finish(motion_finish);
            })
            .nonmodal_group("stopping", |g| {
                g.code("M0", &[], Self::m0)
                 .code("M1", &[], Self::m1)
                 .code("M2", &[], Self::m2)
                 .code("M112", &[], Self::m112);
            })
            .order(vec![
                Step::Hook(comment_hook),
                Step::Group("low voltage"),
                Step::Group("high voltage"),
                Step::Group("illumination"),
                Step::Group("tool change"),
                Step::Group("laser"),
                Step::Group("water"),
                Step::Group("air"),
                Step::Group("pulse mode"),
                Step::Group("motors"),
                Step::Group("dwell"),
                Step::Group("units"),
                Step::Group("distance mode"),
                Step::Group("homing"),
                Step::Group("motion"),
                Step::Group("stopping"),
            ])
            .build()
    }
}
