// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

use kerf::eval::{Args, ControlAction, Dialect, DialectBuilder, Error, ExecResult,
                 Executor, Interpreter, Laser, LineStream, PulseMode, Refire,
                 SemanticError, Settings, Step};
use kerf::laser::{Directive, LaserExec, MachineConfig};
use kerf::scan::SyntaxErrorKind;

fn syntax_err<T: std::fmt::Debug>(res: Result<T, Error>) -> SyntaxErrorKind {
    match res.unwrap_err() {
        Error::Syntax(e) => e.kind,
        e => panic!("expected syntax error, got: {}", e),
    }
}

fn semantic_err<T: std::fmt::Debug>(res: Result<T, Error>) -> SemanticError {
    match res.unwrap_err() {
        Error::Semantic(e) => e,
        e => panic!("expected semantic error, got: {}", e),
    }
}

// A minimal executor exercising the registry mechanics in isolation.

#[derive(Default)]
struct Toggle {
    log: Vec<String>,
}

fn opt(v: Option<f64>) -> String {
    v.map_or("-".to_string(), |v| v.to_string())
}

impl Toggle {
    fn g1(&mut self, args: &Args) -> ExecResult {
        self.log.push(format!("g1 {} {}", opt(args.get('X')), opt(args.get('Y'))));
        Ok(None)
    }

    fn g2(&mut self, args: &Args) -> ExecResult {
        self.log.push(format!("g2 {}", opt(args.get('X'))));
        Ok(None)
    }

    fn m7(&mut self, args: &Args) -> ExecResult {
        self.log.push(format!("m7 {}", opt(args.get('P'))));
        Ok(None)
    }

    fn m9(&mut self, _args: &Args) -> ExecResult {
        Ok(Some(ControlAction::Pause))
    }
}

fn axis_refire(refire: &Refire) -> bool {
    refire.has_unclaimed(&['X', 'Y'])
}

fn clear_axes(settings: &mut Settings) {
    settings.clear(&['X', 'Y']);
}

impl Executor for Toggle {
    fn dialect() -> Dialect<Self> {
        DialectBuilder::new()
            .modal_group("motion", |g| {
                g.code("G1", &['X', 'Y'], Toggle::g1)
                 .code("G2", &['X'], Toggle::g2)
                 .prepare(axis_refire)
                 .finish(clear_axes);
            })
            .nonmodal_group("aux", |g| {
                g.code("M7", &['X', 'P'], Toggle::m7)
                 .require_any(&['P'])
                 .code("M9", &[], Toggle::m9);
            })
            .order(vec![Step::Group("aux"), Step::Group("motion")])
            .build()
    }
}

fn toggle() -> Interpreter<Toggle> {
    Interpreter::new(Toggle::default())
}

fn feed(interp: &mut Interpreter<Toggle>, lines: &[&str]) {
    for (i, line) in lines.iter().enumerate() {
        interp.interpret_line(line, "<test>", i + 1)
            .unwrap_or_else(|e| panic!("line {:?} failed: {}", line, e));
    }
}

#[test]
fn test_unknown_code() {
    let mut interp = toggle();
    assert_eq!(syntax_err(interp.interpret_line("G9 X1", "<test>", 1)),
               SyntaxErrorKind::UnknownCode("G9".into()));
}

#[test]
fn test_approximate_code_match() {
    let mut interp = toggle();
    feed(&mut interp, &["G1.00005 X1"]);
    assert_eq!(interp.executor().log, vec!["g1 1 -"]);
    assert_eq!(syntax_err(interp.interpret_line("G1.001 X1", "<test>", 2)),
               SyntaxErrorKind::UnknownCode("G1.001".into()));
}

#[test]
fn test_modal_conflict() {
    let mut interp = toggle();
    assert_eq!(syntax_err(interp.interpret_line("G1 G2 X1", "<test>", 1)),
               SyntaxErrorKind::ConflictingCodes("G1".into(), "G2".into(), "motion"));
    // An exact duplicate is not a conflict; the code runs once.
    feed(&mut interp, &["G1 G1 X1"]);
    assert_eq!(interp.executor().log, vec!["g1 1 -"]);
}

#[test]
fn test_ambiguous_word() {
    let mut interp = toggle();
    assert_eq!(syntax_err(interp.interpret_line("G1 M7 X1 P1", "<test>", 1)),
               SyntaxErrorKind::AmbiguousWord('X', "G1".into(), "M7".into()));
}

#[test]
fn test_required_word() {
    let mut interp = toggle();
    assert_eq!(syntax_err(interp.interpret_line("M7 X1", "<test>", 1)),
               SyntaxErrorKind::MissingRequiredWord("M7".into(), "P".into()));
}

#[test]
fn test_sticky_modal_refire() {
    let mut interp = toggle();
    feed(&mut interp, &["G1 X1 Y2", "X3", "G2 X4", "X5"]);
    // Y does not survive to the second line: the finish hook clears it.
    assert_eq!(interp.executor().log, vec!["g1 1 2", "g1 3 -", "g2 4", "g2 5"]);
}

#[test]
fn test_claimed_words_do_not_refire() {
    let mut interp = toggle();
    feed(&mut interp, &["G1 X1", "M7 X2 P1"]);
    // The X of the second line is claimed by M7, so G1 must not re-fire.
    assert_eq!(interp.executor().log, vec!["g1 1 -", "m7 1"]);
    // But the setting is sticky: aux has no finish hook clearing X.
    feed(&mut interp, &["G1"]);
    assert_eq!(interp.executor().log.last().unwrap(), "g1 2 -");
}

#[test]
fn test_action_stops_line() {
    let mut interp = toggle();
    let action = interp.interpret_line("M9 G1 X1 P1", "<test>", 1).unwrap();
    assert_eq!(action, Some(ControlAction::Pause));
    // aux runs before motion, so G1 never executed.
    assert!(interp.executor().log.is_empty());
}

#[test]
fn test_block_delete() {
    let mut interp = toggle();
    feed(&mut interp, &["/G1 X1"]);
    assert!(interp.executor().log.is_empty());
    interp.evaluate_blockdel(true);
    feed(&mut interp, &["/G1 X1"]);
    assert_eq!(interp.executor().log, vec!["g1 1 -"]);
}

// The laser machine dialect, end to end.  A round microstep scale makes
// the expected numbers easy to check: 10 usteps/mm, 16 MHz clock, so
// F600 (10 mm/s = 100 usteps/s) gives 160000 ticks per microstep.

fn machine() -> Interpreter<LaserExec> {
    Interpreter::new(LaserExec::new(MachineConfig {
        usteps_per_mm: [10.0, 10.0, 10.0],
        ticks_per_sec: 16_000_000.0,
        traverse_rate: 600.0,
    }))
}

fn run_lines(interp: &mut Interpreter<LaserExec>, lines: &[&str]) -> Vec<Directive> {
    for (i, line) in lines.iter().enumerate() {
        interp.interpret_line(line, "<test>", i + 1)
            .unwrap_or_else(|e| panic!("line {:?} failed: {}", line, e));
    }
    interp.executor_mut().take_directives()
}

#[test]
fn test_linear_move() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["G28", "G1 X10 F600"]),
               vec![Directive::Home,
                    Directive::Move { dx: 100, dy: 0, dz: 0, ticks: 16_000_000 }]);
    assert_eq!(interp.executor().position(), [10.0, 0.0, 0.0]);
}

#[test]
fn test_traverse_move() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["G28", "G0 Y-10"]),
               vec![Directive::Home,
                    Directive::Move { dx: 0, dy: -100, dz: 0, ticks: 16_000_000 }]);
}

#[test]
fn test_zero_length_move() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["G28", "G1 X0 F600"]),
               vec![Directive::Home]);
}

#[test]
fn test_absolute_needs_homing() {
    let mut interp = machine();
    assert_eq!(semantic_err(interp.interpret_line("G1 X10 F600", "<test>", 1)),
               SemanticError::PositionUnknown('X'));
    // Relative motion is fine without a known position.
    assert_eq!(run_lines(&mut interp, &["G91 G1 X10 F600"]),
               vec![Directive::Move { dx: 100, dy: 0, dz: 0, ticks: 16_000_000 }]);
}

#[test]
fn test_sticky_motion() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["G28", "G1 X5 F600", "X3"]),
               vec![Directive::Home,
                    Directive::Move { dx: 50, dy: 0, dz: 0, ticks: 8_000_000 },
                    Directive::Move { dx: -20, dy: 0, dz: 0, ticks: 3_200_000 }]);
    assert_eq!(interp.executor().position(), [3.0, 0.0, 0.0]);
}

#[test]
fn test_inch_mode() {
    let mut interp = machine();
    // One inch at 60 in/min: 254 usteps in exactly one second.
    assert_eq!(run_lines(&mut interp, &["G28", "G20", "G1 X1 F60"]),
               vec![Directive::Home,
                    Directive::Move { dx: 254, dy: 0, dz: 0, ticks: 16_000_000 }]);
    assert_eq!(interp.executor().position(), [1.0, 0.0, 0.0]);
}

#[test]
fn test_arc() {
    let mut interp = machine();
    let dirs = run_lines(&mut interp, &["G28", "G2 X10 Y0 I5 J0 F600"]);
    assert_eq!(dirs[0], Directive::Home);
    let moves: Vec<(i64, i64)> = dirs[1..].iter().map(|d| match d {
        Directive::Move { dx, dy, .. } => (*dx, *dy),
        other => panic!("expected a move, got {:?}", other),
    }).collect();
    // A half circle of radius 5 mm is about 15.7 mm of travel, cut into
    // 0.5 mm segments.
    assert_eq!(moves.len(), 31);
    assert_eq!(moves.iter().map(|m| m.0).sum::<i64>(), 100);
    assert_eq!(moves.iter().map(|m| m.1).sum::<i64>(), 0);
    assert_eq!(interp.executor().position(), [10.0, 0.0, 0.0]);
}

#[test]
fn test_zero_sweep_arc() {
    // An arc back to its own start point sweeps nothing at all; it is
    // not a full circle.
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["G28", "G2 X0 Y0 I5 F600"]),
               vec![Directive::Home]);
    assert_eq!(interp.executor().position(), [0.0, 0.0, 0.0]);
}

#[test]
fn test_feed_rate_must_be_positive() {
    let mut interp = machine();
    run_lines(&mut interp, &["G28"]);
    assert_eq!(semantic_err(interp.interpret_line("G1 X10 F0", "<test>", 2)),
               SemanticError::BadFeedRate(0.0));
    assert_eq!(semantic_err(interp.interpret_line("G1 X10 F-600", "<test>", 3)),
               SemanticError::BadFeedRate(-600.0));
    // Nothing moved, and a valid rate recovers.
    assert_eq!(interp.executor_mut().take_directives(), vec![]);
    assert_eq!(run_lines(&mut interp, &["G1 X10 F600"]),
               vec![Directive::Move { dx: 100, dy: 0, dz: 0, ticks: 16_000_000 }]);
}

/// Home a fresh machine, then interpret one more line.  Keeps the arc
/// error cases below independent: a failing line still merges its words
/// into the sticky settings.
fn homed_line(line: &str) -> Result<Option<ControlAction>, Error> {
    let mut interp = machine();
    run_lines(&mut interp, &["G28"]);
    interp.interpret_line(line, "<test>", 2)
}

#[test]
fn test_arc_errors() {
    assert_eq!(semantic_err(homed_line("G2 X10 Y1 I5 J0 F600")),
               SemanticError::OffArc(10.0, 1.0));
    assert_eq!(semantic_err(homed_line("G2 X10 I5 R5")),
               SemanticError::ArcCenterAndRadius("G2".into()));
    assert_eq!(semantic_err(homed_line("G2 X10")),
               SemanticError::ArcUnspecified("G2".into()));
    assert_eq!(semantic_err(homed_line("G2 X10 R4")),
               SemanticError::ArcRadiusTooSmall(4.0));
    assert_eq!(syntax_err(homed_line("G2 I5")),
               SyntaxErrorKind::MissingRequiredWord("G2".into(), "X Y".into()));
}

#[test]
fn test_radius_form_arc() {
    let mut interp = machine();
    let dirs = run_lines(&mut interp, &["G28", "G3 X10 Y0 R5 F600"]);
    let (sum_x, sum_y) = dirs[1..].iter().fold((0, 0), |acc, d| match d {
        Directive::Move { dx, dy, .. } => (acc.0 + dx, acc.1 + dy),
        other => panic!("expected a move, got {:?}", other),
    });
    assert_eq!((sum_x, sum_y), (100, 0));
    assert_eq!(interp.executor().position(), [10.0, 0.0, 0.0]);
}

#[test]
fn test_laser_ordering() {
    let mut interp = machine();
    assert_eq!(semantic_err(interp.interpret_line("M3 S50", "<test>", 1)),
               SemanticError::PulseModeUnset);

    // A fresh machine: the failed line above already made S sticky.
    let mut interp = machine();
    run_lines(&mut interp, &["M109"]);
    assert_eq!(semantic_err(interp.interpret_line("M3", "<test>", 2)),
               SemanticError::PowerUnset);
    assert_eq!(run_lines(&mut interp, &["M3 S50"]),
               vec![Directive::LaserPower(50.0), Directive::LaserOn(Laser::Main)]);
    assert_eq!(semantic_err(interp.interpret_line("M4", "<test>", 5)),
               SemanticError::LaserBusy(Laser::Visible, Laser::Main));
    assert_eq!(run_lines(&mut interp, &["M5", "M4"]),
               vec![Directive::LasersOff, Directive::LaserOn(Laser::Visible)]);
    assert_eq!(semantic_err(interp.interpret_line("M3 S50", "<test>", 8)),
               SemanticError::LaserBusy(Laser::Main, Laser::Visible));
}

#[test]
fn test_timed_pulses() {
    let mut interp = machine();
    assert_eq!(semantic_err(interp.interpret_line("M110", "<test>", 1)),
               SemanticError::PulseLengthUnset);
    assert_eq!(run_lines(&mut interp, &["M110 P0.001"]),
               vec![Directive::PulseWidth { ticks: 16_000 },
                    Directive::PulseMode(PulseMode::Timed)]);
}

#[test]
fn test_distance_pulses() {
    let mut interp = machine();
    assert_eq!(semantic_err(interp.interpret_line("M111", "<test>", 1)),
               SemanticError::PulseDistanceUnset);
    let dirs = run_lines(&mut interp,
                         &["G28", "M109", "M3 S50", "M111 Q0.5", "G1 X10 F600"]);
    // One pulse every 0.5 mm (5 usteps) over a 100-ustep move.
    assert_eq!(dirs[dirs.len() - 2..],
               [Directive::Move { dx: 100, dy: 0, dz: 0, ticks: 16_000_000 },
                Directive::Pulses(20)]);
}

#[test]
fn test_dwell() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["G4 P0.5"]),
               vec![Directive::Dwell { ticks: 8_000_000 }]);
    // P is sticky like any word, so a bare G4 dwells again.
    assert_eq!(run_lines(&mut interp, &["G4"]),
               vec![Directive::Dwell { ticks: 8_000_000 }]);
    // Without any P ever given there is nothing to dwell for.
    let mut interp = machine();
    assert_eq!(semantic_err(interp.interpret_line("G4", "<test>", 1)),
               SemanticError::MissingWord { code: "G4".into(), letter: 'P' });
}

#[test]
fn test_ambiguous_dwell_pulse() {
    let mut interp = machine();
    assert_eq!(syntax_err(interp.interpret_line("G4 M110 P2", "<test>", 1)),
               SyntaxErrorKind::AmbiguousWord('P', "G4".into(), "M110".into()));
}

#[test]
fn test_peripherals() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["M80 M102 M104 M106 M17 M113"]),
               vec![Directive::LowVoltage(true),
                    Directive::HighVoltage(true),
                    Directive::Illumination(1.0),
                    Directive::Water(true),
                    Directive::Air(true),
                    Directive::EnableMotors]);
    assert_eq!(run_lines(&mut interp, &["M81 M103 M105 M107 M18", "M113 P0.25"]),
               vec![Directive::LowVoltage(false),
                    Directive::HighVoltage(false),
                    Directive::Water(false),
                    Directive::Air(false),
                    Directive::DisableMotors,
                    Directive::Illumination(0.25)]);
}

#[test]
fn test_tool_change() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["M6 T1", "M6 T2", "M6 T0"]),
               vec![Directive::SelectLaser(Some(Laser::Main)),
                    Directive::SelectLaser(Some(Laser::Visible)),
                    Directive::SelectLaser(None)]);
    assert_eq!(semantic_err(interp.interpret_line("M6 T5", "<test>", 4)),
               SemanticError::BadToolNumber(5.0));
    assert_eq!(semantic_err(interp.interpret_line("M6 T1.5", "<test>", 5)),
               SemanticError::BadToolNumber(1.5));
    // T is sticky, so the missing-word case needs a fresh machine.
    let mut interp = machine();
    assert_eq!(semantic_err(interp.interpret_line("M6", "<test>", 1)),
               SemanticError::MissingWord { code: "M6".into(), letter: 'T' });
}

#[test]
fn test_operator_message() {
    let mut interp = machine();
    assert_eq!(run_lines(&mut interp, &["(MSG, warm up first)"]), vec![]);
    assert_eq!(interp.executor_mut().take_message().as_deref(), Some("warm up first"));
    assert_eq!(interp.executor_mut().take_message(), None);
}

#[test]
fn test_commit_semantics() {
    // A semantic error aborts the line but keeps its parameter commits.
    let mut interp = machine();
    assert!(interp.interpret_line("#5=3 M3 S50", "<test>", 1).is_err());
    assert_eq!(interp.params().get(5), 3.0);
    // A syntax error (here: a modal conflict) commits nothing.
    assert!(interp.interpret_line("#6=1 G1 G0 X1", "<test>", 2).is_err());
    assert_eq!(interp.params().get(6), 0.0);
}

#[test]
fn test_pause_and_end() {
    let prog = "%\nG28\nM0\n\nG91 G1 X1 F600\nM2\nG1 X99\n%\n";
    let mut interp = machine();
    let mut stream = LineStream::new(prog, "<prog>");

    assert_eq!(interp.run(&mut stream).unwrap(), Some(ControlAction::Pause));
    assert_eq!(interp.executor_mut().take_directives(), vec![Directive::Home]);

    // Resuming after the pause continues with the next line; M2 then
    // ends the program before the last move.
    assert_eq!(interp.run(&mut stream).unwrap(), Some(ControlAction::EndProgram));
    assert_eq!(interp.executor_mut().take_directives(),
               vec![Directive::Move { dx: 10, dy: 0, dz: 0, ticks: 1_600_000 }]);
    assert!(stream.is_finished());
    assert_eq!(interp.run(&mut stream).unwrap(), None);
}

#[test]
fn test_emergency_stop() {
    let mut interp = machine();
    let mut stream = LineStream::new("G28\nM112\nG1 X1 F600\n", "<prog>");
    assert_eq!(interp.run(&mut stream).unwrap(), Some(ControlAction::EmergencyStop));
    assert_eq!(interp.executor_mut().take_directives(),
               vec![Directive::Home, Directive::EmergencyStop]);
    assert_eq!(interp.run(&mut stream).unwrap(), None);
}

#[test]
fn test_percent_ends_program() {
    // The second % ends the stream; the M3 after it (which would be an
    // error) is never interpreted.
    let mut interp = machine();
    let mut stream = LineStream::new("%\nG28\n%\nM3\n", "<prog>");
    assert_eq!(interp.run(&mut stream).unwrap(), None);
    assert_eq!(interp.executor_mut().take_directives(), vec![Directive::Home]);
}

#[test]
fn test_stream_error_position() {
    let mut interp = machine();
    let mut stream = LineStream::new("G28\nG1 X[1/0]\n", "<prog>");
    let err = interp.run(&mut stream).unwrap_err();
    assert_eq!(err.lineno, 2);
    assert!(err.to_string().starts_with("error in line 2:"), "{}", err);
}
