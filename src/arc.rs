// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! XY-plane arc interpolation.
//!
//! Arcs are flattened into short chords here, host-side; the firmware
//! only ever sees linear moves.  Chord endpoints are generated with a
//! small-angle rotation that is re-seeded from exact trigonometry every
//! few segments, so rounding drift cannot accumulate over long arcs.

use crate::eval::{SemanticError, Units};
use crate::util::EPSILON;

/// Target chord length; arcs are cut into segments of roughly this arc
/// length.
const MM_PER_ARC_SEGMENT: f64 = 0.5;

/// Re-seed the incremental rotation with exact sin/cos every this many
/// segments.
const N_ARC_CORRECTION: usize = 25;

const ARC_TOLERANCE_MM: f64 = 0.002;
const ARC_TOLERANCE_INCH: f64 = 0.0002;

/// Flatten one arc into successive XY waypoints, ending exactly at
/// `to`.  Exactly one of `offset` (center form, I/J relative to the
/// start point) and `radius` (R form) must be given; `code` is only
/// used in error messages.
pub(crate) fn plan_arc(code: &str, from: (f64, f64), to: (f64, f64),
                       offset: Option<(f64, f64)>, radius: Option<f64>,
                       clockwise: bool, units: Units)
                       -> Result<Vec<(f64, f64)>, SemanticError> {
    let offset = match (offset, radius) {
        (Some(_), Some(_)) => return Err(SemanticError::ArcCenterAndRadius(code.to_string())),
        (None, None) => return Err(SemanticError::ArcUnspecified(code.to_string())),
        (Some(offset), None) => offset,
        (None, Some(radius)) => offset_from_radius(from, to, radius, clockwise)?,
    };

    let center = (from.0 + offset.0, from.1 + offset.1);
    let r0 = (-offset.0, -offset.1);
    let r1 = (to.0 - center.0, to.1 - center.1);
    let radius = (r0.0 * r0.0 + r0.1 * r0.1).sqrt();

    // The destination must lie on the circle through the start point.
    let tolerance = match units {
        Units::Mm => ARC_TOLERANCE_MM,
        Units::Inch => ARC_TOLERANCE_INCH,
    };
    let dest_radius = (r1.0 * r1.0 + r1.1 * r1.1).sqrt();
    if (dest_radius - radius).abs() > tolerance {
        return Err(SemanticError::OffArc(to.0, to.1));
    }

    let mut angle = (r0.0 * r1.1 - r0.1 * r1.0).atan2(r0.0 * r1.0 + r0.1 * r1.1);
    // atan2 yields the short way around; go the long way when its sign
    // disagrees with the requested direction.  A zero sweep stays zero,
    // so an arc back to its own start point is not a full circle.
    if clockwise && angle > 0.0 {
        angle -= 2.0 * std::f64::consts::PI;
    } else if !clockwise && angle < 0.0 {
        angle += 2.0 * std::f64::consts::PI;
    }

    let mm_per_unit = match units {
        Units::Mm => 1.0,
        Units::Inch => 25.4,
    };
    let arc_length = angle.abs() * radius * mm_per_unit;
    let segments = ((arc_length / MM_PER_ARC_SEGMENT).floor() as usize).max(1);
    let theta = angle / segments as f64;

    // Second-order small-angle rotation per segment, with a periodic
    // exact re-seed.
    let cos_t = 1.0 - theta * theta / 2.0;
    let sin_t = theta;
    let mut waypoints = Vec::with_capacity(segments);
    let mut r = r0;
    for i in 1..segments {
        if i % N_ARC_CORRECTION == 0 {
            let (sin_a, cos_a) = (theta * i as f64).sin_cos();
            r = (r0.0 * cos_a - r0.1 * sin_a, r0.0 * sin_a + r0.1 * cos_a);
        } else {
            r = (r.0 * cos_t - r.1 * sin_t, r.0 * sin_t + r.1 * cos_t);
        }
        waypoints.push((center.0 + r.0, center.1 + r.1));
    }
    waypoints.push(to);
    Ok(waypoints)
}

/// Convert an R-form arc to a center offset: of the two circles of the
/// given radius through both endpoints, a positive R picks the one
/// spanning at most a half turn, a negative R the other.
fn offset_from_radius(from: (f64, f64), to: (f64, f64), radius: f64,
                      clockwise: bool) -> Result<(f64, f64), SemanticError> {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let chord = (dx * dx + dy * dy).sqrt();
    if chord < EPSILON {
        // A full circle can't be specified in R form.
        return Err(SemanticError::ArcRadiusTooSmall(radius));
    }
    let disc = 4.0 * radius * radius - chord * chord;
    if disc < 0.0 {
        return Err(SemanticError::ArcRadiusTooSmall(radius));
    }
    let mut h_x2_div_d = -disc.sqrt() / chord;
    if !clockwise {
        h_x2_div_d = -h_x2_div_d;
    }
    if radius < 0.0 {
        h_x2_div_d = -h_x2_div_d;
    }
    Ok((0.5 * (dx - dy * h_x2_div_d), 0.5 * (dy + dx * h_x2_div_d)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: (f64, f64), b: (f64, f64)) {
        assert!((a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9,
                "{:?} != {:?}", a, b);
    }

    #[test]
    fn half_circle_center_form() {
        // CW half circle from (0,0) to (10,0) around (5,0).
        let pts = plan_arc("G2", (0.0, 0.0), (10.0, 0.0), Some((5.0, 0.0)), None,
                           true, Units::Mm).unwrap();
        // pi * 5 mm of travel at 0.5 mm per segment.
        assert_eq!(pts.len(), 31);
        assert_close(*pts.last().unwrap(), (10.0, 0.0));
        // All waypoints stay close to the circle, in the upper half
        // plane (clockwise from the start at 180 degrees).
        for &(x, y) in &pts {
            let r = ((x - 5.0).powi(2) + y * y).sqrt();
            assert!((r - 5.0).abs() < 0.01, "waypoint off circle: ({}, {})", x, y);
            assert!(y >= -1e-9);
        }
    }

    #[test]
    fn zero_sweep() {
        // Destination equal to the start point sweeps nothing, rather
        // than a full circle.
        let pts = plan_arc("G2", (0.0, 0.0), (0.0, 0.0), Some((5.0, 0.0)), None,
                           true, Units::Mm).unwrap();
        assert_eq!(pts, vec![(0.0, 0.0)]);
    }

    #[test]
    fn destination_off_circle() {
        let err = plan_arc("G2", (0.0, 0.0), (10.0, 1.0), Some((5.0, 0.0)), None,
                           true, Units::Mm).unwrap_err();
        assert_eq!(err, SemanticError::OffArc(10.0, 1.0));
    }

    #[test]
    fn radius_form_quarter_circle() {
        // CCW quarter circle from (10,0) to (0,10), center at origin.
        let offset = offset_from_radius((10.0, 0.0), (0.0, 10.0), 10.0, false).unwrap();
        assert_close(offset, (-10.0, 0.0));
        // And negative R picks the long way round.
        let offset = offset_from_radius((10.0, 0.0), (0.0, 10.0), -10.0, false).unwrap();
        assert_close(offset, (0.0, 10.0));
    }

    #[test]
    fn radius_too_small() {
        let err = plan_arc("G3", (0.0, 0.0), (10.0, 0.0), None, Some(4.0),
                           false, Units::Mm).unwrap_err();
        assert_eq!(err, SemanticError::ArcRadiusTooSmall(4.0));
    }

    #[test]
    fn conflicting_forms() {
        let err = plan_arc("G2", (0.0, 0.0), (1.0, 1.0), Some((1.0, 0.0)), Some(1.0),
                           true, Units::Mm).unwrap_err();
        assert_eq!(err, SemanticError::ArcCenterAndRadius("G2".into()));
    }
}
