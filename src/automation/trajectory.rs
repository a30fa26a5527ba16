//! Touch trajectory synthesis.
//!
//! A path from `start` to `end` is sampled at `steps` uniform time slots.
//! The progress along the chord at slot `i` is
//!
//! ```text
//! u = i / steps
//! p = (1 - s) * u + s * (3u² - 2u³)        s = smoothing / 100
//! ```
//!
//! and the point is pushed to the left of the direction of travel by
//! `c * 0.25 * |chord| * sin(pi * p)` (`c = curvature / 100`). With both
//! parameters at 0 the path is plain linear interpolation. The last waypoint
//! is always exactly `end`.

use crate::control::Point;
use rand::Rng;
use std::f64::consts::PI;

/// Largest perpendicular deviation, as a fraction of the chord length.
const MAX_BEND: f64 = 0.25;
/// Random offset per level point, in normalized screen units.
const JITTER_PER_LEVEL: f64 = 0.0003;
const JITTER_MIN: f64 = 0.001;
const JITTER_MAX: f64 = 0.999;
/// Longest motion or wait a script can ask for (one day).
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1000;
/// Most waypoints one path may have.
pub const MAX_STEPS: u32 = 1000;

/// Shape of a synthesized path. Both values are on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurveParams {
    smoothing: u8,
    curvature: u8,
}

impl CurveParams {
    pub const LINEAR: CurveParams = CurveParams {
        smoothing: 0,
        curvature: 0,
    };

    /// Values above 100 are clamped.
    pub const fn new(smoothing: u8, curvature: u8) -> Self {
        Self {
            smoothing: if smoothing > 100 { 100 } else { smoothing },
            curvature: if curvature > 100 { 100 } else { curvature },
        }
    }

    pub fn smoothing(&self) -> u8 {
        self.smoothing
    }

    pub fn curvature(&self) -> u8 {
        self.curvature
    }

    pub fn with_curvature(self, curvature: u8) -> Self {
        Self::new(self.smoothing, curvature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub at: Point,
    /// Offset from the start of the gesture
    pub t_ms: u64,
}

fn smoothstep(u: f64) -> f64 {
    u * u * (3.0 - 2.0 * u)
}

/// Samples `steps` waypoints after `start` (which is not included).
/// `steps` is clamped to `1..=MAX_STEPS` and `duration_ms` to
/// `MAX_DURATION_MS`.
pub fn synthesize(
    start: Point,
    end: Point,
    duration_ms: u64,
    steps: u32,
    params: CurveParams,
) -> Vec<Waypoint> {
    let steps = steps.clamp(1, MAX_STEPS);
    let duration_ms = duration_ms.min(MAX_DURATION_MS);
    let s = params.smoothing as f64 / 100.0;
    let c = params.curvature as f64 / 100.0;
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let chord = dx.hypot(dy);

    (1..=steps)
        .map(|i| {
            let t_ms = duration_ms * i as u64 / steps as u64;
            if i == steps {
                return Waypoint { at: end, t_ms };
            }
            let u = i as f64 / steps as f64;
            let p = if s == 0.0 {
                u
            } else {
                (1.0 - s) * u + s * smoothstep(u)
            };
            let mut at = Point::new(start.x + dx * p, start.y + dy * p);
            if c > 0.0 && chord > 0.0 {
                let bend = c * MAX_BEND * chord * (PI * p).sin();
                // left normal of (dx, dy) with y pointing down
                at.x += dy / chord * bend;
                at.y -= dx / chord * bend;
                at = at.clamped();
            }
            Waypoint { at, t_ms }
        })
        .collect()
}

/// Moves `at` by up to `level * 0.0003` on each axis, staying inside
/// `[0.001, 0.999]`. Level 0 returns `at` unchanged.
pub fn random_offset<R: Rng>(at: Point, level: u8, rng: &mut R) -> Point {
    if level == 0 {
        return at;
    }
    let amplitude = level.min(100) as f64 * JITTER_PER_LEVEL;
    Point::new(
        (at.x + rng.gen_range(-amplitude..=amplitude)).clamp(JITTER_MIN, JITTER_MAX),
        (at.y + rng.gen_range(-amplitude..=amplitude)).clamp(JITTER_MIN, JITTER_MAX),
    )
}

/// Applies [`random_offset`] to every waypoint except the last.
pub fn jitter<R: Rng>(path: &mut [Waypoint], level: u8, rng: &mut R) {
    if level == 0 || path.len() < 2 {
        return;
    }
    let last = path.len() - 1;
    for waypoint in &mut path[..last] {
        waypoint.at = random_offset(waypoint.at, level, rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const A: Point = Point::new(0.2, 0.3);
    const B: Point = Point::new(0.8, 0.6);

    #[test]
    fn linear_when_both_params_are_zero() {
        let path = synthesize(A, B, 200, 8, CurveParams::LINEAR);
        assert_eq!(path.len(), 8);
        for (i, wp) in path[..7].iter().enumerate() {
            let u = (i + 1) as f64 / 8.0;
            let expected = Point::new(A.x + (B.x - A.x) * u, A.y + (B.y - A.y) * u);
            assert_eq!(wp.at, expected, "waypoint {i}");
            assert_eq!(wp.t_ms, 25 * (i as u64 + 1));
        }
        assert_eq!(path[7], Waypoint { at: B, t_ms: 200 });
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let params = CurveParams::new(70, 45);
        assert_eq!(
            synthesize(A, B, 300, 12, params),
            synthesize(A, B, 300, 12, params)
        );
    }

    #[test]
    fn last_waypoint_is_exact_end() {
        for params in [
            CurveParams::new(100, 100),
            CurveParams::new(33, 0),
            CurveParams::new(0, 80),
        ] {
            let path = synthesize(A, B, 100, 7, params);
            assert_eq!(path.last().unwrap().at, B);
            assert_eq!(path.last().unwrap().t_ms, 100);
        }
    }

    #[test]
    fn smoothing_eases_the_ends() {
        let linear = synthesize(A, B, 100, 10, CurveParams::LINEAR);
        let eased = synthesize(A, B, 100, 10, CurveParams::new(100, 0));
        // Slower start than linear, same midpoint.
        assert!(A.distance(eased[0].at) < A.distance(linear[0].at));
        assert!((eased[4].at.x - linear[4].at.x).abs() < 1e-12);
    }

    #[test]
    fn curvature_bends_left_of_travel() {
        // Travelling right; left is towards smaller y on screen.
        let start = Point::new(0.1, 0.5);
        let end = Point::new(0.9, 0.5);
        let path = synthesize(start, end, 100, 10, CurveParams::new(0, 100));
        let mid = path[4].at;
        assert!(mid.y < 0.5);
        assert!((0.5 - mid.y - 0.25 * 0.8).abs() < 1e-9, "peak bend at midpoint");
        assert!(path.iter().all(|wp| wp.at.y <= 0.5 + 1e-12));
    }

    #[test]
    fn params_are_clamped_to_scale() {
        let p = CurveParams::new(250, 101);
        assert_eq!((p.smoothing(), p.curvature()), (100, 100));
    }

    #[test]
    fn zero_steps_is_one_step() {
        let path = synthesize(A, B, 50, 0, CurveParams::LINEAR);
        assert_eq!(path, vec![Waypoint { at: B, t_ms: 50 }]);
    }

    #[test]
    fn huge_duration_and_step_count_are_capped() {
        let path = synthesize(A, B, 1e19 as u64, u32::MAX, CurveParams::LINEAR);
        assert_eq!(path.len(), MAX_STEPS as usize);
        assert_eq!(path.last().unwrap().t_ms, MAX_DURATION_MS);
        assert!(path.windows(2).all(|w| w[0].t_ms <= w[1].t_ms));
    }

    #[test]
    fn jitter_stays_inside_envelope() {
        let mut rng = StdRng::seed_from_u64(7);
        let clean = synthesize(A, B, 100, 20, CurveParams::LINEAR);
        let mut noisy = clean.clone();
        jitter(&mut noisy, 50, &mut rng);

        let bound = 50.0 * JITTER_PER_LEVEL + 1e-12;
        for (c, n) in clean.iter().zip(&noisy) {
            assert!((c.at.x - n.at.x).abs() <= bound);
            assert!((c.at.y - n.at.y).abs() <= bound);
            assert_eq!(c.t_ms, n.t_ms);
        }
        assert_eq!(noisy.last(), clean.last());
        assert_ne!(noisy, clean);
    }

    #[test]
    fn random_offset_clamps_to_screen_margin() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let p = random_offset(Point::new(0.0, 1.0), 100, &mut rng);
            assert!((0.001..=0.999).contains(&p.x));
            assert!((0.001..=0.999).contains(&p.y));
        }
        assert_eq!(random_offset(A, 0, &mut rng), A);
    }
}
