//! Moves off-screen demands into the visible rectangle.
//!
//! Any touch inside a note's judgment strip (the band perpendicular to its
//! judgment line) is a hit, so an off-screen nominal point can be replaced by
//! a visible point on the same strip axis. When the axis misses the screen
//! entirely the owning line is resampled at nearby beats.

use crate::config::{PlannerConfig, StripAnchor};
use crate::core::geometry::{Screen, strip_axis_hits};
use crate::game::demand::JudgmentDemand;
use crate::game::error::PlanWarning;
use crate::game::frame::Frame;
use glam::DVec2;
use log::warn;

/// Samples a demand's owning judgment line. Implemented by the demand source,
/// which owns the keyframed position/rotation curves.
pub trait LineSampler {
    /// Nominal position and line direction of `demand`'s note at `time_ms`,
    /// or `None` outside the line's lifetime.
    fn sample(&self, demand: &JudgmentDemand, time_ms: f64) -> Option<(DVec2, DVec2)>;

    /// Length of one beat (ms) on the owning line around `time_ms`.
    fn beat_duration_ms(&self, demand: &JudgmentDemand, time_ms: f64) -> f64;
}

/// Outcome of correcting one demand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Correction {
    Visible,
    Remapped,
    Resampled { offset_ms: f64 },
    Unresolved,
}

/// Visible replacement for `position` on its strip axis, or `None` when the
/// axis does not reach the screen.
pub fn remap(
    screen: &Screen,
    position: DVec2,
    direction: DVec2,
    anchor: StripAnchor,
) -> Option<DVec2> {
    if screen.contains(position) {
        return Some(position);
    }
    let hits = strip_axis_hits(screen, position, direction);
    let picked = match (hits.len(), anchor) {
        (0, _) => return None,
        (1, _) => hits[0],
        (_, StripAnchor::Midpoint) => {
            let (a, b) = farthest_pair(&hits);
            (a + b) * 0.5
        }
        (_, StripAnchor::NearestEdge) => hits
            .iter()
            .copied()
            .min_by(|a, b| a.distance_squared(position).total_cmp(&b.distance_squared(position)))
            .unwrap_or(hits[0]),
    };
    // Intersection arithmetic can land a hair outside the border.
    Some(screen.clamp(picked))
}

/// `remap`, keeping the original point when nothing visible exists.
#[inline(always)]
pub fn correct(screen: &Screen, position: DVec2, direction: DVec2, anchor: StripAnchor) -> DVec2 {
    remap(screen, position, direction, anchor).unwrap_or(position)
}

fn farthest_pair(points: &[DVec2]) -> (DVec2, DVec2) {
    let mut best = (points[0], points[0]);
    let mut best_d = -1.0;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let d = a.distance_squared(*b);
            if d > best_d {
                best_d = d;
                best = (*a, *b);
            }
        }
    }
    best
}

pub struct GeometryCorrector<'a> {
    screen: Screen,
    anchor: StripAnchor,
    search_steps: u32,
    sampler: Option<&'a dyn LineSampler>,
}

impl<'a> GeometryCorrector<'a> {
    pub fn new(
        screen: Screen,
        config: &PlannerConfig,
        sampler: Option<&'a dyn LineSampler>,
    ) -> Self {
        Self {
            screen,
            anchor: config.strip_anchor,
            search_steps: config.correction_search_steps,
            sampler,
        }
    }

    pub fn correct_frame(&self, frame: &mut Frame, warnings: &mut Vec<PlanWarning>) {
        for demand in frame.demands_mut() {
            self.correct_demand(demand, warnings);
        }
    }

    pub fn correct_demand(
        &self,
        demand: &mut JudgmentDemand,
        warnings: &mut Vec<PlanWarning>,
    ) -> Correction {
        if self.screen.contains(demand.position) {
            return Correction::Visible;
        }
        if let Some(p) = remap(&self.screen, demand.position, demand.direction, self.anchor) {
            demand.position = p;
            return Correction::Remapped;
        }

        if let Some((offset_ms, position, direction)) = self.search(demand) {
            warn!(
                "{} {} at {}ms has no visible strip; using the line {:+.1}ms away.",
                demand.category, demand.demand_id, demand.time, offset_ms
            );
            warnings.push(PlanWarning::CorrectionResampled {
                demand_id: demand.demand_id,
                time: demand.time,
                offset_ms,
                from: demand.position,
                to: position,
            });
            demand.position = position;
            demand.direction = direction;
            return Correction::Resampled { offset_ms };
        }

        warn!(
            "Could not correct {} {} at {}ms ({:.2}, {:.2}); it may not be judged.",
            demand.category, demand.demand_id, demand.time, demand.position.x, demand.position.y
        );
        warnings.push(PlanWarning::GeometryUnresolved {
            demand_id: demand.demand_id,
            time: demand.time,
            position: demand.position,
        });
        Correction::Unresolved
    }

    // Walks one beat at a time, backwards before forwards at each distance.
    fn search(&self, demand: &JudgmentDemand) -> Option<(f64, DVec2, DVec2)> {
        let sampler = self.sampler?;
        let t0 = f64::from(demand.time);
        let beat = sampler.beat_duration_ms(demand, t0);
        if !(beat.is_finite() && beat > 0.0) {
            return None;
        }
        for step in 1..=self.search_steps {
            for sign in [-1.0, 1.0] {
                let offset_ms = sign * f64::from(step) * beat;
                let Some((position, direction)) = sampler.sample(demand, t0 + offset_ms) else {
                    continue;
                };
                if let Some(p) = remap(&self.screen, position, direction, self.anchor) {
                    return Some((offset_ms, p, direction));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::demand::{DemandCategory, DemandId};

    const SCREEN: Screen = Screen::new(1280, 720);

    #[test]
    fn visible_points_are_untouched() {
        let p = DVec2::new(100.0, 100.0);
        assert_eq!(correct(&SCREEN, p, DVec2::Y, StripAnchor::Midpoint), p);
    }

    #[test]
    fn left_of_screen_remaps_to_chord_midpoint() {
        let p = correct(&SCREEN, DVec2::new(-50.0, 360.0), DVec2::Y, StripAnchor::Midpoint);
        assert_eq!(p, DVec2::new(640.0, 360.0));
    }

    #[test]
    fn left_of_screen_remaps_to_left_edge_when_anchored_nearest() {
        let p = correct(&SCREEN, DVec2::new(-50.0, 360.0), DVec2::Y, StripAnchor::NearestEdge);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 360.0);
    }

    #[test]
    fn slanted_strip_remaps_inside() {
        let dir = DVec2::new(1.0, 1.0).normalize();
        let p = correct(&SCREEN, DVec2::new(1400.0, 300.0), dir, StripAnchor::Midpoint);
        // The axis x + y = 1700 enters at (1280, 420) and leaves at (980, 720).
        assert!(p.distance(DVec2::new(1130.0, 570.0)) < 1e-6, "got {p:?}");
        assert!((p - DVec2::new(1400.0, 300.0)).dot(dir).abs() < 1e-6);
    }

    struct ShiftingLine;

    impl LineSampler for ShiftingLine {
        // The line slides right by one pixel per millisecond.
        fn sample(&self, demand: &JudgmentDemand, time_ms: f64) -> Option<(DVec2, DVec2)> {
            let dt = time_ms - f64::from(demand.time);
            Some((demand.position + DVec2::new(dt, 0.0), demand.direction))
        }

        fn beat_duration_ms(&self, _: &JudgmentDemand, _: f64) -> f64 {
            100.0
        }
    }

    fn stranded() -> JudgmentDemand {
        // Horizontal line: the strip axis is vertical and misses the screen.
        JudgmentDemand::new(3, DemandCategory::Tap, 2000, DVec2::new(-150.0, 360.0), DVec2::X)
    }

    #[test]
    fn unreachable_strip_falls_back_to_resampling() {
        let config = PlannerConfig::default();
        let sampler = ShiftingLine;
        let corrector = GeometryCorrector::new(SCREEN, &config, Some(&sampler));
        let mut demand = stranded();
        let mut warnings = Vec::new();
        let outcome = corrector.correct_demand(&mut demand, &mut warnings);
        assert_eq!(outcome, Correction::Resampled { offset_ms: 200.0 });
        assert_eq!(demand.position, DVec2::new(50.0, 360.0));
        assert!(matches!(
            warnings.as_slice(),
            [PlanWarning::CorrectionResampled { demand_id: DemandId(3), .. }]
        ));
    }

    #[test]
    fn exhausted_search_leaves_demand_and_warns() {
        let config = PlannerConfig {
            correction_search_steps: 1,
            ..PlannerConfig::default()
        };
        let sampler = ShiftingLine;
        let corrector = GeometryCorrector::new(SCREEN, &config, Some(&sampler));
        let mut demand = stranded();
        let mut warnings = Vec::new();
        let outcome = corrector.correct_demand(&mut demand, &mut warnings);
        assert_eq!(outcome, Correction::Unresolved);
        assert_eq!(demand.position, DVec2::new(-150.0, 360.0));
        assert!(matches!(
            warnings.as_slice(),
            [PlanWarning::GeometryUnresolved { .. }]
        ));
    }

    #[test]
    fn no_sampler_means_unresolved() {
        let config = PlannerConfig::default();
        let corrector = GeometryCorrector::new(SCREEN, &config, None);
        let mut demand = stranded();
        let mut warnings = Vec::new();
        assert_eq!(
            corrector.correct_demand(&mut demand, &mut warnings),
            Correction::Unresolved
        );
        assert_eq!(warnings.len(), 1);
    }
}
