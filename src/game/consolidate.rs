//! Region consolidation: decides which creating demands of one frame can be
//! served by the same contact before the allocator hands out pointers.

use crate::config::{ConsolidationPolicy, FreshPress, PlannerConfig};
use crate::core::geometry::{ConvexPolygon, Screen, judgment_strip, strip_offset};
use crate::game::demand::{DemandCategory, DemandId, JudgmentDemand, Millis, PressKind};
use crate::game::pointer::{PointerPool, PointerState};
use glam::DVec2;
use log::trace;
use smallvec::{SmallVec, smallvec};

/// A pre-existing contact a region is tied to, as a pool slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Reuse this resting pointer instead of searching the pool.
    Rebind(usize),
    /// An employed pointer already lies inside the region; nothing is emitted.
    Covered(usize),
}

/// One contact point satisfying every demand it carries.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsolidatedRegion {
    pub point: DVec2,
    pub demands: SmallVec<[JudgmentDemand; 2]>,
    pub press: PressKind,
    pub anchor: Option<Anchor>,
}

impl ConsolidatedRegion {
    pub fn single(demand: JudgmentDemand) -> Self {
        Self {
            point: demand.position,
            demands: smallvec![demand],
            press: demand.category.press(),
            anchor: None,
        }
    }

    pub fn demand_ids(&self) -> SmallVec<[DemandId; 2]> {
        self.demands.iter().map(|d| d.demand_id).collect()
    }

    /// Ids of hold/flick starts; these keep the pointer bound after the frame.
    pub fn gestures(&self) -> impl Iterator<Item = DemandId> + '_ {
        self.demands
            .iter()
            .filter(|d| !d.category.is_atomic())
            .map(|d| d.demand_id)
    }

    #[inline(always)]
    pub fn is_atomic(&self) -> bool {
        self.demands.iter().all(|d| d.category.is_atomic())
    }
}

/// What a policy may look at while grouping one frame's creating demands.
pub struct ConsolidationContext<'a> {
    pub now: Millis,
    pub screen: Screen,
    pub pool: &'a PointerPool,
    pub fresh_press: FreshPress,
    /// Gestures ending in this frame. Their pointers move to the end point
    /// after consolidation, so they cover nothing.
    pub releasing: &'a [JudgmentDemand],
}

impl ConsolidationContext<'_> {
    /// Slot of an employed pointer inside `strip` that stays there for the
    /// rest of the frame.
    fn covering(&self, strip: &ConvexPolygon) -> Option<usize> {
        self.pool
            .iter()
            .find(|(_, p)| match p.state() {
                PointerState::Employed(id) => {
                    strip.contains(p.position())
                        && !self.releasing.iter().any(|d| d.demand_id == id)
                }
                _ => false,
            })
            .map(|(idx, _)| idx)
    }
}

pub trait Consolidator {
    fn name(&self) -> &'static str;

    /// Groups `demands` (all creating) into regions. Every input demand ends
    /// up in exactly one region.
    fn consolidate(
        &self,
        ctx: &ConsolidationContext<'_>,
        demands: &[JudgmentDemand],
    ) -> Vec<ConsolidatedRegion>;
}

pub fn for_config(config: &PlannerConfig) -> Box<dyn Consolidator> {
    match config.consolidation {
        ConsolidationPolicy::None => Box::new(Identity),
        ConsolidationPolicy::Proximity => Box::new(Proximity {
            threshold: config.proximity_threshold,
        }),
        ConsolidationPolicy::Geometric => Box::new(GeometricMerge {
            strip_width: config.strip_width,
        }),
    }
}

// --- Identity ---

pub struct Identity;

impl Consolidator for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn consolidate(
        &self,
        _: &ConsolidationContext<'_>,
        demands: &[JudgmentDemand],
    ) -> Vec<ConsolidatedRegion> {
        demands.iter().copied().map(ConsolidatedRegion::single).collect()
    }
}

// --- Proximity ---

/// Folds a demand onto the resting contact closest to its strip axis, if that
/// contact lies within `threshold` px measured along the judgment line.
pub struct Proximity {
    pub threshold: f64,
}

impl Consolidator for Proximity {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn consolidate(
        &self,
        ctx: &ConsolidationContext<'_>,
        demands: &[JudgmentDemand],
    ) -> Vec<ConsolidatedRegion> {
        let mut claimed: SmallVec<[usize; 10]> = SmallVec::new();
        let mut regions = Vec::with_capacity(demands.len());

        for demand in demands {
            let mut region = ConsolidatedRegion::single(*demand);
            let press = demand.category.press();
            if press == PressKind::Fresh && ctx.fresh_press == FreshPress::NewContact {
                regions.push(region);
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for (idx, p) in ctx.pool.iter() {
                let usable = match press {
                    PressKind::Fresh => p.can_repress(ctx.now),
                    PressKind::Slide => p.can_slide(ctx.now),
                };
                if !usable || claimed.contains(&idx) {
                    continue;
                }
                let offset = strip_offset(demand.position, demand.direction, p.position());
                if offset < self.threshold && best.is_none_or(|(_, b)| offset < b) {
                    best = Some((idx, offset));
                }
            }

            if let Some((idx, offset)) = best {
                trace!(
                    "{} {} folds onto pointer {} ({offset:.1}px off its strip).",
                    demand.category,
                    demand.demand_id,
                    ctx.pool.get(idx).id()
                );
                claimed.push(idx);
                region.point = ctx.pool.get(idx).position();
                region.anchor = Some(Anchor::Rebind(idx));
            }
            regions.push(region);
        }
        regions
    }
}

// --- Geometric merge ---

/// Intersects overlapping judgment strips so one contact at the shared
/// region's centroid hits every note in it.
pub struct GeometricMerge {
    /// `None` uses a tenth of the screen width.
    pub strip_width: Option<f64>,
}

struct Area {
    polygon: ConvexPolygon,
    demands: SmallVec<[JudgmentDemand; 2]>,
}

impl Area {
    fn into_region(self, press: PressKind) -> ConsolidatedRegion {
        let fallback = self.demands.first().map_or(DVec2::ZERO, |d| d.position);
        ConsolidatedRegion {
            point: self.polygon.centroid().unwrap_or(fallback),
            demands: self.demands,
            press,
            anchor: None,
        }
    }
}

/// Folds `demand` into the first area whose polygon overlaps `strip`.
fn merge_into(areas: &mut [Area], strip: &ConvexPolygon, demand: JudgmentDemand) -> bool {
    for area in areas.iter_mut() {
        let shared = area.polygon.intersection(strip);
        if shared.is_empty() {
            continue;
        }
        area.polygon = shared;
        area.demands.push(demand);
        return true;
    }
    false
}

impl GeometricMerge {
    fn width(&self, screen: &Screen) -> f64 {
        self.strip_width
            .unwrap_or_else(|| f64::from(screen.width) / 10.0)
    }
}

impl Consolidator for GeometricMerge {
    fn name(&self) -> &'static str {
        "geometric"
    }

    fn consolidate(
        &self,
        ctx: &ConsolidationContext<'_>,
        demands: &[JudgmentDemand],
    ) -> Vec<ConsolidatedRegion> {
        let width = self.width(&ctx.screen);
        let mut regions = Vec::new();
        let mut taps: Vec<Area> = Vec::new();
        let mut drags: Vec<Area> = Vec::new();

        // Gesture starts stay exact; their later samples move from here.
        for demand in demands.iter().filter(|d| !d.category.is_atomic()) {
            regions.push(ConsolidatedRegion::single(*demand));
        }

        for demand in demands.iter().filter(|d| d.category == DemandCategory::Tap) {
            let strip = judgment_strip(&ctx.screen, demand.position, demand.direction, width);
            if strip.is_empty() {
                regions.push(ConsolidatedRegion::single(*demand));
                continue;
            }
            if !merge_into(&mut taps, &strip, *demand) {
                taps.push(Area {
                    polygon: strip,
                    demands: smallvec![*demand],
                });
            }
        }

        for demand in demands.iter().filter(|d| d.category == DemandCategory::Drag) {
            let strip = judgment_strip(&ctx.screen, demand.position, demand.direction, width);
            if strip.is_empty() {
                regions.push(ConsolidatedRegion::single(*demand));
                continue;
            }
            if let Some(idx) = ctx.covering(&strip) {
                let p = ctx.pool.get(idx);
                trace!(
                    "Drag {} already covered by pointer {}.",
                    demand.demand_id,
                    p.id()
                );
                regions.push(ConsolidatedRegion {
                    point: p.position(),
                    demands: smallvec![*demand],
                    press: PressKind::Slide,
                    anchor: Some(Anchor::Covered(idx)),
                });
                continue;
            }
            if merge_into(&mut drags, &strip, *demand) || merge_into(&mut taps, &strip, *demand) {
                continue;
            }
            drags.push(Area {
                polygon: strip,
                demands: smallvec![*demand],
            });
        }

        regions.extend(drags.into_iter().map(|a| a.into_region(PressKind::Slide)));
        regions.extend(taps.into_iter().map(|a| a.into_region(PressKind::Fresh)));
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::demand::DemandCategory::{Drag, FlickStart, Tap};

    const SCREEN: Screen = Screen::new(1280, 720);

    fn ctx(pool: &PointerPool, now: Millis) -> ConsolidationContext<'_> {
        ConsolidationContext {
            now,
            screen: SCREEN,
            pool,
            fresh_press: FreshPress::LiftAndRepress,
            releasing: &[],
        }
    }

    fn demand(id: u32, category: DemandCategory, x: f64, y: f64, dir: DVec2) -> JudgmentDemand {
        JudgmentDemand::new(id, category, 100, DVec2::new(x, y), dir)
    }

    #[test]
    fn identity_keeps_every_demand_apart() {
        let pool = PointerPool::new(10, 0);
        let demands = [
            demand(0, Tap, 100.0, 100.0, DVec2::X),
            demand(1, Tap, 100.0, 100.0, DVec2::X),
        ];
        let regions = Identity.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.anchor.is_none()));
    }

    #[test]
    fn proximity_rebinds_a_resting_pointer_on_the_strip() {
        let mut pool = PointerPool::new(10, 0);
        pool.get_mut(0).press(10, DVec2::new(420.0, 50.0)).expect("press");
        // Horizontal line: slack along y is free, 20px along x is within threshold.
        let demands = [demand(0, Drag, 400.0, 600.0, DVec2::X)];
        let regions = Proximity { threshold: 100.0 }.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions[0].anchor, Some(Anchor::Rebind(0)));
        assert_eq!(regions[0].point, DVec2::new(420.0, 50.0));
    }

    #[test]
    fn proximity_never_hands_one_pointer_to_two_demands() {
        let mut pool = PointerPool::new(10, 0);
        pool.get_mut(0).press(10, DVec2::new(400.0, 50.0)).expect("press");
        let demands = [
            demand(0, Tap, 400.0, 300.0, DVec2::X),
            demand(1, Tap, 410.0, 500.0, DVec2::X),
        ];
        let regions = Proximity { threshold: 100.0 }.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions[0].anchor, Some(Anchor::Rebind(0)));
        assert_eq!(regions[1].anchor, None);
    }

    #[test]
    fn proximity_ignores_pointers_touched_this_instant() {
        let mut pool = PointerPool::new(10, 0);
        pool.get_mut(0).press(100, DVec2::new(400.0, 50.0)).expect("press");
        let demands = [demand(0, Drag, 400.0, 300.0, DVec2::X)];
        let regions = Proximity { threshold: 100.0 }.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions[0].anchor, None);
    }

    #[test]
    fn overlapping_tap_strips_merge_at_their_centroid() {
        let pool = PointerPool::new(10, 0);
        // One vertical strip around x=300, one horizontal strip around y=200.
        let demands = [
            demand(0, Tap, 300.0, 600.0, DVec2::X),
            demand(1, Tap, 1000.0, 200.0, DVec2::Y),
        ];
        let merge = GeometricMerge {
            strip_width: Some(100.0),
        };
        let regions = merge.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].demands.len(), 2);
        assert_eq!(regions[0].press, PressKind::Fresh);
        assert!(regions[0].point.distance(DVec2::new(300.0, 200.0)) < 1e-6);
    }

    #[test]
    fn parallel_distant_taps_stay_apart() {
        let pool = PointerPool::new(10, 0);
        let demands = [
            demand(0, Tap, 100.0, 360.0, DVec2::X),
            demand(1, Tap, 900.0, 360.0, DVec2::X),
        ];
        let regions = GeometricMerge { strip_width: None }.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn drag_folds_into_a_tap_area_when_no_drag_area_overlaps() {
        let pool = PointerPool::new(10, 0);
        let demands = [
            demand(0, Tap, 300.0, 600.0, DVec2::X),
            demand(1, Drag, 310.0, 100.0, DVec2::X),
        ];
        let merge = GeometricMerge {
            strip_width: Some(100.0),
        };
        let regions = merge.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].press, PressKind::Fresh);
        assert_eq!(regions[0].demand_ids().as_slice(), &[DemandId(0), DemandId(1)]);
    }

    #[test]
    fn drag_covered_by_a_held_pointer_emits_nothing_new() {
        let mut pool = PointerPool::new(10, 0);
        pool.get_mut(3).press(50, DVec2::new(640.0, 10.0)).expect("press");
        pool.get_mut(3).bind(DemandId(9));
        let demands = [demand(1, Drag, 640.0, 500.0, DVec2::X)];
        let regions = GeometricMerge { strip_width: None }.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions[0].anchor, Some(Anchor::Covered(3)));
    }

    #[test]
    fn pointer_leaving_this_frame_covers_nothing() {
        let mut pool = PointerPool::new(10, 0);
        pool.get_mut(3).press(50, DVec2::new(640.0, 10.0)).expect("press");
        pool.get_mut(3).bind(DemandId(9));
        let releasing = [JudgmentDemand::new(
            9,
            DemandCategory::HoldEnd,
            100,
            DVec2::new(100.0, 10.0),
            DVec2::X,
        )];
        let ctx = ConsolidationContext {
            releasing: &releasing,
            ..ctx(&pool, 100)
        };
        let demands = [demand(1, Drag, 640.0, 500.0, DVec2::X)];
        let regions = GeometricMerge { strip_width: None }.consolidate(&ctx, &demands);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].anchor, None);
        assert_eq!(regions[0].press, PressKind::Slide);
    }

    #[test]
    fn gesture_starts_come_first_and_alone() {
        let pool = PointerPool::new(10, 0);
        let demands = [
            demand(0, Tap, 300.0, 300.0, DVec2::X),
            demand(1, FlickStart, 300.0, 300.0, DVec2::X),
        ];
        let regions = GeometricMerge { strip_width: None }.consolidate(&ctx(&pool, 100), &demands);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].demand_ids().as_slice(), &[DemandId(1)]);
        assert!(!regions[0].is_atomic());
        assert_eq!(regions[0].gestures().collect::<Vec<_>>(), vec![DemandId(1)]);
    }
}
