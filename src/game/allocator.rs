//! The pointer state machine. Frames go in strictly in time order; events
//! come out in an `EventLog`.
//!
//! Per frame: continuing samples move their bound pointers, creating demands
//! are consolidated and acquire pointers, releasing demands unbind theirs, and
//! finally resting pointers past their grace period are lifted.

use crate::config::{FreshPress, PlannerConfig, RecycleCadence};
use crate::core::geometry::Screen;
use crate::game::consolidate::{
    Anchor, ConsolidatedRegion, ConsolidationContext, Consolidator, for_config,
};
use crate::game::demand::{DemandId, JudgmentDemand, Millis, PressKind};
use crate::game::error::{PlanError, PlanWarning};
use crate::game::events::{EventLog, TouchEvent};
use crate::game::frame::Frame;
use crate::game::pointer::PointerPool;
use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// How a creating region gets its contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reuse {
    /// DOWN on an idle slot.
    Idle(usize),
    /// MOVE a resting pointer over.
    Slide(usize),
    /// UP a resting pointer at `last + 1`, then DOWN at `now`.
    Repress(usize),
}

pub struct PointerAllocator {
    config: PlannerConfig,
    screen: Screen,
    pool: PointerPool,
    bindings: FxHashMap<DemandId, usize>,
    consolidator: Box<dyn Consolidator>,
    log: EventLog,
    warnings: Vec<PlanWarning>,
    last_frame: Option<Millis>,
    /// Slots promised to anchored regions of the frame being processed.
    reserved: SmallVec<[usize; 10]>,
}

impl PointerAllocator {
    pub fn new(screen: Screen, config: &PlannerConfig) -> Self {
        Self::with_consolidator(screen, config, for_config(config))
    }

    pub fn with_consolidator(
        screen: Screen,
        config: &PlannerConfig,
        consolidator: Box<dyn Consolidator>,
    ) -> Self {
        Self {
            config: *config,
            screen,
            pool: PointerPool::new(config.pointer_cap, config.pointer_id_offset),
            bindings: FxHashMap::default(),
            consolidator,
            log: EventLog::new(),
            warnings: Vec::new(),
            last_frame: None,
            reserved: SmallVec::new(),
        }
    }

    pub fn process(&mut self, frame: &Frame) -> Result<(), PlanError> {
        let now = frame.time;
        if let Some(prev) = self.last_frame
            && now <= prev
        {
            return Err(PlanError::violation(
                now,
                0,
                &[],
                format!("frame at {now}ms processed after frame at {prev}ms"),
            ));
        }
        self.last_frame = Some(now);

        for demand in &frame.continuing {
            self.continue_gesture(now, demand)?;
        }

        let regions = {
            let ctx = ConsolidationContext {
                now,
                screen: self.screen,
                pool: &self.pool,
                fresh_press: self.config.fresh_press,
                releasing: &frame.releasing,
            };
            self.consolidator.consolidate(&ctx, &frame.creating)
        };
        if regions.len() < frame.creating.len() {
            trace!(
                "{now}ms: {} creating demands share {} contacts.",
                frame.creating.len(),
                regions.len()
            );
        }
        self.reserved = regions
            .iter()
            .filter_map(|r| match r.anchor {
                Some(Anchor::Rebind(idx)) => Some(idx),
                _ => None,
            })
            .collect();
        let total = regions.len();
        for (i, region) in regions.iter().enumerate() {
            self.acquire(now, region, total - i)?;
        }
        self.reserved.clear();

        for demand in &frame.releasing {
            self.release(now, demand)?;
        }

        let due = match self.config.recycle {
            RecycleCadence::EveryFrame => true,
            RecycleCadence::Keyframe => frame.is_keyframe(),
        };
        if due {
            self.recycle(now)?;
        }
        Ok(())
    }

    #[inline(always)]
    fn emit(&mut self, time: Millis, event: TouchEvent) {
        self.log.push(time, event);
    }

    fn continue_gesture(&mut self, now: Millis, demand: &JudgmentDemand) -> Result<(), PlanError> {
        let Some(&idx) = self.bindings.get(&demand.demand_id) else {
            warn!(
                "{} {} at {now}ms has no pointer bound; sliding one in.",
                demand.category, demand.demand_id
            );
            let region = ConsolidatedRegion {
                press: PressKind::Slide,
                ..ConsolidatedRegion::single(*demand)
            };
            return self.acquire(now, &region, 1);
        };
        let event = self
            .pool
            .get_mut(idx)
            .slide(now, demand.position)
            .map_err(|e| e.with_demands(&[demand.demand_id]))?;
        self.emit(now, event);
        Ok(())
    }

    fn acquire(
        &mut self,
        now: Millis,
        region: &ConsolidatedRegion,
        pending: usize,
    ) -> Result<(), PlanError> {
        let ids = region.demand_ids();
        let idx = match region.anchor {
            Some(Anchor::Covered(idx)) => {
                if !region.is_atomic() {
                    return Err(PlanError::violation(
                        now,
                        self.pool.get(idx).id(),
                        &ids,
                        "gesture start satisfied by another demand's pointer",
                    ));
                }
                return Ok(());
            }
            Some(Anchor::Rebind(idx)) => {
                let p = self.pool.get(idx);
                let choice = match region.press {
                    PressKind::Slide if p.can_slide(now) => Reuse::Slide(idx),
                    PressKind::Fresh if p.can_repress(now) => Reuse::Repress(idx),
                    _ => {
                        return Err(PlanError::violation(
                            now,
                            p.id(),
                            &ids,
                            "region anchored to a pointer that cannot be reused now",
                        ));
                    }
                };
                self.apply(now, region, choice)?
            }
            None => {
                let Some(choice) = self.choose(now, region) else {
                    return Err(PlanError::PlanningExhausted {
                        time: now,
                        demanded: self.pool.occupied_at(now) + pending,
                        cap: self.pool.cap(),
                    });
                };
                self.apply(now, region, choice)?
            }
        };

        let mut gestures = region.gestures();
        match (gestures.next(), gestures.next()) {
            (None, _) => self.pool.get_mut(idx).rest(),
            (Some(id), None) => {
                if let Some(prev) = self.bindings.insert(id, idx)
                    && prev != idx
                {
                    warn!(
                        "Demand {id} started again at {now}ms while still held by pointer {}.",
                        self.pool.get(prev).id()
                    );
                    self.pool.get_mut(prev).rest();
                }
                self.pool.get_mut(idx).bind(id);
            }
            (Some(_), Some(_)) => {
                return Err(PlanError::violation(
                    now,
                    self.pool.get(idx).id(),
                    &ids,
                    "one contact bound to several gestures",
                ));
            }
        }
        Ok(())
    }

    fn choose(&self, now: Millis, region: &ConsolidatedRegion) -> Option<Reuse> {
        let target = region.point;
        let radius = self.config.reuse_radius;
        let open = |idx: usize| !self.reserved.contains(&idx);
        match region.press {
            PressKind::Slide => self
                .pool
                .nearest_resting(target, radius, |i, p| open(i) && p.can_slide(now))
                .map(Reuse::Slide)
                .or_else(|| self.pool.first_idle(now).map(Reuse::Idle))
                .or_else(|| {
                    self.pool
                        .nearest_resting(target, None, |i, p| open(i) && p.can_slide(now))
                        .map(Reuse::Slide)
                }),
            PressKind::Fresh => {
                let near = match self.config.fresh_press {
                    FreshPress::LiftAndRepress => self
                        .pool
                        .nearest_resting(target, radius, |i, p| open(i) && p.can_repress(now))
                        .map(Reuse::Repress),
                    FreshPress::NewContact => None,
                };
                near.or_else(|| self.pool.first_idle(now).map(Reuse::Idle))
                    .or_else(|| {
                        self.pool
                            .nearest_resting(target, None, |i, p| open(i) && p.can_repress(now))
                            .map(Reuse::Repress)
                    })
            }
        }
    }

    fn apply(
        &mut self,
        now: Millis,
        region: &ConsolidatedRegion,
        choice: Reuse,
    ) -> Result<usize, PlanError> {
        let ids = region.demand_ids();
        let point = region.point;
        let idx = match choice {
            Reuse::Idle(idx) => {
                let down = self
                    .pool
                    .get_mut(idx)
                    .press(now, point)
                    .map_err(|e| e.with_demands(&ids))?;
                self.emit(now, down);
                idx
            }
            Reuse::Slide(idx) => {
                let mv = self
                    .pool
                    .get_mut(idx)
                    .slide(now, point)
                    .map_err(|e| e.with_demands(&ids))?;
                self.emit(now, mv);
                idx
            }
            Reuse::Repress(idx) => {
                let pointer = self.pool.get_mut(idx);
                let (at, up) = pointer.lift().map_err(|e| e.with_demands(&ids))?;
                let down = pointer.press(now, point).map_err(|e| e.with_demands(&ids))?;
                self.emit(at, up);
                self.emit(now, down);
                idx
            }
        };
        trace!(
            "{now}ms: {choice:?} pointer {} for {:?}.",
            self.pool.get(idx).id(),
            ids.as_slice()
        );
        Ok(idx)
    }

    fn release(&mut self, now: Millis, demand: &JudgmentDemand) -> Result<(), PlanError> {
        if !self.bindings.contains_key(&demand.demand_id) {
            warn!(
                "{} {} at {now}ms ends a gesture that never started.",
                demand.category, demand.demand_id
            );
            let region = ConsolidatedRegion {
                press: PressKind::Slide,
                ..ConsolidatedRegion::single(*demand)
            };
            self.acquire(now, &region, 1)?;
        }
        let Some(idx) = self.bindings.remove(&demand.demand_id) else {
            return Err(PlanError::violation(
                now,
                0,
                &[demand.demand_id],
                "released demand has no pointer",
            ));
        };

        let pointer = self.pool.get_mut(idx);
        // Started and ended inside one frame: the press already stands for both.
        if pointer.free_at(now) {
            let event = pointer
                .slide(now, demand.position)
                .map_err(|e| e.with_demands(&[demand.demand_id]))?;
            self.emit(now, event);
        }
        self.pool.get_mut(idx).rest();
        Ok(())
    }

    fn recycle(&mut self, now: Millis) -> Result<(), PlanError> {
        let grace = i64::from(self.config.grace_ms);
        for idx in 0..self.pool.cap() {
            let pointer = self.pool.get(idx);
            let stale = pointer.is_resting()
                && pointer
                    .last_touched_at()
                    .is_some_and(|last| i64::from(now) - i64::from(last) >= grace);
            if !stale {
                continue;
            }
            let (at, up) = self.pool.get_mut(idx).lift()?;
            trace!("{now}ms: recycled pointer {} (UP at {at}ms).", up.pointer_id);
            self.emit(at, up);
        }
        Ok(())
    }

    /// Lifts every pointer still on screen and hands back the collected events.
    pub fn finish(mut self) -> Result<(EventLog, Vec<PlanWarning>), PlanError> {
        for idx in 0..self.pool.cap() {
            let pointer = self.pool.get(idx);
            if !pointer.is_on_screen() {
                continue;
            }
            if let Some(demand_id) = pointer.owner() {
                let last_touched_at = pointer.last_touched_at().unwrap_or_default();
                warn!(
                    "Demand {demand_id} never ended; lifting pointer {} after {last_touched_at}ms.",
                    pointer.id()
                );
                self.warnings.push(PlanWarning::UnterminatedGesture {
                    demand_id,
                    pointer_id: pointer.id(),
                    last_touched_at,
                });
            }
            let (at, up) = self.pool.get_mut(idx).lift()?;
            self.emit(at, up);
        }
        debug!(
            "Allocator ({}) finished with {} events.",
            self.consolidator.name(),
            self.log.len()
        );
        Ok((self.log, self.warnings))
    }
}
