use crate::game::demand::{DemandId, Millis};
use crate::game::error::PlanError;
use crate::game::events::{TouchAction, TouchEvent};
use glam::DVec2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerState {
    /// Not on screen; the id can be handed out.
    Idle,
    /// Pressed and bound to a live gesture.
    Employed(DemandId),
    /// Pressed but unbound; can be slid to a new demand without a DOWN.
    Resting,
}

/// One touch contact. Every state change goes through a method that emits
/// the matching event, so the pointer's own history is always
/// `Down (Move)* Up` with strictly increasing times.
#[derive(Clone, Debug)]
pub struct VirtualPointer {
    id: u32,
    state: PointerState,
    position: DVec2,
    last_touched_at: Option<Millis>,
}

impl VirtualPointer {
    fn new(id: u32) -> Self {
        Self {
            id,
            state: PointerState::Idle,
            position: DVec2::ZERO,
            last_touched_at: None,
        }
    }

    #[inline(always)]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[inline(always)]
    pub const fn state(&self) -> PointerState {
        self.state
    }

    #[inline(always)]
    pub const fn position(&self) -> DVec2 {
        self.position
    }

    #[inline(always)]
    pub const fn last_touched_at(&self) -> Option<Millis> {
        self.last_touched_at
    }

    #[inline(always)]
    pub fn is_on_screen(&self) -> bool {
        self.state != PointerState::Idle
    }

    #[inline(always)]
    pub fn is_resting(&self) -> bool {
        self.state == PointerState::Resting
    }

    /// True when an event at `time` keeps this pointer's history strictly increasing.
    #[inline(always)]
    pub fn free_at(&self, time: Millis) -> bool {
        self.last_touched_at.is_none_or(|last| last < time)
    }

    /// A resting pointer can be slid (MOVE) to a new demand at `now`.
    pub fn can_slide(&self, now: Millis) -> bool {
        self.is_resting() && self.free_at(now)
    }

    /// A resting pointer can be lifted at `last + 1` and pressed again at `now`.
    pub fn can_repress(&self, now: Millis) -> bool {
        self.is_resting() && self.last_touched_at.is_some_and(|last| last + 1 < now)
    }

    fn stamp(&mut self, time: Millis, action: TouchAction, detail: &str) -> Result<(), PlanError> {
        if !self.free_at(time) {
            return Err(PlanError::violation(
                time,
                self.id,
                &self.owner().into_iter().collect::<Vec<_>>(),
                format!(
                    "{detail}: {} at {time}ms after an event at {}ms",
                    action.as_str(),
                    self.last_touched_at.unwrap_or(time)
                ),
            ));
        }
        self.last_touched_at = Some(time);
        Ok(())
    }

    pub fn owner(&self) -> Option<DemandId> {
        match self.state {
            PointerState::Employed(id) => Some(id),
            _ => None,
        }
    }

    pub fn press(&mut self, time: Millis, position: DVec2) -> Result<TouchEvent, PlanError> {
        if self.is_on_screen() {
            return Err(PlanError::violation(
                time,
                self.id,
                &self.owner().into_iter().collect::<Vec<_>>(),
                "DOWN on a pointer that is already pressed",
            ));
        }
        self.stamp(time, TouchAction::Down, "press")?;
        self.position = position;
        self.state = PointerState::Resting;
        Ok(TouchEvent::new(position, TouchAction::Down, self.id))
    }

    pub fn slide(&mut self, time: Millis, position: DVec2) -> Result<TouchEvent, PlanError> {
        if !self.is_on_screen() {
            return Err(PlanError::violation(
                time,
                self.id,
                &[],
                "MOVE on a pointer that is not pressed",
            ));
        }
        self.stamp(time, TouchAction::Move, "slide")?;
        self.position = position;
        Ok(TouchEvent::new(position, TouchAction::Move, self.id))
    }

    /// Lifts the pointer one millisecond after its last event. Returns the
    /// event time alongside the event.
    pub fn lift(&mut self) -> Result<(Millis, TouchEvent), PlanError> {
        let Some(last) = self.last_touched_at else {
            return Err(PlanError::violation(
                0,
                self.id,
                &[],
                "UP on a pointer that was never pressed",
            ));
        };
        let at = last + 1;
        if !self.is_on_screen() {
            return Err(PlanError::violation(
                at,
                self.id,
                &[],
                "UP on a pointer that is not pressed",
            ));
        }
        self.stamp(at, TouchAction::Up, "lift")?;
        self.state = PointerState::Idle;
        Ok((at, TouchEvent::new(self.position, TouchAction::Up, self.id)))
    }

    pub fn bind(&mut self, demand: DemandId) {
        self.state = PointerState::Employed(demand);
    }

    pub fn rest(&mut self) {
        if self.is_on_screen() {
            self.state = PointerState::Resting;
        }
    }
}

/// Arena of every contact the host accepts, indexed `0..cap`. Pointer ids are
/// `offset + index` and never change.
#[derive(Clone, Debug)]
pub struct PointerPool {
    pointers: Vec<VirtualPointer>,
}

impl PointerPool {
    pub fn new(cap: usize, id_offset: u32) -> Self {
        let pointers = (0..cap as u32)
            .map(|i| VirtualPointer::new(id_offset + i))
            .collect();
        Self { pointers }
    }

    #[inline(always)]
    pub fn cap(&self) -> usize {
        self.pointers.len()
    }

    #[inline(always)]
    pub fn get(&self, idx: usize) -> &VirtualPointer {
        &self.pointers[idx]
    }

    #[inline(always)]
    pub fn get_mut(&mut self, idx: usize) -> &mut VirtualPointer {
        &mut self.pointers[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &VirtualPointer)> {
        self.pointers.iter().enumerate()
    }

    /// Slots that cannot take a DOWN at `now`: pressed, or lifted this very millisecond.
    pub fn occupied_at(&self, now: Millis) -> usize {
        self.pointers
            .iter()
            .filter(|p| p.is_on_screen() || !p.free_at(now))
            .count()
    }

    /// Lowest idle slot whose last UP lies strictly before `now`.
    pub fn first_idle(&self, now: Millis) -> Option<usize> {
        self.pointers
            .iter()
            .position(|p| !p.is_on_screen() && p.free_at(now))
    }

    /// Resting pointer nearest to `target` among those passing `usable`,
    /// optionally limited to `radius`. Ties go to the lower slot.
    pub fn nearest_resting<F>(
        &self,
        target: DVec2,
        radius: Option<f64>,
        usable: F,
    ) -> Option<usize>
    where
        F: Fn(usize, &VirtualPointer) -> bool,
    {
        let mut best: Option<(usize, f64)> = None;
        for (idx, p) in self.iter() {
            if !p.is_resting() || !usable(idx, p) {
                continue;
            }
            let d = p.position.distance(target);
            if radius.is_some_and(|r| d >= r) {
                continue;
            }
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((idx, d));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_hands_out_offset_ids() {
        let pool = PointerPool::new(3, 1000);
        let ids: Vec<u32> = pool.iter().map(|(_, p)| p.id()).collect();
        assert_eq!(ids, vec![1000, 1001, 1002]);
        assert_eq!(pool.first_idle(0), Some(0));
        assert_eq!(pool.occupied_at(0), 0);
    }

    #[test]
    fn lifecycle_emits_down_move_up() {
        let mut pool = PointerPool::new(1, 0);
        let p = pool.get_mut(0);
        let down = p.press(10, DVec2::new(1.0, 2.0)).expect("idle pointer presses");
        assert_eq!(down.action, TouchAction::Down);
        p.bind(DemandId(4));
        assert_eq!(p.owner(), Some(DemandId(4)));
        let mv = p.slide(11, DVec2::new(3.0, 4.0)).expect("pressed pointer slides");
        assert_eq!(mv.action, TouchAction::Move);
        p.rest();
        let (at, up) = p.lift().expect("resting pointer lifts");
        assert_eq!(at, 12);
        assert_eq!(up.action, TouchAction::Up);
        assert_eq!(up.position, DVec2::new(3.0, 4.0));
        assert_eq!(p.state(), PointerState::Idle);
    }

    #[test]
    fn same_instant_events_are_violations() {
        let mut pool = PointerPool::new(1, 0);
        let p = pool.get_mut(0);
        p.press(5, DVec2::ZERO).expect("press");
        let err = p.slide(5, DVec2::ONE).expect_err("second event at 5ms");
        assert!(matches!(err, PlanError::InvariantViolation { time: 5, .. }));
    }

    #[test]
    fn double_press_is_a_violation() {
        let mut pool = PointerPool::new(1, 0);
        let p = pool.get_mut(0);
        p.press(5, DVec2::ZERO).expect("press");
        assert!(p.press(9, DVec2::ZERO).is_err());
    }

    #[test]
    fn lifted_pointer_is_idle_only_after_its_up() {
        let mut pool = PointerPool::new(1, 0);
        pool.get_mut(0).press(5, DVec2::ZERO).expect("press");
        pool.get_mut(0).lift().expect("lift");
        assert_eq!(pool.first_idle(6), None);
        assert_eq!(pool.occupied_at(6), 1);
        assert_eq!(pool.first_idle(7), Some(0));
        assert_eq!(pool.occupied_at(7), 0);
    }

    #[test]
    fn repress_needs_a_gap_for_the_up() {
        let mut pool = PointerPool::new(1, 0);
        pool.get_mut(0).press(5, DVec2::ZERO).expect("press");
        let p = pool.get(0);
        assert!(p.can_slide(6));
        assert!(!p.can_repress(6));
        assert!(p.can_repress(7));
    }

    #[test]
    fn nearest_resting_respects_radius() {
        let mut pool = PointerPool::new(2, 0);
        pool.get_mut(0).press(0, DVec2::new(0.0, 0.0)).expect("press");
        pool.get_mut(1).press(0, DVec2::new(500.0, 0.0)).expect("press");
        let near = pool.nearest_resting(DVec2::new(450.0, 0.0), Some(200.0), |_, _| true);
        assert_eq!(near, Some(1));
        let none = pool.nearest_resting(DVec2::new(250.0, 300.0), Some(200.0), |_, _| true);
        assert_eq!(none, None);
        let any = pool.nearest_resting(DVec2::new(250.0, 300.0), None, |_, _| true);
        assert_eq!(any, Some(0));
    }
}
