use crate::core::geometry::Screen;
use crate::game::demand::Millis;
use crate::game::error::PlanError;
use glam::DVec2;
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Touch actions, numbered as the host's touch subsystem numbers them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TouchAction {
    Down = 0,
    Up = 1,
    Move = 2,
}

impl TouchAction {
    #[inline(always)]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Down),
            1 => Some(Self::Up),
            2 => Some(Self::Move),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Down => "DOWN",
            Self::Up => "UP",
            Self::Move => "MOVE",
        }
    }
}

impl std::fmt::Display for TouchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One press, move or release. The timestamp lives on the group holding it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub position: DVec2,
    pub action: TouchAction,
    pub pointer_id: u32,
}

impl TouchEvent {
    pub const fn new(position: DVec2, action: TouchAction, pointer_id: u32) -> Self {
        Self {
            position,
            action,
            pointer_id,
        }
    }
}

impl std::fmt::Display for TouchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TouchEvent<{} {} @ ({:.2}, {:.2})>",
            self.pointer_id, self.action, self.position.x, self.position.y
        )
    }
}

// --- Collection ---

/// Events keyed by timestamp in the order the allocator produced them.
/// Lifts are written at `last_touched_at + 1`, which may precede the frame
/// being processed, so this stays a sorted map until `into_stream`.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    groups: BTreeMap<Millis, Vec<TouchEvent>>,
    count: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: Millis, event: TouchEvent) {
        self.groups.entry(time).or_default().push(event);
        self.count += 1;
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn into_stream(self, screen: Screen) -> EventStream {
        EventStream {
            screen,
            groups: self.groups.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub groups: usize,
    pub events: usize,
    pub pointers_used: usize,
    /// Highest number of contacts pressed at once.
    pub peak_contacts: usize,
}

/// The final ordered answer: screen size plus timestamp groups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventStream {
    pub screen: Screen,
    pub groups: Vec<(Millis, Vec<TouchEvent>)>,
}

impl EventStream {
    pub fn new(screen: Screen) -> Self {
        Self {
            screen,
            groups: Vec::new(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.groups.iter().map(|(_, events)| events.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Millis, &TouchEvent)> {
        self.groups
            .iter()
            .flat_map(|(time, events)| events.iter().map(move |e| (*time, e)))
    }

    /// Every event of one pointer, in time order.
    pub fn pointer_history(&self, pointer_id: u32) -> Vec<(Millis, TouchEvent)> {
        self.iter()
            .filter(|(_, e)| e.pointer_id == pointer_id)
            .map(|(t, e)| (t, *e))
            .collect()
    }

    /// Consistency pass over the whole stream. Each pointer must follow
    /// `Down (Move)* Up`, carry at most one event per timestamp, and the
    /// number of pressed contacts may never exceed `cap`.
    pub fn validate(&self, cap: usize) -> Result<StreamStats, PlanError> {
        let mut pressed: FxHashMap<u32, bool> = FxHashMap::default();
        let mut open = 0usize;
        let mut peak = 0usize;
        let mut prev_time: Option<Millis> = None;

        for (time, events) in &self.groups {
            let time = *time;
            if let Some(prev) = prev_time
                && time <= prev
            {
                let pointer_id = events.first().map_or(0, |e| e.pointer_id);
                return Err(PlanError::violation(
                    time,
                    pointer_id,
                    &[],
                    format!("group at {time}ms follows group at {prev}ms"),
                ));
            }
            prev_time = Some(time);

            let mut seen: FxHashMap<u32, TouchAction> = FxHashMap::default();
            for event in events {
                if let Some(first) = seen.insert(event.pointer_id, event.action) {
                    return Err(PlanError::violation(
                        time,
                        event.pointer_id,
                        &[],
                        format!("{} and {} at the same instant", first, event.action),
                    ));
                }
                let is_down = pressed.entry(event.pointer_id).or_insert(false);
                match (event.action, *is_down) {
                    (TouchAction::Down, false) => {
                        *is_down = true;
                        open += 1;
                    }
                    (TouchAction::Move, true) => {}
                    (TouchAction::Up, true) => {
                        *is_down = false;
                        open -= 1;
                    }
                    (action, down) => {
                        return Err(PlanError::violation(
                            time,
                            event.pointer_id,
                            &[],
                            format!(
                                "{action} while the pointer is {}",
                                if down { "pressed" } else { "released" }
                            ),
                        ));
                    }
                }
            }
            // Lifts in a group free their slot for presses in the same group.
            peak = peak.max(open);
            if open > cap {
                return Err(PlanError::PlanningExhausted {
                    time,
                    demanded: open,
                    cap,
                });
            }
        }

        if let Some((&pointer_id, _)) = pressed.iter().find(|(_, down)| **down) {
            return Err(PlanError::violation(
                prev_time.unwrap_or(0),
                pointer_id,
                &[],
                "pointer still pressed at the end of the stream",
            ));
        }

        let stats = StreamStats {
            groups: self.groups.len(),
            events: self.event_count(),
            pointers_used: pressed.len(),
            peak_contacts: peak,
        };
        debug!(
            "Stream checked: {} groups, {} events, {} pointers, peak {} contacts.",
            stats.groups, stats.events, stats.pointers_used, stats.peak_contacts
        );
        Ok(stats)
    }
}
