use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Milliseconds since chart start.
pub type Millis = i32;

/// Identifies the note a demand belongs to. Every sub-step of one hold or
/// flick shares the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DemandId(pub u32);

impl std::fmt::Display for DemandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DemandCategory {
    Tap,
    Drag,
    FlickStart,
    FlickSample,
    FlickEnd,
    HoldStart,
    HoldSample,
    HoldEnd,
}

/// What a category does to the pointer serving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CategoryGroup {
    Creates,
    Continues,
    Releases,
}

/// How a contact has to arrive at a creating demand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PressKind {
    /// The host must see a new press (DOWN).
    Fresh,
    /// Sliding an already pressed contact in (MOVE) is enough.
    Slide,
}

impl DemandCategory {
    #[inline(always)]
    pub const fn group(self) -> CategoryGroup {
        match self {
            Self::Tap | Self::Drag | Self::FlickStart | Self::HoldStart => CategoryGroup::Creates,
            Self::FlickSample | Self::HoldSample => CategoryGroup::Continues,
            Self::FlickEnd | Self::HoldEnd => CategoryGroup::Releases,
        }
    }

    /// Taps and drags are acquired and released within a single instant.
    #[inline(always)]
    pub const fn is_atomic(self) -> bool {
        matches!(self, Self::Tap | Self::Drag)
    }

    #[inline(always)]
    pub const fn press(self) -> PressKind {
        match self {
            Self::Tap | Self::HoldStart => PressKind::Fresh,
            _ => PressKind::Slide,
        }
    }

    /// Frames containing a tap or a hold start trigger keyframe recycling.
    #[inline(always)]
    pub const fn is_keyframe(self) -> bool {
        matches!(self, Self::Tap | Self::HoldStart)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "Tap",
            Self::Drag => "Drag",
            Self::FlickStart => "FlickStart",
            Self::FlickSample => "FlickSample",
            Self::FlickEnd => "FlickEnd",
            Self::HoldStart => "HoldStart",
            Self::HoldSample => "HoldSample",
            Self::HoldEnd => "HoldEnd",
        }
    }
}

impl std::fmt::Display for DemandCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single instant at which a screen location must register a finger action.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgmentDemand {
    pub demand_id: DemandId,
    pub category: DemandCategory,
    pub time: Millis,
    pub position: DVec2,
    /// Unit vector of the owning judgment line's orientation at `time`.
    pub direction: DVec2,
}

impl JudgmentDemand {
    pub fn new(
        demand_id: u32,
        category: DemandCategory,
        time: Millis,
        position: DVec2,
        direction: DVec2,
    ) -> Self {
        Self {
            demand_id: DemandId(demand_id),
            category,
            time,
            position,
            direction,
        }
    }

    #[inline(always)]
    pub const fn group(&self) -> CategoryGroup {
        self.category.group()
    }
}

// --- Demand source hand-off ---

/// Reads a JSON array of demands as produced by a chart's demand source.
pub fn from_json_reader<R: Read>(reader: R) -> Result<Vec<JudgmentDemand>, serde_json::Error> {
    serde_json::from_reader(reader)
}

pub fn from_json_str(json: &str) -> Result<Vec<JudgmentDemand>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_fall_into_their_groups() {
        assert_eq!(DemandCategory::Tap.group(), CategoryGroup::Creates);
        assert_eq!(DemandCategory::Drag.group(), CategoryGroup::Creates);
        assert_eq!(DemandCategory::HoldSample.group(), CategoryGroup::Continues);
        assert_eq!(DemandCategory::FlickEnd.group(), CategoryGroup::Releases);
        assert!(DemandCategory::Drag.is_atomic());
        assert!(!DemandCategory::HoldStart.is_atomic());
        assert_eq!(DemandCategory::HoldStart.press(), PressKind::Fresh);
        assert_eq!(DemandCategory::FlickStart.press(), PressKind::Slide);
    }

    #[test]
    fn reads_demands_from_json() {
        let json = r#"[
            {"demand_id": 7, "category": "HoldStart", "time": 1200,
             "position": [320.0, 400.5], "direction": [1.0, 0.0]}
        ]"#;
        let demands = from_json_str(json).expect("valid demand json");
        assert_eq!(demands.len(), 1);
        let d = demands[0];
        assert_eq!(d.demand_id, DemandId(7));
        assert_eq!(d.category, DemandCategory::HoldStart);
        assert_eq!(d.time, 1200);
        assert_eq!(d.position, DVec2::new(320.0, 400.5));
    }

    #[test]
    fn rejects_unknown_category() {
        let json = r#"[{"demand_id": 1, "category": "Slide", "time": 0,
                        "position": [0.0, 0.0], "direction": [1.0, 0.0]}]"#;
        assert!(from_json_str(json).is_err());
    }
}
