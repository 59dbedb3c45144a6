use crate::config::ConfigError;
use crate::game::demand::{DemandId, Millis};
use glam::DVec2;
use thiserror::Error;

/// Failures that make a planning run's output non-authoritative.
#[derive(Debug, Error)]
pub enum PlanError {
    /// More simultaneous contacts were needed than the pointer cap allows.
    /// Retrying with a more aggressive consolidation policy may succeed.
    #[error("pointer pool exhausted at {time}ms: {demanded} contacts needed, cap is {cap}")]
    PlanningExhausted {
        time: Millis,
        demanded: usize,
        cap: usize,
    },

    /// A logic defect in the allocator; never caused by input data alone.
    #[error(
        "invariant violated at {time}ms on pointer {pointer_id}: {detail} (demands {demand_ids:?})"
    )]
    InvariantViolation {
        time: Millis,
        pointer_id: u32,
        demand_ids: Vec<DemandId>,
        detail: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PlanError {
    pub fn violation(
        time: Millis,
        pointer_id: u32,
        demand_ids: &[DemandId],
        detail: impl Into<String>,
    ) -> Self {
        Self::InvariantViolation {
            time,
            pointer_id,
            demand_ids: demand_ids.to_vec(),
            detail: detail.into(),
        }
    }

    /// Adds the demands being served to a violation raised below them.
    pub fn with_demands(mut self, ids: &[DemandId]) -> Self {
        if let Self::InvariantViolation { demand_ids, .. } = &mut self {
            for id in ids {
                if !demand_ids.contains(id) {
                    demand_ids.push(*id);
                }
            }
        }
        self
    }

    #[inline(always)]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::PlanningExhausted { .. })
    }
}

/// Diagnostics recorded alongside otherwise valid output.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanWarning {
    /// An off-screen demand with no usable strip was moved to a nearby
    /// sample of its judgment line.
    CorrectionResampled {
        demand_id: DemandId,
        time: Millis,
        offset_ms: f64,
        from: DVec2,
        to: DVec2,
    },
    /// The resampling search ran out of steps; the demand keeps its
    /// off-screen position and may not be judged.
    GeometryUnresolved {
        demand_id: DemandId,
        time: Millis,
        position: DVec2,
    },
    /// A hold or flick never received its end step; its pointer was lifted
    /// when the stream finished.
    UnterminatedGesture {
        demand_id: DemandId,
        pointer_id: u32,
        last_touched_at: Millis,
    },
}

impl std::fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorrectionResampled {
                demand_id,
                time,
                offset_ms,
                from,
                to,
            } => write!(
                f,
                "demand {demand_id} at {time}ms resampled {offset_ms:+.1}ms: ({:.2}, {:.2}) => ({:.2}, {:.2})",
                from.x, from.y, to.x, to.y
            ),
            Self::GeometryUnresolved {
                demand_id,
                time,
                position,
            } => write!(
                f,
                "demand {demand_id} at {time}ms left off-screen at ({:.2}, {:.2})",
                position.x, position.y
            ),
            Self::UnterminatedGesture {
                demand_id,
                pointer_id,
                last_touched_at,
            } => write!(
                f,
                "demand {demand_id} never ended; pointer {pointer_id} lifted after {last_touched_at}ms"
            ),
        }
    }
}
