use crate::game::demand::{CategoryGroup, DemandId, JudgmentDemand, Millis};
use log::{debug, warn};
use std::collections::BTreeMap;

/// All demands quantized to one timestamp, split by what they do to their pointer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub time: Millis,
    pub creating: Vec<JudgmentDemand>,
    pub continuing: Vec<JudgmentDemand>,
    pub releasing: Vec<JudgmentDemand>,
}

impl Frame {
    pub fn new(time: Millis) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.creating.len() + self.continuing.len() + self.releasing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames holding a tap or a hold start drive keyframe recycling.
    pub fn is_keyframe(&self) -> bool {
        self.creating.iter().any(|d| d.category.is_keyframe())
    }

    pub fn demands_mut(&mut self) -> impl Iterator<Item = &mut JudgmentDemand> {
        self.creating
            .iter_mut()
            .chain(self.continuing.iter_mut())
            .chain(self.releasing.iter_mut())
    }

    #[inline(always)]
    fn holds(list: &[JudgmentDemand], id: DemandId) -> bool {
        list.iter().any(|d| d.demand_id == id)
    }

    /// Per `demand_id` a frame keeps at most one creating entry (the earliest),
    /// one releasing entry (the latest) and one continuing sample (the latest,
    /// and only when the id neither starts nor ends here).
    pub fn insert(&mut self, demand: JudgmentDemand) {
        let id = demand.demand_id;
        match demand.group() {
            CategoryGroup::Creates => {
                if let Some(existing) = self.creating.iter().find(|d| d.demand_id == id) {
                    warn!(
                        "Dropping duplicate {} for demand {id} at {}ms (already {} at {}ms).",
                        demand.category, demand.time, existing.category, existing.time
                    );
                    return;
                }
                self.continuing.retain(|d| d.demand_id != id);
                self.creating.push(demand);
            }
            CategoryGroup::Releases => {
                self.continuing.retain(|d| d.demand_id != id);
                match self.releasing.iter_mut().find(|d| d.demand_id == id) {
                    Some(existing) if existing.time <= demand.time => *existing = demand,
                    Some(_) => {}
                    None => self.releasing.push(demand),
                }
            }
            CategoryGroup::Continues => {
                if Self::holds(&self.creating, id) || Self::holds(&self.releasing, id) {
                    return;
                }
                match self.continuing.iter_mut().find(|d| d.demand_id == id) {
                    Some(existing) if existing.time <= demand.time => *existing = demand,
                    Some(_) => {}
                    None => self.continuing.push(demand),
                }
            }
        }
    }
}

/// Start of the `quantum_ms` bucket holding `time`. Negative times floor.
#[inline(always)]
pub fn bucket_time(time: Millis, quantum_ms: u32) -> Millis {
    let q = quantum_ms.max(1) as Millis;
    if q == 1 {
        return time;
    }
    time.div_euclid(q) * q
}

/// Buckets demands into frames keyed by quantized time. Hold and flick
/// sub-steps must already be expanded by the demand source.
pub fn build_frames<I>(demands: I, quantum_ms: u32) -> BTreeMap<Millis, Frame>
where
    I: IntoIterator<Item = JudgmentDemand>,
{
    let mut sorted: Vec<JudgmentDemand> = demands.into_iter().collect();
    sorted.sort_by(|a, b| {
        a.time
            .cmp(&b.time)
            .then(a.demand_id.cmp(&b.demand_id))
            .then(a.category.cmp(&b.category))
    });

    let mut frames: BTreeMap<Millis, Frame> = BTreeMap::new();
    for demand in sorted {
        let key = bucket_time(demand.time, quantum_ms);
        frames
            .entry(key)
            .or_insert_with(|| Frame::new(key))
            .insert(demand);
    }
    debug!(
        "Built {} frames ({}ms quantum).",
        frames.len(),
        quantum_ms.max(1)
    );
    frames
}
