//! Property tests over whole planning runs. For any chart, every preset
//! either produces a stream that a touch host accepts or reports that the
//! pointer pool ran dry; nothing else is allowed.

use glam::DVec2;
use proptest::prelude::*;
use rustc_hash::FxHashMap;
use touchplan::config::StripAnchor;
use touchplan::core::codec;
use touchplan::game::correction::correct;
use touchplan::{
    DemandCategory, EventStream, JudgmentDemand, PlanError, PlannerConfig, Screen, TouchAction,
    plan,
};

const SCREEN: Screen = Screen::new(1280, 720);

// --- Chart generation ---

#[derive(Clone, Copy, Debug)]
enum Kind {
    Tap,
    Drag,
    Hold(i32),
    Flick(i32),
}

fn kind() -> impl Strategy<Value = Kind> {
    prop_oneof![
        3 => Just(Kind::Tap),
        2 => Just(Kind::Drag),
        1 => (2i32..40).prop_map(Kind::Hold),
        1 => (2i32..20).prop_map(Kind::Flick),
    ]
}

fn note() -> impl Strategy<Value = (Kind, i32, f64, f64, f64)> {
    (kind(), 0i32..600, -100.0f64..1380.0, -100.0f64..820.0, 0.0f64..std::f64::consts::TAU)
}

fn push_gesture(
    out: &mut Vec<JudgmentDemand>,
    id: u32,
    time: i32,
    len: i32,
    origin: DVec2,
    dir: DVec2,
    steps: [DemandCategory; 3],
) {
    let at = |dt: i32| origin + DVec2::new(f64::from(dt) * 3.0, 0.0);
    out.push(JudgmentDemand::new(id, steps[0], time, at(0), dir));
    for dt in 1..len {
        out.push(JudgmentDemand::new(id, steps[1], time + dt, at(dt), dir));
    }
    out.push(JudgmentDemand::new(id, steps[2], time + len, at(len), dir));
}

fn expand(notes: &[(Kind, i32, f64, f64, f64)]) -> Vec<JudgmentDemand> {
    use DemandCategory::*;
    let mut out = Vec::new();
    for (id, &(kind, time, x, y, angle)) in notes.iter().enumerate() {
        let id = id as u32;
        let origin = DVec2::new(x, y);
        let dir = DVec2::new(angle.cos(), angle.sin());
        match kind {
            Kind::Tap => out.push(JudgmentDemand::new(id, Tap, time, origin, dir)),
            Kind::Drag => out.push(JudgmentDemand::new(id, Drag, time, origin, dir)),
            Kind::Hold(len) => {
                let phases = [HoldStart, HoldSample, HoldEnd];
                push_gesture(&mut out, id, time, len, origin, dir, phases);
            }
            Kind::Flick(len) => {
                let phases = [FlickStart, FlickSample, FlickEnd];
                push_gesture(&mut out, id, time, len, origin, dir, phases);
            }
        }
    }
    out
}

fn chart() -> impl Strategy<Value = Vec<JudgmentDemand>> {
    proptest::collection::vec(note(), 0..40).prop_map(|notes| expand(&notes))
}

// --- Independent stream checks ---

fn check_stream(stream: &EventStream, cap: usize) -> Result<(), String> {
    let mut pressed: FxHashMap<u32, bool> = FxHashMap::default();
    let mut prev = None;
    for (time, events) in &stream.groups {
        if prev.is_some_and(|p| p >= *time) {
            return Err(format!("group {time} out of order"));
        }
        prev = Some(*time);

        let mut seen = Vec::new();
        for e in events {
            if seen.contains(&e.pointer_id) {
                return Err(format!("pointer {} twice at {time}", e.pointer_id));
            }
            seen.push(e.pointer_id);

            let down = pressed.entry(e.pointer_id).or_insert(false);
            match (e.action, *down) {
                (TouchAction::Down, false) => *down = true,
                (TouchAction::Move, true) => {}
                (TouchAction::Up, true) => *down = false,
                (action, state) => {
                    return Err(format!(
                        "{action} on pointer {} (pressed: {state}) at {time}",
                        e.pointer_id
                    ));
                }
            }
        }
        let open = pressed.values().filter(|d| **d).count();
        if open > cap {
            return Err(format!("{open} contacts open at {time}, cap {cap}"));
        }
    }
    if pressed.values().any(|d| *d) {
        return Err("a pointer is never lifted".to_string());
    }
    Ok(())
}

// --- Properties ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn every_preset_yields_a_legal_stream_or_exhaustion(demands in chart()) {
        for config in PlannerConfig::fallback_chain() {
            match plan(demands.clone(), SCREEN, &config, None) {
                Ok(plan) => {
                    if let Err(msg) = check_stream(&plan.stream, config.pointer_cap) {
                        prop_assert!(false, "{}: {}", config.label(), msg);
                    }
                    prop_assert!(plan.stats.peak_contacts <= config.pointer_cap);
                }
                Err(PlanError::PlanningExhausted { cap, demanded, .. }) => {
                    prop_assert_eq!(cap, config.pointer_cap);
                    prop_assert!(demanded > cap);
                }
                Err(other) => prop_assert!(false, "{}: {}", config.label(), other),
            }
        }
    }

    #[test]
    fn pointer_ids_stay_in_their_range(demands in chart()) {
        let config = PlannerConfig::geometric();
        if let Ok(plan) = plan(demands, SCREEN, &config, None) {
            let lo = config.pointer_id_offset;
            let hi = lo + config.pointer_cap as u32;
            for (_, e) in plan.stream.iter() {
                prop_assert!((lo..hi).contains(&e.pointer_id), "id {}", e.pointer_id);
            }
        }
    }

    #[test]
    fn planned_streams_survive_the_byte_format(demands in chart()) {
        if let Ok(plan) = plan(demands, SCREEN, &PlannerConfig::proximity(), None) {
            let bytes = codec::encode(&plan.stream).expect("groups fit in a byte count");
            let back = codec::decode(&bytes).expect("decode what was encoded");
            prop_assert_eq!(back, plan.stream);
        }
    }

    #[test]
    fn correcting_twice_changes_nothing(
        x in -3000.0f64..4000.0,
        y in -3000.0f64..4000.0,
        angle in 0.0f64..std::f64::consts::TAU,
        nearest in any::<bool>(),
    ) {
        let anchor = if nearest { StripAnchor::NearestEdge } else { StripAnchor::Midpoint };
        let dir = DVec2::new(angle.cos(), angle.sin());
        let once = correct(&SCREEN, DVec2::new(x, y), dir, anchor);
        let twice = correct(&SCREEN, once, dir, anchor);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn corrected_points_are_visible_when_the_strip_reaches_the_screen(
        x in -3000.0f64..4000.0,
        y in 0.0f64..720.0,
    ) {
        // A vertical line means a horizontal strip axis, which always crosses
        // the screen when `y` is in range.
        let p = correct(&SCREEN, DVec2::new(x, y), DVec2::Y, StripAnchor::Midpoint);
        prop_assert!(SCREEN.contains(p), "{:?}", p);
        prop_assert_eq!(p.y, y);
    }
}
