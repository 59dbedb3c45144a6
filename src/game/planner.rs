use crate::config::{ConfigError, PlannerConfig};
use crate::core::cache::{PlanCache, config_fingerprint, content_hash};
use crate::core::geometry::Screen;
use crate::game::allocator::PointerAllocator;
use crate::game::correction::{GeometryCorrector, LineSampler};
use crate::game::demand::JudgmentDemand;
use crate::game::error::{PlanError, PlanWarning};
use crate::game::events::{EventStream, StreamStats};
use crate::game::frame::build_frames;
use log::{info, warn};
use std::time::Instant;

/// A successful planning run.
#[derive(Clone, Debug)]
pub struct Plan {
    pub stream: EventStream,
    pub warnings: Vec<PlanWarning>,
    pub stats: StreamStats,
    /// Label of the configuration that produced the stream.
    pub policy: String,
}

/// Runs the whole pipeline for one configuration: frames, correction,
/// allocation, then the consistency pass over the finished stream.
pub fn plan<I>(
    demands: I,
    screen: Screen,
    config: &PlannerConfig,
    sampler: Option<&dyn LineSampler>,
) -> Result<Plan, PlanError>
where
    I: IntoIterator<Item = JudgmentDemand>,
{
    config.validate()?;
    let started = Instant::now();
    let mut frames = build_frames(demands, config.frame_quantum_ms);
    info!(
        "Planning {} frames on a {}x{} screen ({}).",
        frames.len(),
        screen.width,
        screen.height,
        config.label()
    );

    let corrector = GeometryCorrector::new(screen, config, sampler);
    let mut allocator = PointerAllocator::new(screen, config);
    let mut warnings = Vec::new();
    for frame in frames.values_mut() {
        corrector.correct_frame(frame, &mut warnings);
        allocator.process(frame)?;
    }
    let (log, allocator_warnings) = allocator.finish()?;
    warnings.extend(allocator_warnings);

    let stream = log.into_stream(screen);
    let stats = stream.validate(config.pointer_cap)?;
    info!(
        "Planned {} events in {} groups, peak {} contacts, {} warnings ({:.2?}).",
        stats.events,
        stats.groups,
        stats.peak_contacts,
        warnings.len(),
        started.elapsed()
    );
    Ok(Plan {
        stream,
        warnings,
        stats,
        policy: config.label(),
    })
}

/// Tries each configuration in order, moving on only when the pointer pool
/// runs dry. Any other failure ends the chain.
pub fn plan_with_fallback(
    demands: &[JudgmentDemand],
    screen: Screen,
    configs: &[PlannerConfig],
    sampler: Option<&dyn LineSampler>,
) -> Result<Plan, PlanError> {
    let mut last_err = None;
    for config in configs {
        match plan(demands.iter().copied(), screen, config, sampler) {
            Ok(plan) => return Ok(plan),
            Err(err) if err.is_exhausted() => {
                warn!("{} failed: {err}. Trying the next policy.", config.label());
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        PlanError::Config(ConfigError::InvalidValue {
            key: "Policies",
            value: "no configuration to try".to_string(),
        })
    }))
}

/// Looks `source` (the chart's raw content) up in `cache` before planning.
/// A fresh plan is stored for next time; cache write failures only warn.
pub fn plan_cached(
    cache: &PlanCache,
    source: &[u8],
    demands: &[JudgmentDemand],
    screen: Screen,
    configs: &[PlannerConfig],
    sampler: Option<&dyn LineSampler>,
) -> Result<EventStream, PlanError> {
    let source_hash = content_hash(source);
    let fingerprint = config_fingerprint(configs);
    if let Some(stream) = cache.load(source_hash, fingerprint) {
        if stream.screen == screen {
            return Ok(stream);
        }
        info!(
            "Cached plan was made for a {}x{} screen; planning again.",
            stream.screen.width, stream.screen.height
        );
    }

    let plan = plan_with_fallback(demands, screen, configs, sampler)?;
    if let Err(e) = cache.store(source_hash, fingerprint, &plan.stream) {
        warn!("Could not cache plan {source_hash:016x}: {e}");
    }
    Ok(plan.stream)
}
