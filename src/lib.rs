//! Turns rhythm-game judgment demands into a synthetic multi-touch stream
//! that stays within the host's pointer cap.
//!
//! ```no_run
//! use touchplan::{PlannerConfig, Screen, demand, plan_with_fallback};
//!
//! let demands = demand::from_json_str("[]")?;
//! let chain = PlannerConfig::fallback_chain();
//! let plan = plan_with_fallback(&demands, Screen::new(1280, 720), &chain, None)?;
//! for (time, events) in &plan.stream.groups {
//!     for event in events {
//!         println!("{time}ms {event}");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod core;
pub mod game;

pub use config::{ConfigError, PlannerConfig, install_logger};
pub use crate::core::cache::{CacheError, PlanCache};
pub use crate::core::codec::CodecError;
pub use crate::core::geometry::Screen;
pub use game::correction::LineSampler;
pub use game::demand::{self, DemandCategory, DemandId, JudgmentDemand, Millis};
pub use game::error::{PlanError, PlanWarning};
pub use game::events::{EventStream, StreamStats, TouchAction, TouchEvent};
pub use game::planner::{Plan, plan, plan_cached, plan_with_fallback};
