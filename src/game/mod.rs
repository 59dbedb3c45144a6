pub mod allocator;
pub mod consolidate;
pub mod correction;
pub mod demand;
pub mod error;
pub mod events;
pub mod frame;
pub mod planner;
pub mod pointer;
