//! Slot and lane reservation tracking

pub mod tracker;

pub use tracker::SlotTracker;
