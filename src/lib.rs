//! Storylet Engine: narrative generation from small reusable fragments.
//!
//! Storylets pose open questions (`?key`) and provide answers (`+key:value`).
//! A randomized, priority-biased backtracking search binds storylets into a
//! tree whose global fact table stays consistent, and runs as a resumable
//! computation that a host can advance in small time slices.

pub mod core;
pub mod schema;
