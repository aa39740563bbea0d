//! Vellum Layout
//!
//! Moves document items around: separation-constrained placement, rectangle
//! overlap removal and connector graph layout. Every entry point is a pure
//! function of the current item geometry and its options; nothing is kept
//! between calls.
//!
//! # Modules
//!
//! - `vpsc`: one-dimensional least-squares placement under `x[l] + gap <= x[r]`
//! - `overlap`: two-pass rectangle overlap removal built on `vpsc`
//! - `graph`: stress majorization over connector graphs with directed-edge
//!   constraints

pub mod error;
pub mod graph;
pub mod overlap;
pub mod vpsc;

pub use error::{LayoutError, Result};
pub use graph::{graph_layout, GraphLayoutOptions, GraphLayoutReport};
pub use overlap::{padded, remove_overlaps, separate_rects, OverlapOptions};
pub use vpsc::{Constraint, Variable};
