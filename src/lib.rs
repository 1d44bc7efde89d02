//! Crime-aware road routing.
//!
//! Crime incidents are snapped onto road edges, blended with edge length into
//! a normalized cost, and three route variants (safest, fastest, most unsafe)
//! are searched between two coordinates.

pub mod api;
pub mod config;
pub mod crime;
mod error;
pub mod graph;
pub mod heatmap;
pub mod planner;
pub mod provider;
pub mod render;
pub mod service;
pub mod stats;
pub mod weights;

pub use error::Error;
