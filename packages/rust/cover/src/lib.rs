//! Cover image generation.
//!
//! This crate provides:
//! - [`CoverGenerator`]: drives the external render tool
//! - [`auto_select_style`]: keyword-based style choice for untagged links
//! - [`CATALOGUE`]: style keys with display names and keywords

mod generator;
mod styles;

pub use generator::CoverGenerator;
pub use styles::{CATALOGUE, StyleInfo, auto_select_style, style_info};
