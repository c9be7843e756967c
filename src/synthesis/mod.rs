//! Signal generators used by the transformation pipeline.

pub mod binaural;

pub use binaural::{generate_binaural_beat, BrainwaveBand};
