pub mod audio;
pub mod jobs;

pub use audio::*;
pub use jobs::*;
