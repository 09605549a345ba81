mod audio;
mod dataset;
mod error;
mod extractor;
mod gan;
mod model;
mod stats;
mod synthesizer;
mod util;
mod windower;

pub use audio::*;
pub use dataset::*;
pub use error::*;
pub use extractor::*;
pub use gan::*;
pub use model::config::*;
pub use model::notes::*;
pub use stats::*;
pub use synthesizer::*;
pub use util::*;
pub use windower::*;
