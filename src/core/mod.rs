// Core algorithm exports
pub mod error;
pub mod feature_codec;
pub mod forest;
pub mod label_codec;
pub mod pipeline;
pub mod synthetic;

pub use error::{CodecError, TrainingError};
pub use feature_codec::{FeatureCodec, UnknownCategory};
pub use forest::{ForestOptions, RandomForest};
pub use label_codec::LabelCodec;
pub use pipeline::{ingest, ModelArtifactPair, TrainingPipeline};
