//! Video description on top of vision-language models.
//!
//! The crate has two sides:
//!
//! * a model server: [`predictor::VideoInference`] downloads a video, samples
//!   frames from it with [`sampler::sample_frames`] and describes them with a
//!   [`model::VisionLanguageModel`]; [`engine::InfernumEngine`] hosts it on a
//!   worker thread and [`server::router`] exposes it over HTTP.
//! * an upload gateway: [`gateway::router`] takes video uploads, stores them
//!   in a [`storage::BlobStore`] and relays a signed URL to the model server
//!   through [`relay::RelayClient`].

pub mod engine;
pub mod fetch;
pub mod frame;
pub mod gateway;
pub mod messages;
pub mod model;
pub mod predictor;
pub mod relay;
pub mod sampler;
pub mod server;
pub mod settings;
pub mod storage;
pub mod video;

pub use engine::{EngineError, InfernumEngine, InfernumEngineState};
pub use frame::{DecodedFrame, FrameSample, PixelFormat, RgbImage, mosaic};
pub use messages::{
    DEFAULT_PROMPT, FrameDescription, InferenceMode, InferenceRequest, InferenceResult,
};
pub use model::{GenerationRequest, VisionInput, VisionLanguageModel};
pub use predictor::{PredictError, PredictStage, Predictor, PredictorConfig, VideoInference};
pub use settings::Settings;
pub use video::{FfmpegBackend, VideoBackend, VideoDecoder};
