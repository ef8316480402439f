use crate::fetch::{self, FetchError, VideoSource};
use crate::messages::{FrameDescription, InferenceMode, InferenceRequest, InferenceResult};
use crate::model::{GenerationRequest, IMAGE_TOKEN, VisionInput, VisionLanguageModel};
use crate::sampler::{self, DEFAULT_NUM_FRAMES};
use crate::video::VideoBackend;
use std::path::PathBuf;

/// Anything that turns an inference request into a result.
///
/// Failures are reported inside the returned [`InferenceResult`], never as a
/// panic or an `Err`.
pub trait Predictor {
    fn predict(&mut self, request: &InferenceRequest) -> InferenceResult;
}

#[derive(Clone, Debug)]
pub struct PredictorConfig {
    /// Number of frames sampled from each video.
    pub num_frames: usize,
    /// Token cap for each per-frame description.
    pub frame_max_tokens: usize,
    /// Token cap for the whole-video description.
    pub summary_max_tokens: usize,
    /// Directory for downloaded videos, the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            num_frames: DEFAULT_NUM_FRAMES,
            frame_max_tokens: 100,
            summary_max_tokens: 200,
            temp_dir: None,
        }
    }
}

/// Progress of a single request through [`VideoInference`].
///
/// `Done` and `Failed` are terminal; any other stage can move to `Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredictStage {
    Received,
    Validating,
    Fetching,
    Sampling,
    Generating,
    Summarizing,
    Done,
    Failed,
}

impl PredictStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictStage::Received => "received",
            PredictStage::Validating => "validating",
            PredictStage::Fetching => "fetching",
            PredictStage::Sampling => "sampling",
            PredictStage::Generating => "generating",
            PredictStage::Summarizing => "summarizing",
            PredictStage::Done => "done",
            PredictStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PredictStage::Done | PredictStage::Failed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("video_url is required")]
    MissingVideo,

    #[error("Failed to download video: {0}")]
    Download(FetchError),

    #[error("No frames could be extracted from video")]
    NoFrames,

    #[error("Processing failed: {0}")]
    Processing(Box<dyn std::error::Error + Send + Sync>),
}

impl PredictError {
    fn processing(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        PredictError::Processing(Box::new(err))
    }
}

impl From<FetchError> for PredictError {
    fn from(err: FetchError) -> Self {
        if err.is_download() {
            PredictError::Download(err)
        } else {
            PredictError::processing(err)
        }
    }
}

/// Describes videos with a vision-language model.
///
/// Each request downloads the video into a scoped temporary file, samples
/// frames from it and either describes every frame on its own
/// ([`InferenceMode::Timestamped`]) or the whole sequence at once
/// ([`InferenceMode::Summary`]).
pub struct VideoInference<M, B> {
    model: M,
    backend: B,
    config: PredictorConfig,
    stage: PredictStage,
}

impl<M: VisionLanguageModel, B: VideoBackend> VideoInference<M, B> {
    pub fn new(model: M, backend: B) -> Self {
        Self::with_config(model, backend, PredictorConfig::default())
    }

    pub fn with_config(model: M, backend: B, config: PredictorConfig) -> Self {
        Self {
            model,
            backend,
            config,
            stage: PredictStage::Done,
        }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Stage reached by the most recent request.
    pub fn stage(&self) -> PredictStage {
        self.stage
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs a request whose video is given directly rather than by URL.
    pub fn predict_source(
        &mut self,
        source: Option<VideoSource>,
        prompt: &str,
        mode: InferenceMode,
    ) -> InferenceResult {
        self.enter(PredictStage::Received);

        match self.run(source, prompt, mode) {
            Ok(result) => {
                self.enter(PredictStage::Done);
                result
            }
            Err(err) => {
                self.enter(PredictStage::Failed);
                log::error!("{}", err);
                InferenceResult::Error {
                    error: err.to_string(),
                }
            }
        }
    }

    fn enter(&mut self, stage: PredictStage) {
        log::debug!("{} -> {}", self.stage.as_str(), stage.as_str());
        self.stage = stage;
    }

    fn run(
        &mut self,
        source: Option<VideoSource>,
        prompt: &str,
        mode: InferenceMode,
    ) -> Result<InferenceResult, PredictError> {
        self.enter(PredictStage::Validating);
        let source = source.ok_or(PredictError::MissingVideo)?;

        self.enter(PredictStage::Fetching);
        // removed from disk when dropped, whichever way this function returns
        let video = fetch::materialize(&source, self.config.temp_dir.as_deref())?;

        self.enter(PredictStage::Sampling);
        log::info!("Extracting frames from video...");
        let mut decoder = self.backend.open(video.path()).map_err(|err| {
            if err.is_unreadable() {
                // a file no decoder understands has no frames to give
                log::warn!("Could not open downloaded video: {}", err);
                PredictError::NoFrames
            } else {
                PredictError::processing(err)
            }
        })?;
        let samples = sampler::sample_frames(&mut decoder, self.config.num_frames);
        if samples.is_empty() {
            return Err(PredictError::NoFrames);
        }
        log::info!("Extracted {} frames", samples.len());

        let prompt = format!("{IMAGE_TOKEN}{prompt}");

        let result = match mode {
            InferenceMode::Timestamped => {
                self.enter(PredictStage::Generating);
                let mut frames = Vec::with_capacity(samples.len());
                for (i, sample) in samples.iter().enumerate() {
                    log::info!(
                        "Processing frame {}/{} - Timestamp: {:.2}s",
                        i + 1,
                        samples.len(),
                        sample.timestamp
                    );

                    let text = self
                        .model
                        .generate(GenerationRequest {
                            prompt: &prompt,
                            input: VisionInput::Image(&sample.image),
                            max_new_tokens: self.config.frame_max_tokens,
                        })
                        .map_err(PredictError::processing)?;
                    log::info!("Frame {} description: {}...", i + 1, preview(&text));

                    frames.push(FrameDescription {
                        timestamp: round2(sample.timestamp),
                        frame_number: sample.frame_index,
                        description: text,
                    });
                }
                log::info!("Generated {} timestamped descriptions", frames.len());
                InferenceResult::Frames { frames }
            }
            InferenceMode::Summary => {
                self.enter(PredictStage::Summarizing);
                let images: Vec<_> = samples.into_iter().map(|s| s.image).collect();
                let description = self
                    .model
                    .generate(GenerationRequest {
                        prompt: &prompt,
                        input: VisionInput::Video(&images),
                        max_new_tokens: self.config.summary_max_tokens,
                    })
                    .map_err(PredictError::processing)?;
                log::info!("Summary description: {}...", preview(&description));
                InferenceResult::Summary { description }
            }
        };

        let path = video.path().to_path_buf();
        match video.close() {
            Ok(()) => log::info!("Temporary video file cleaned up"),
            Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
        }

        Ok(result)
    }
}

impl<M: VisionLanguageModel, B: VideoBackend> Predictor for VideoInference<M, B> {
    fn predict(&mut self, request: &InferenceRequest) -> InferenceResult {
        log::info!(
            "Prediction started - url: {:?}, mode: {}, prompt: {}",
            request.video_url,
            request.mode.as_str(),
            request.prompt
        );

        let source = request
            .video_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| VideoSource::Url(url.to_string()));

        self.predict_source(source, &request.prompt, request.mode)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
