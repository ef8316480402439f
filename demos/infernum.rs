use argh::FromArgs;
use infernum_video::model::IMAGE_TOKEN;
use infernum_video::{
    FfmpegBackend, GenerationRequest, InfernumEngine, PredictorConfig, VideoInference,
    VisionInput, VisionLanguageModel, mosaic, server,
};
use kornia_image::ImageError;
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};
use std::{path::PathBuf, sync::Arc};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_FRAMES: usize = 8;

// frames per row when a whole video is shown to the model as one image
const MOSAIC_COLUMNS: usize = 4;

#[derive(FromArgs)]
/// Infernum is a tool for describing videos with a vision-language model.
struct InfernumArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// number of frames sampled from each video
    #[argh(option, short = 'n', default = "DEFAULT_FRAMES")]
    frames: usize,

    /// directory holding the ffmpeg and ffprobe binaries, PATH by default
    #[argh(option)]
    ffmpeg_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum PaligemmaModelError {
    #[error(transparent)]
    Paligemma(#[from] PaligemmaError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("no frames to describe")]
    NoFrames,
}

// custom model that uses Paligemma to run inference
struct PaligemmaModel(Paligemma);

impl VisionLanguageModel for PaligemmaModel {
    type Error = PaligemmaModelError;

    fn generate(&mut self, request: GenerationRequest<'_>) -> Result<String, Self::Error> {
        // Paligemma sees a single image, a video is tiled into a mosaic
        let tiled;
        let image = match request.input {
            VisionInput::Image(image) => image,
            VisionInput::Video(frames) => {
                tiled = mosaic(frames, MOSAIC_COLUMNS)?.ok_or(PaligemmaModelError::NoFrames)?;
                &tiled
            }
        };

        // the image placeholder is added by the model's own processor
        let prompt = request.prompt.trim_start_matches(IMAGE_TOKEN);

        Ok(self
            .0
            .inference(image, prompt, request.max_new_tokens, false)?)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: InfernumArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let backend = match &args.ffmpeg_dir {
        Some(dir) => FfmpegBackend {
            ffmpeg_path: dir.join("ffmpeg"),
            ffprobe_path: dir.join("ffprobe"),
        },
        None => FfmpegBackend::default(),
    };

    let model = Paligemma::new(PaligemmaConfig::default())?;
    let inference = VideoInference::with_config(
        PaligemmaModel(model),
        backend,
        PredictorConfig {
            num_frames: args.frames,
            ..Default::default()
        },
    );
    let engine = Arc::new(InfernumEngine::new(inference));

    let app = server::router(engine);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
