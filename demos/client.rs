use argh::FromArgs;
use infernum_video::{DEFAULT_PROMPT, InferenceMode, InferenceRequest};
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8000;

#[derive(FromArgs)]
/// Infernum client for uploading videos and running predictions
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "upload" or "predict"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Upload(UploadCommand),
    Predict(PredictCommand),
}

#[derive(FromArgs)]
/// Upload a local video to the gateway
#[argh(subcommand, name = "upload")]
struct UploadCommand {
    /// the path to the video
    #[argh(option, short = 'v')]
    video_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p', default = "DEFAULT_PROMPT.to_string()")]
    prompt: String,

    /// the mode: "timestamped" or "summary"
    #[argh(option, short = 'm', default = "String::from(\"timestamped\")")]
    mode: String,
}

#[derive(FromArgs)]
/// Describe a video already reachable by URL, talking to the model server
#[argh(subcommand, name = "predict")]
struct PredictCommand {
    /// the URL of the video
    #[argh(option, short = 'u')]
    video_url: String,

    /// the prompt to use
    #[argh(option, short = 'p', default = "DEFAULT_PROMPT.to_string()")]
    prompt: String,

    /// the mode: "timestamped" or "summary"
    #[argh(option, short = 'm', default = "String::from(\"timestamped\")")]
    mode: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let response = match args.command {
        ClientCommands::Upload(upload) => {
            let filename = upload
                .video_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video.mp4".to_string());
            let data = tokio::fs::read(&upload.video_path).await?;

            let form = reqwest::multipart::Form::new()
                .text("prompt", upload.prompt)
                .text("mode", upload.mode)
                .part(
                    "file",
                    reqwest::multipart::Part::bytes(data).file_name(filename),
                );

            client
                .post(format!("http://{}/upload-video", addr))
                .multipart(form)
                .send()
                .await?
        }
        ClientCommands::Predict(predict) => {
            client
                .post(format!("http://{}/predict", addr))
                .json(&InferenceRequest::new(
                    predict.video_url,
                    predict.prompt,
                    InferenceMode::from(predict.mode.as_str()),
                ))
                .send()
                .await?
        }
    };

    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("Status: {}", status);
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
