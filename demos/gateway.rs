use argh::FromArgs;
use infernum_video::gateway::{self, GatewayState};
use infernum_video::relay::RelayClient;
use infernum_video::settings::Settings;
use infernum_video::storage::OperatorBlobStore;
use std::{path::PathBuf, sync::Arc};

// defaults for the gateway
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

#[derive(FromArgs)]
/// Upload gateway: stores videos and forwards them to the inference service.
struct GatewayArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// optional TOML settings file, environment variables take precedence
    #[argh(option, short = 's')]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: GatewayArgs = argh::from_env();

    let settings = Settings::load(args.settings.as_deref())?;
    log::debug!("{:?}", settings);
    if let Some(project) = settings.project_id() {
        log::info!("Storage project: {}", project);
    }

    let store = OperatorBlobStore::gcs(
        &settings.storage_bucket,
        settings.storage_credentials_json.as_deref(),
    )?;
    let relay = RelayClient::new(&settings.relay_url, &settings.relay_api_key);
    log::info!("Relaying to model {} at {}", settings.relay_model_id, relay.url());

    let app = gateway::router(
        GatewayState {
            store: Arc::new(store),
            relay,
        },
        settings.max_upload_bytes,
    );

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    log::info!("🚀 Starting the gateway");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
