use std::path::PathBuf;

use clap::Parser;
use log::info;

use nfc_pushd::config::AppConfig;
use nfc_pushd::manager::Manager;
use nfc_pushd::mqtt::MqttClient;
use nfc_pushd::worker::RetryPolicy;

#[derive(Parser, Debug)]
#[command(version, about = "Push a payload to every NFC peer that comes into range")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;
    let payload = config.push.payload_bytes()?;
    let retry = RetryPolicy::from(&config.push);

    info!(
        "Pushing {} bytes per peer (max attempts: {})",
        payload.len(),
        retry.max_attempts
    );

    let (mqtt_client, eventloop) = MqttClient::new(&config.mqtt);
    mqtt_client.subscribe().await?;

    let core = Manager::new(mqtt_client, eventloop, payload, retry, config.quit_on_enter());
    let report = core.run_loop().await?;
    info!("Done: {report:?}");

    Ok(())
}
