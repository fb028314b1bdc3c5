use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod bot;
mod config;
mod error;
mod radio;
mod snapshot;
mod ui;
mod voice;

use crate::bot::{CacheOccupancy, ChannelNotifier, RadioBot};
use crate::config::Config;
use crate::radio::resolver::{HttpFetcher, HttpProber};
use crate::radio::{CoreSettings, RadioCore};
use crate::voice::songbird::SongbirdTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_radio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("📻 Iniciando Open Radio Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let global_stations = config.load_global_stations()?;
    info!("📻 {} estaciones globales cargadas", global_stations.len());

    // Songbird se crea antes del cliente para poder cablearlo en el núcleo
    let manager = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(manager.clone(), reqwest::Client::new()));
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?);
    let prober = Arc::new(HttpProber::new(Duration::from_secs(config.probe_timeout_secs))?);
    let occupancy = Arc::new(CacheOccupancy::new());
    let notifier = Arc::new(ChannelNotifier::new());

    let core = RadioCore::new(
        CoreSettings::from(&config),
        global_stations,
        &config.data_dir,
        transport,
        fetcher,
        prober,
        occupancy.clone(),
        notifier.clone(),
    );

    // Intents mínimos: solo guilds y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let config = Arc::new(config);
    let handler = RadioBot::new(config.clone(), core.clone(), occupancy, notifier);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    // Shutdown ordenado: detener todas las sesiones y persistir
    let shutdown_core = core.clone();
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_core.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
