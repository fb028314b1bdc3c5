use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Definición de una estación global en el archivo de estaciones.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StationSeed {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub data_dir: PathBuf,
    pub stations_file: PathBuf,

    // Resolver
    pub resolver_cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub probe_timeout_secs: u64,

    // Sesiones de voz
    pub connect_attempts: u32,
    pub connect_timeout_secs: u64,
    pub disconnect_timeout_secs: u64,

    // Auto-desconexión
    pub idle_grace_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            stations_file: std::env::var("STATIONS_FILE")
                .unwrap_or_else(|_| "stations.json".to_string())
                .into(),

            // Resolver (1 hora de caché, fetch corto)
            resolver_cache_ttl_secs: std::env::var("RESOLVER_CACHE_TTL")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            probe_timeout_secs: std::env::var("PROBE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Voz
            connect_attempts: std::env::var("CONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            connect_timeout_secs: std::env::var("CONNECT_TIMEOUT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            disconnect_timeout_secs: std::env::var("DISCONNECT_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            // Auto-desconexión
            idle_grace_secs: std::env::var("IDLE_GRACE_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Carga las estaciones globales desde el archivo JSON configurado.
    /// Un archivo inexistente no es un error: el bot arranca sin globales.
    pub fn load_global_stations(&self) -> Result<HashMap<String, StationSeed>> {
        match std::fs::read_to_string(&self.stations_file) {
            Ok(content) => {
                let stations: HashMap<String, StationSeed> = serde_json::from_str(&content)?;
                Ok(stations)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_attempts == 0 {
            anyhow::bail!("CONNECT_ATTEMPTS must be at least 1");
        }

        if self.resolver_cache_ttl_secs == 0 {
            anyhow::bail!("RESOLVER_CACHE_TTL must be greater than 0");
        }

        if self.fetch_timeout_secs == 0 || self.probe_timeout_secs == 0 {
            anyhow::bail!("Network timeouts must be greater than 0");
        }

        if self.idle_grace_secs == 0 {
            anyhow::bail!("IDLE_GRACE_SECS must be greater than 0");
        }

        Ok(())
    }

    /// Resumen de configuración apto para logs (sin token).
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Paths: data={}, stations={}\n  \
            Resolver: {}s TTL, {}s fetch, {}s probe\n  \
            Voice: {} attempts, {}s connect, {}s disconnect\n  \
            Idle: {}s grace",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.data_dir.display(),
            self.stations_file.display(),
            self.resolver_cache_ttl_secs,
            self.fetch_timeout_secs,
            self.probe_timeout_secs,
            self.connect_attempts,
            self.connect_timeout_secs,
            self.disconnect_timeout_secs,
            self.idle_grace_secs,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            data_dir: "./data".into(),
            stations_file: "stations.json".into(),

            resolver_cache_ttl_secs: 3600, // 1 hora
            fetch_timeout_secs: 5,
            probe_timeout_secs: 10,

            connect_attempts: 3,
            connect_timeout_secs: 20,
            disconnect_timeout_secs: 5,

            idle_grace_secs: 30,
        }
    }
}
