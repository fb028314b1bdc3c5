use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info};

use crate::radio::stations::Station;

/// Estado plano que sobrevive a un reinicio: estaciones globales (solo
/// informativas al cargar), estaciones por servidor y metadatos de las
/// sesiones activas. Las claves de guild se guardan como texto, igual que
/// en el resto del archivo JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub radios: HashMap<String, Station>,
    #[serde(default)]
    pub server_stations: HashMap<String, HashMap<String, Station>>,
    #[serde(default)]
    pub current_radios: HashMap<String, SessionMeta>,
}

/// Lo que se persiste de una sesión: estación, URL resuelta y arranque.
/// El handle de voz no sobrevive; las sesiones no se retoman al arrancar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub name: String,
    pub url: String,
    pub start_time: DateTime<Utc>,
}

/// Persistencia del snapshot en un archivo JSON bajo el directorio de
/// datos. Los fallos de escritura y lectura se loguean y nunca tumban el
/// proceso: el estado en memoria manda.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("bot_state.json"),
        }
    }

    /// Escribe el snapshot. Se llama tras cada operación que muta estado.
    pub async fn save(&self, snapshot: &StateSnapshot) {
        let content = match serde_json::to_string_pretty(snapshot) {
            Ok(content) => content,
            Err(e) => {
                error!("❌ Error serializando snapshot: {}", e);
                return;
            }
        };

        if let Err(e) = fs::write(&self.path, content).await {
            error!("❌ Error guardando snapshot en {}: {}", self.path.display(), e);
        }
    }

    /// Lee el snapshot una vez al arrancar. Sin archivo se empieza de cero.
    pub async fn load(&self) -> Option<StateSnapshot> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📂 Sin snapshot previo, arrancando limpio");
                return None;
            }
            Err(e) => {
                error!("❌ Error leyendo snapshot {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<StateSnapshot>(&content) {
            Ok(snapshot) => {
                info!(
                    "📂 Snapshot cargado: {} globales, {} servidores, {} sesiones",
                    snapshot.radios.len(),
                    snapshot.server_stations.len(),
                    snapshot.current_radios.len()
                );
                Some(snapshot)
            }
            Err(e) => {
                error!("❌ Snapshot corrupto, se ignora: {}", e);
                None
            }
        }
    }
}
