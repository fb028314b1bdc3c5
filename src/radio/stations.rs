use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serenity::model::id::GuildId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::config::StationSeed;
use crate::error::{RadioError, Result};

/// Una estación con nombre y URL resoluble. Las globales vienen del archivo
/// de estaciones y son inmutables en runtime; las de servidor se gestionan
/// con `/station add` y `/station remove`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationScope {
    Global,
    Guild,
}

/// Registro de estaciones: conjunto global ∪ estaciones por servidor.
/// La unicidad de nombres se garantiza sobre la vista fusionada, por lo que
/// una estación de servidor nunca puede tapar una global.
pub struct StationRegistry {
    global: HashMap<String, Station>,
    guild: RwLock<HashMap<GuildId, HashMap<String, Station>>>,
}

impl StationRegistry {
    pub fn new(seeds: HashMap<String, StationSeed>) -> Self {
        let global = seeds
            .into_iter()
            .map(|(name, seed)| {
                let station = Station {
                    name: name.clone(),
                    url: seed.url,
                    description: seed.description,
                    added_by: None,
                    added_at: None,
                };
                (name, station)
            })
            .collect::<HashMap<_, _>>();

        info!("📻 Registro inicializado con {} estaciones globales", global.len());

        Self {
            global,
            guild: RwLock::new(HashMap::new()),
        }
    }

    /// Busca una estación en la vista fusionada del servidor.
    pub fn lookup(&self, guild_id: GuildId, name: &str) -> Option<Station> {
        if let Some(station) = self.global.get(name) {
            return Some(station.clone());
        }
        self.guild
            .read()
            .get(&guild_id)
            .and_then(|stations| stations.get(name))
            .cloned()
    }

    /// Lista ordenada para paginación: globales primero, luego las del
    /// servidor, cada bloque ordenado por nombre.
    pub fn list(&self, guild_id: GuildId) -> Vec<(Station, StationScope)> {
        let mut entries: Vec<(Station, StationScope)> = self
            .global
            .values()
            .cloned()
            .map(|s| (s, StationScope::Global))
            .collect();
        entries.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let guild_map = self.guild.read();
        if let Some(stations) = guild_map.get(&guild_id) {
            let mut local: Vec<(Station, StationScope)> = stations
                .values()
                .cloned()
                .map(|s| (s, StationScope::Guild))
                .collect();
            local.sort_by(|a, b| a.0.name.cmp(&b.0.name));
            entries.extend(local);
        }

        entries
    }

    /// Añade una estación de servidor. Falla con `StationConflict` si el
    /// nombre ya resuelve en la vista fusionada (global o local).
    pub fn add(&self, guild_id: GuildId, station: Station) -> Result<()> {
        if self.global.contains_key(&station.name) {
            return Err(RadioError::StationConflict {
                name: station.name,
            });
        }

        let mut guild_map = self.guild.write();
        let stations = guild_map.entry(guild_id).or_default();
        if stations.contains_key(&station.name) {
            return Err(RadioError::StationConflict {
                name: station.name,
            });
        }

        info!("➕ Estación '{}' añadida en guild {}", station.name, guild_id);
        stations.insert(station.name.clone(), station);
        Ok(())
    }

    /// Elimina una estación de servidor. Las globales nunca se eliminan en
    /// runtime. La comprobación de "en uso" la hace el núcleo, que conoce
    /// las sesiones activas.
    pub fn remove(&self, guild_id: GuildId, name: &str) -> Result<Station> {
        if self.global.contains_key(name) {
            return Err(RadioError::StationIsGlobal {
                name: name.to_string(),
            });
        }

        let mut guild_map = self.guild.write();
        let removed = guild_map
            .get_mut(&guild_id)
            .and_then(|stations| stations.remove(name));

        match removed {
            Some(station) => {
                // No dejar mapas vacíos colgando
                if guild_map
                    .get(&guild_id)
                    .is_some_and(|stations| stations.is_empty())
                {
                    guild_map.remove(&guild_id);
                }
                info!("➖ Estación '{}' eliminada de guild {}", name, guild_id);
                Ok(station)
            }
            None => Err(RadioError::StationNotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    pub fn guild_count(&self, guild_id: GuildId) -> usize {
        self.guild
            .read()
            .get(&guild_id)
            .map_or(0, |stations| stations.len())
    }

    /// Copia del conjunto global para el snapshot.
    pub fn global_stations(&self) -> HashMap<String, Station> {
        self.global.clone()
    }

    /// Copia de todas las estaciones de servidor, con claves serializables.
    pub fn guild_stations(&self) -> HashMap<String, HashMap<String, Station>> {
        self.guild
            .read()
            .iter()
            .map(|(guild_id, stations)| (guild_id.get().to_string(), stations.clone()))
            .collect()
    }

    /// Restaura las estaciones de servidor desde un snapshot. El conjunto
    /// global del snapshot se ignora: el archivo de estaciones manda.
    pub fn restore_guild_stations(&self, saved: HashMap<String, HashMap<String, Station>>) {
        let mut guild_map = self.guild.write();
        let mut restored = 0usize;
        for (guild_id_str, stations) in saved {
            let Ok(raw_id) = guild_id_str.parse::<u64>() else {
                continue;
            };
            // Una estación guardada que hoy choca con una global se descarta
            let stations: HashMap<String, Station> = stations
                .into_iter()
                .filter(|(name, _)| !self.global.contains_key(name))
                .collect();
            restored += stations.len();
            if !stations.is_empty() {
                guild_map.insert(GuildId::new(raw_id), stations);
            }
        }
        if restored > 0 {
            info!("📂 Restauradas {} estaciones de servidor", restored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seed(url: &str) -> StationSeed {
        StationSeed {
            url: url.to_string(),
            description: None,
        }
    }

    fn station(name: &str, url: &str) -> Station {
        Station {
            name: name.to_string(),
            url: url.to_string(),
            description: None,
            added_by: Some(42),
            added_at: Some(Utc::now()),
        }
    }

    fn registry_with_global() -> StationRegistry {
        let mut seeds = HashMap::new();
        seeds.insert("BBC".to_string(), seed("https://bbc.example/live.m3u8"));
        seeds.insert("Jazz".to_string(), seed("https://jazz.example/stream"));
        StationRegistry::new(seeds)
    }

    #[test]
    fn test_lookup_merged_view() {
        let registry = registry_with_global();
        let guild = GuildId::new(1);

        registry.add(guild, station("Local", "https://x.example/a.mp3")).unwrap();

        assert!(registry.lookup(guild, "BBC").is_some());
        assert!(registry.lookup(guild, "Local").is_some());
        assert!(registry.lookup(GuildId::new(2), "Local").is_none());
    }

    #[test]
    fn test_add_duplicate_is_conflict() {
        let registry = registry_with_global();
        let guild = GuildId::new(1);

        registry.add(guild, station("X", "https://x.example/a.mp3")).unwrap();
        let err = registry
            .add(guild, station("X", "https://x.example/b.mp3"))
            .unwrap_err();
        assert!(matches!(err, RadioError::StationConflict { .. }));
    }

    #[test]
    fn test_guild_station_cannot_shadow_global() {
        let registry = registry_with_global();
        let err = registry
            .add(GuildId::new(1), station("BBC", "https://evil.example/a.mp3"))
            .unwrap_err();
        assert!(matches!(err, RadioError::StationConflict { .. }));
    }

    #[test]
    fn test_remove_global_rejected() {
        let registry = registry_with_global();
        let err = registry.remove(GuildId::new(1), "BBC").unwrap_err();
        assert!(matches!(err, RadioError::StationIsGlobal { .. }));
        // El registro no cambia
        assert_eq!(registry.global_count(), 2);
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let registry = registry_with_global();
        let err = registry.remove(GuildId::new(1), "Nada").unwrap_err();
        assert!(matches!(err, RadioError::StationNotFound { .. }));
    }

    #[test]
    fn test_list_order_globals_first() {
        let registry = registry_with_global();
        let guild = GuildId::new(1);
        registry.add(guild, station("Ambient", "https://a.example/s.mp3")).unwrap();

        let names: Vec<(String, StationScope)> = registry
            .list(guild)
            .into_iter()
            .map(|(s, scope)| (s.name, scope))
            .collect();

        assert_eq!(
            names,
            vec![
                ("BBC".to_string(), StationScope::Global),
                ("Jazz".to_string(), StationScope::Global),
                ("Ambient".to_string(), StationScope::Guild),
            ]
        );
    }

    #[test]
    fn test_snapshot_roundtrip_restores_guild_stations() {
        let registry = registry_with_global();
        let guild = GuildId::new(7);
        registry.add(guild, station("Local", "https://x.example/a.mp3")).unwrap();

        let saved = registry.guild_stations();

        let fresh = registry_with_global();
        fresh.restore_guild_stations(saved);

        assert_eq!(
            fresh.lookup(guild, "Local").map(|s| s.url),
            Some("https://x.example/a.mp3".to_string())
        );
    }
}
