pub mod idle;
pub mod resolver;
pub mod safety;
pub mod session;
pub mod stations;

#[cfg(test)]
pub(crate) mod testutil;

use chrono::Utc;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, StationSeed};
use crate::error::{RadioError, Result};
use crate::snapshot::{SessionMeta, SnapshotStore, StateSnapshot};
use crate::voice::{ChannelOccupancy, TextNotifier, VoiceTransport};

use idle::IdleMonitor;
use resolver::{PlaylistFetcher, StreamProber, UrlResolver};
use session::{RetryPolicy, SessionManager, SessionStatus, SessionTimings};
use stations::{Station, StationRegistry, StationScope};

/// Resultado de un Play aceptado.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub station: Station,
    pub channel_id: ChannelId,
}

/// Resultado de un Stop que encontró sesión.
#[derive(Debug, Clone)]
pub struct StoppedPlayback {
    pub station_name: String,
    pub channel_id: ChannelId,
}

/// Perillas de tiempo y reintentos del núcleo, derivadas de la config.
#[derive(Debug, Clone)]
pub struct CoreSettings {
    pub resolver_cache_ttl: Duration,
    pub connect_attempts: u32,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub idle_grace: Duration,
}

impl From<&Config> for CoreSettings {
    fn from(config: &Config) -> Self {
        Self {
            resolver_cache_ttl: Duration::from_secs(config.resolver_cache_ttl_secs),
            connect_attempts: config.connect_attempts,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            disconnect_timeout: Duration::from_secs(config.disconnect_timeout_secs),
            idle_grace: Duration::from_secs(config.idle_grace_secs),
        }
    }
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            resolver_cache_ttl: Duration::from_secs(3600),
            connect_attempts: 3,
            connect_timeout: Duration::from_secs(20),
            disconnect_timeout: Duration::from_secs(5),
            idle_grace: Duration::from_secs(30),
        }
    }
}

/// Fachada del bot de radio: estaciones, sesiones, vigilancia de canales
/// vacíos y persistencia, detrás de una sola API que los comandos llaman.
///
/// Se construye cíclico porque el `IdleMonitor` necesita volver al núcleo
/// (vía `Weak`) cuando vence un temporizador.
pub struct RadioCore {
    registry: StationRegistry,
    resolver: Arc<UrlResolver>,
    sessions: SessionManager,
    idle: IdleMonitor,
    occupancy: Arc<dyn ChannelOccupancy>,
    notifier: Arc<dyn TextNotifier>,
    snapshots: SnapshotStore,
}

impl RadioCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: CoreSettings,
        global_stations: HashMap<String, StationSeed>,
        data_dir: &Path,
        transport: Arc<dyn VoiceTransport>,
        fetcher: Arc<dyn PlaylistFetcher>,
        prober: Arc<dyn StreamProber>,
        occupancy: Arc<dyn ChannelOccupancy>,
        notifier: Arc<dyn TextNotifier>,
    ) -> Arc<Self> {
        let resolver = Arc::new(UrlResolver::new(fetcher, settings.resolver_cache_ttl));

        Arc::new_cyclic(|weak| {
            let sessions = SessionManager::new(
                transport,
                resolver.clone(),
                prober,
                occupancy.clone(),
                RetryPolicy::new(settings.connect_attempts),
                SessionTimings {
                    connect_timeout: settings.connect_timeout,
                    disconnect_timeout: settings.disconnect_timeout,
                },
            );

            Self {
                registry: StationRegistry::new(global_stations),
                resolver,
                sessions,
                idle: IdleMonitor::new(weak.clone(), settings.idle_grace),
                occupancy,
                notifier,
                snapshots: SnapshotStore::new(data_dir),
            }
        })
    }

    /// Restaura el estado del arranque anterior. Las estaciones de servidor
    /// se recuperan; las sesiones activas solo se registran en el log, las
    /// conexiones de voz no sobreviven un reinicio.
    pub async fn restore(&self) {
        let Some(snapshot) = self.snapshots.load().await else {
            return;
        };

        self.registry.restore_guild_stations(snapshot.server_stations);

        for (guild_id, meta) in &snapshot.current_radios {
            info!(
                "📂 Guild {} tenía '{}' sonando desde {}; no se retoma",
                guild_id, meta.name, meta.start_time
            );
        }
    }

    /// Arranca (o cambia) la radio de un guild en su canal de voz.
    pub async fn play(
        &self,
        guild_id: GuildId,
        voice_channel: Option<ChannelId>,
        station_name: &str,
    ) -> Result<NowPlaying> {
        let Some(station) = self.registry.lookup(guild_id, station_name) else {
            return Err(RadioError::StationNotFound {
                name: station_name.to_string(),
            });
        };

        let Some(channel_id) = voice_channel else {
            return Err(RadioError::NoVoiceChannel);
        };

        // Una radio sonando de nuevo desarma cualquier auto-stop pendiente
        self.idle.cancel(guild_id);

        self.sessions.play(guild_id, channel_id, &station).await?;
        self.persist().await;

        Ok(NowPlaying {
            station,
            channel_id,
        })
    }

    /// Detiene la radio de un guild. Sin sesión devuelve `Ok(None)`.
    pub async fn stop(&self, guild_id: GuildId) -> Result<Option<StoppedPlayback>> {
        self.idle.cancel(guild_id);

        let Some(session) = self.sessions.stop(guild_id).await? else {
            return Ok(None);
        };
        self.persist().await;

        Ok(Some(StoppedPlayback {
            station_name: session.station_name,
            channel_id: session.channel_id,
        }))
    }

    pub fn status(&self, guild_id: GuildId) -> Option<SessionStatus> {
        self.sessions.status(guild_id)
    }

    pub fn list_stations(&self, guild_id: GuildId) -> Vec<(Station, StationScope)> {
        self.registry.list(guild_id)
    }

    /// Añade una estación de servidor: requiere admin, URL segura y un
    /// stream que al menos resuelva.
    pub async fn add_station(
        &self,
        guild_id: GuildId,
        name: &str,
        url: &str,
        description: Option<String>,
        added_by: u64,
        is_admin: bool,
    ) -> Result<Station> {
        if !is_admin {
            return Err(RadioError::PermissionDenied);
        }

        safety::validate_stream_url(url)?;

        if self.registry.lookup(guild_id, name).is_some() {
            return Err(RadioError::StationConflict {
                name: name.to_string(),
            });
        }

        // Resolución de prueba: una playlist vacía o un host muerto se
        // rechazan aquí, no cuando alguien pulse play
        self.resolver.resolve(url).await?;

        let station = Station {
            name: name.to_string(),
            url: url.to_string(),
            description,
            added_by: Some(added_by),
            added_at: Some(Utc::now()),
        };
        self.registry.add(guild_id, station.clone())?;
        self.persist().await;

        Ok(station)
    }

    /// Elimina una estación de servidor: requiere admin y que no esté
    /// sonando en este momento.
    pub async fn remove_station(
        &self,
        guild_id: GuildId,
        name: &str,
        is_admin: bool,
    ) -> Result<Station> {
        if !is_admin {
            return Err(RadioError::PermissionDenied);
        }

        if self.sessions.is_playing_station(guild_id, name) {
            return Err(RadioError::StationInUse {
                name: name.to_string(),
            });
        }

        let removed = self.registry.remove(guild_id, name)?;
        self.persist().await;
        Ok(removed)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    pub fn global_station_count(&self) -> usize {
        self.registry.global_count()
    }

    pub fn idle(&self) -> &IdleMonitor {
        &self.idle
    }

    pub(crate) fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(crate) fn occupancy(&self) -> &dyn ChannelOccupancy {
        self.occupancy.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn TextNotifier {
        self.notifier.as_ref()
    }

    /// Vuelca el estado completo a disco. Una escritura fallida se queda
    /// en el log; el estado en memoria sigue mandando.
    async fn persist(&self) {
        let snapshot = StateSnapshot {
            radios: self.registry.global_stations(),
            server_stations: self.registry.guild_stations(),
            current_radios: self
                .sessions
                .snapshot_sessions()
                .into_iter()
                .map(|(guild_id, session)| {
                    let meta = SessionMeta {
                        name: session.station_name,
                        url: session.resolved_url,
                        start_time: session.started_at,
                    };
                    (guild_id, meta)
                })
                .collect(),
        };
        self.snapshots.save(&snapshot).await;
    }

    /// Apagado ordenado: detiene todas las sesiones y persiste.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self
            .sessions
            .snapshot_sessions()
            .keys()
            .filter_map(|key| key.parse::<u64>().ok().map(GuildId::new))
            .collect();

        for guild_id in guilds {
            if let Err(e) = self.stop(guild_id).await {
                warn!("❌ Error deteniendo guild {} en el apagado: {}", guild_id, e);
            }
        }
        self.persist().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::resolver::MockPlaylistFetcher;
    use crate::radio::testutil::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    const GUILD: GuildId = GuildId::new(100);
    const CHANNEL: ChannelId = ChannelId::new(200);
    const ADMIN: u64 = 42;

    struct Harness {
        core: Arc<RadioCore>,
        transport: Arc<FakeTransport>,
        occupancy: Arc<FakeOccupancy>,
        notifier: Arc<FakeNotifier>,
    }

    fn harness(tag: &str) -> Harness {
        harness_in(tag, None)
    }

    fn harness_in(tag: &str, dir: Option<std::path::PathBuf>) -> Harness {
        let data_dir = dir.unwrap_or_else(|| {
            std::env::temp_dir().join(format!("open-radio-core-{}-{}", tag, std::process::id()))
        });
        std::fs::create_dir_all(&data_dir).ok();

        let mut seeds = HashMap::new();
        seeds.insert(
            "Jazz".to_string(),
            StationSeed {
                url: "https://stream.example/jazz.mp3".to_string(),
                description: Some("jazz a todas horas".to_string()),
            },
        );

        let transport = Arc::new(FakeTransport::new());
        let occupancy = Arc::new(FakeOccupancy::new());
        let notifier = Arc::new(FakeNotifier::new());

        let core = RadioCore::new(
            CoreSettings::default(),
            seeds,
            &data_dir,
            transport.clone(),
            Arc::new(MockPlaylistFetcher::new()),
            Arc::new(FakeProber::reachable()),
            occupancy.clone(),
            notifier.clone(),
        );

        Harness {
            core,
            transport,
            occupancy,
            notifier,
        }
    }

    #[tokio::test]
    async fn test_play_unknown_station_is_not_found() {
        let h = harness("unknown");
        let err = h
            .core
            .play(GUILD, Some(CHANNEL), "Nada")
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::StationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_play_requires_voice_channel() {
        let h = harness("novoice");
        let err = h.core.play(GUILD, None, "Jazz").await.unwrap_err();
        assert!(matches!(err, RadioError::NoVoiceChannel));
        assert_eq!(h.core.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_play_then_status_then_stop() {
        let h = harness("lifecycle");
        h.occupancy.set(GUILD, CHANNEL, 2);

        let playing = h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();
        assert_eq!(playing.station.name, "Jazz");
        assert_eq!(playing.channel_id, CHANNEL);

        let status = h.core.status(GUILD).unwrap();
        assert_eq!(status.station_name, "Jazz");
        assert_eq!(status.listeners, Some(2));

        let stopped = h.core.stop(GUILD).await.unwrap().unwrap();
        assert_eq!(stopped.station_name, "Jazz");
        assert!(h.core.status(GUILD).is_none());
    }

    #[tokio::test]
    async fn test_add_station_requires_admin() {
        let h = harness("noadmin");
        let err = h
            .core
            .add_station(GUILD, "Local", "https://stream.example/a.mp3", None, 7, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_add_station_rejects_unsafe_url() {
        let h = harness("unsafe");
        let err = h
            .core
            .add_station(GUILD, "Mal", "http://localhost/stream.mp3", None, ADMIN, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::UnsafeUrl { .. }));
    }

    #[tokio::test]
    async fn test_add_station_conflict_with_global() {
        let h = harness("conflict");
        let err = h
            .core
            .add_station(GUILD, "Jazz", "https://stream.example/b.mp3", None, ADMIN, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::StationConflict { .. }));
    }

    #[tokio::test]
    async fn test_remove_station_in_use_is_rejected() {
        let h = harness("inuse");
        h.core
            .add_station(GUILD, "Local", "https://stream.example/local.mp3", None, ADMIN, true)
            .await
            .unwrap();
        h.core.play(GUILD, Some(CHANNEL), "Local").await.unwrap();

        let err = h
            .core
            .remove_station(GUILD, "Local", true)
            .await
            .unwrap_err();
        assert!(matches!(err, RadioError::StationInUse { .. }));

        // Detenida, ya se puede eliminar
        h.core.stop(GUILD).await.unwrap();
        h.core.remove_station(GUILD, "Local", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_global_station_rejected() {
        let h = harness("rmglobal");
        let err = h.core.remove_station(GUILD, "Jazz", true).await.unwrap_err();
        assert!(matches!(err, RadioError::StationIsGlobal { .. }));
    }

    #[tokio::test]
    async fn test_list_merges_global_and_guild() {
        let h = harness("list");
        h.core
            .add_station(GUILD, "Ambient", "https://stream.example/amb.mp3", None, ADMIN, true)
            .await
            .unwrap();

        let names: Vec<String> = h
            .core
            .list_stations(GUILD)
            .into_iter()
            .map(|(s, _)| s.name)
            .collect();
        assert_eq!(names, vec!["Jazz".to_string(), "Ambient".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_channel_stops_after_grace() {
        let h = harness("idlefire");
        h.occupancy.set(GUILD, CHANNEL, 1);
        h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();

        // El último oyente se va
        h.occupancy.set(GUILD, CHANNEL, 0);
        h.core.idle().member_left(GUILD, CHANNEL);
        assert!(h.core.idle().has_pending_timer(GUILD));

        tokio::time::sleep(Duration::from_secs(35)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.core.active_sessions(), 0);
        assert!(!h.core.idle().has_pending_timer(GUILD));
        let departures = h.notifier.departures.lock();
        assert_eq!(departures.as_slice(), &[(GUILD, CHANNEL, "Jazz".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_within_grace_cancels_timer() {
        let h = harness("idlerejoin");
        h.occupancy.set(GUILD, CHANNEL, 1);
        h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();

        h.occupancy.set(GUILD, CHANNEL, 0);
        h.core.idle().member_left(GUILD, CHANNEL);

        tokio::time::sleep(Duration::from_secs(15)).await;

        // Alguien vuelve antes de que venza la gracia
        h.occupancy.set(GUILD, CHANNEL, 1);
        h.core.idle().member_joined(GUILD, CHANNEL);
        assert!(!h.core.idle().has_pending_timer(GUILD));

        tokio::time::sleep(Duration::from_secs(60)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.core.active_sessions(), 1);
        assert!(h.notifier.departures.lock().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_member_left_keeps_single_timer() {
        let h = harness("idledup");
        h.occupancy.set(GUILD, CHANNEL, 1);
        h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();

        h.occupancy.set(GUILD, CHANNEL, 0);
        h.core.idle().member_left(GUILD, CHANNEL);
        h.core.idle().member_left(GUILD, CHANNEL);
        assert!(h.core.idle().has_pending_timer(GUILD));

        h.core.idle().cancel(GUILD);
        assert!(!h.core.idle().has_pending_timer(GUILD));
    }

    #[tokio::test]
    async fn test_member_left_without_session_is_ignored() {
        let h = harness("idlenosession");
        h.occupancy.set(GUILD, CHANNEL, 0);
        h.core.idle().member_left(GUILD, CHANNEL);
        assert!(!h.core.idle().has_pending_timer(GUILD));
    }

    #[tokio::test]
    async fn test_new_play_cancels_pending_idle_timer() {
        let h = harness("idlereplay");
        h.occupancy.set(GUILD, CHANNEL, 1);
        h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();

        h.occupancy.set(GUILD, CHANNEL, 0);
        h.core.idle().member_left(GUILD, CHANNEL);
        assert!(h.core.idle().has_pending_timer(GUILD));

        h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();
        assert!(!h.core.idle().has_pending_timer(GUILD));
    }

    #[tokio::test]
    async fn test_restore_recovers_guild_stations_not_sessions() {
        let dir = std::env::temp_dir()
            .join(format!("open-radio-core-restore-{}", std::process::id()));
        let first = harness_in("restore1", Some(dir.clone()));
        first
            .core
            .add_station(GUILD, "Local", "https://stream.example/local.mp3", None, ADMIN, true)
            .await
            .unwrap();
        first.core.play(GUILD, Some(CHANNEL), "Local").await.unwrap();

        let second = harness_in("restore2", Some(dir));
        second.core.restore().await;

        // La estación vuelve, la sesión no
        let names: Vec<String> = second
            .core
            .list_stations(GUILD)
            .into_iter()
            .map(|(s, _)| s.name)
            .collect();
        assert!(names.contains(&"Local".to_string()));
        assert_eq!(second.core.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_sessions() {
        let h = harness("shutdown");
        h.core.play(GUILD, Some(CHANNEL), "Jazz").await.unwrap();
        h.core
            .play(GuildId::new(101), Some(ChannelId::new(201)), "Jazz")
            .await
            .unwrap();
        assert_eq!(h.core.active_sessions(), 2);

        h.core.shutdown().await;

        assert_eq!(h.core.active_sessions(), 0);
        assert!(h.transport.disconnect_calls.load(Ordering::SeqCst) >= 2);
    }
}
