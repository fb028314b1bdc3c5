use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{RadioError, Result};
use crate::radio::resolver::{StreamProber, UrlResolver};
use crate::radio::stations::Station;
use crate::voice::{ChannelOccupancy, TransportError, VoiceTransport};

/// Sesión viva de un guild: una estación sonando en un canal de voz.
/// Invariante: como mucho una por guild, siempre ligada a una conexión.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub station_name: String,
    pub resolved_url: String,
    pub channel_id: ChannelId,
    pub started_at: DateTime<Utc>,
}

/// Lectura pura del estado de un guild, sin mutación.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub station_name: String,
    pub channel_id: ChannelId,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub listeners: Option<usize>,
}

/// Política de reintentos de conexión: acotada, nunca infinita.
/// Primer intento inmediato, después pausas fijas (≈5s) entre intentos.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays: vec![Duration::from_secs(5), Duration::from_secs(5)],
        }
    }

    /// Pausa a aplicar tras el intento fallido número `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).saturating_sub(1).min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct SessionTimings {
    /// Tope por intento de join.
    pub connect_timeout: Duration,
    /// Espera acotada de desconexión antes de forzar.
    pub disconnect_timeout: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            disconnect_timeout: Duration::from_secs(5),
        }
    }
}

/// Máquina de estados por guild: Idle → Connecting → Playing → Idle.
///
/// Los pasos de Play y Stop de un mismo guild se serializan con un mutex
/// por guild; guilds distintos avanzan en paralelo. Un Stop puede
/// adelantarse a un Play en vuelo cancelando su token.
pub struct SessionManager {
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<UrlResolver>,
    prober: Arc<dyn StreamProber>,
    occupancy: Arc<dyn ChannelOccupancy>,
    sessions: DashMap<GuildId, ActiveSession>,
    guild_locks: DashMap<GuildId, Arc<tokio::sync::Mutex<()>>>,
    cancel_tokens: DashMap<GuildId, CancellationToken>,
    retry: RetryPolicy,
    timings: SessionTimings,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<UrlResolver>,
        prober: Arc<dyn StreamProber>,
        occupancy: Arc<dyn ChannelOccupancy>,
        retry: RetryPolicy,
        timings: SessionTimings,
    ) -> Self {
        Self {
            transport,
            resolver,
            prober,
            occupancy,
            sessions: DashMap::new(),
            guild_locks: DashMap::new(),
            cancel_tokens: DashMap::new(),
            retry,
            timings,
        }
    }

    fn guild_lock(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<()>> {
        self.guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Arranca (o cambia) la estación de un guild. Último en llegar gana:
    /// una sesión previa se detiene antes, sin encolado.
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        station: &Station,
    ) -> Result<ActiveSession> {
        // Token nuevo para este Play; uno anterior en vuelo queda cancelado
        let token = CancellationToken::new();
        if let Some(previous) = self.cancel_tokens.insert(guild_id, token.clone()) {
            previous.cancel();
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if token.is_cancelled() {
            return Err(RadioError::PlaybackError {
                reason: "superseded before start".to_string(),
            });
        }

        // Nunca dos fuentes de audio a la vez, ni en plena transición
        if self.sessions.contains_key(&guild_id) {
            self.transport.stop(guild_id).await;
        }

        let result = self
            .play_inner(guild_id, channel_id, station, &token)
            .await;

        if result.is_err() {
            // Cualquier salida de error vuelve a Idle, sin sesión a medias
            self.sessions.remove(&guild_id);
        }
        if let Err(RadioError::StreamUnavailable { .. }) = &result {
            // Un stream muerto invalida la resolución cacheada; el próximo
            // intento vuelve a descargar la playlist
            self.resolver.invalidate(&station.url);
        }
        // Limpiar solo tokens ya cancelados; uno vivo pertenece al Play
        // más reciente y lo retira su Stop correspondiente
        self.cancel_tokens.remove_if(&guild_id, |_, t| t.is_cancelled());

        result
    }

    async fn play_inner(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        station: &Station,
        token: &CancellationToken,
    ) -> Result<ActiveSession> {
        self.ensure_connected(guild_id, channel_id, token).await?;

        let resolved_url = self.resolver.resolve(&station.url).await?;

        if token.is_cancelled() {
            return Err(RadioError::PlaybackError {
                reason: "cancelled by stop".to_string(),
            });
        }

        if !self.prober.probe(&resolved_url).await {
            return Err(RadioError::StreamUnavailable {
                url: resolved_url,
            });
        }

        self.transport
            .play(guild_id, &resolved_url)
            .await
            .map_err(|e| RadioError::PlaybackError {
                reason: e.to_string(),
            })?;

        let session = ActiveSession {
            station_name: station.name.clone(),
            resolved_url,
            channel_id,
            started_at: Utc::now(),
        };
        self.sessions.insert(guild_id, session.clone());

        info!("🎵 Sonando '{}' en guild {}", station.name, guild_id);
        Ok(session)
    }

    /// Conecta, mueve o reusa la conexión de voz con reintentos acotados.
    async fn ensure_connected(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        token: &CancellationToken,
    ) -> Result<()> {
        match self.transport.current_channel(guild_id) {
            Some(current) if current == channel_id => return Ok(()), // reusar tal cual
            Some(current) => {
                info!("🔄 Moviendo de {} a {} en guild {}", current, channel_id, guild_id);
            }
            None => {}
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let joined = tokio::select! {
                _ = token.cancelled() => {
                    return Err(RadioError::PlaybackError {
                        reason: "cancelled by stop".to_string(),
                    });
                }
                joined = tokio::time::timeout(
                    self.timings.connect_timeout,
                    self.transport.connect(guild_id, channel_id),
                ) => joined.unwrap_or(Err(TransportError::Timeout)),
            };

            match joined {
                Ok(()) => return Ok(()),
                Err(TransportError::AlreadyConnected) => {
                    // Estado fantasma: forzar desconexión antes de reintentar
                    warn!("🔄 Conexión fantasma en guild {}, forzando limpieza", guild_id);
                    let _ = self.transport.disconnect(guild_id).await;
                }
                Err(e) => {
                    warn!("🔄 Intento {}/{} de conexión falló en guild {}: {}",
                        attempt, self.retry.max_attempts, guild_id, e);
                }
            }

            if attempt >= self.retry.max_attempts {
                return Err(RadioError::ConnectionFailed { attempts: attempt });
            }

            let delay = self.retry.backoff(attempt);
            tokio::select! {
                _ = token.cancelled() => {
                    return Err(RadioError::PlaybackError {
                        reason: "cancelled by stop".to_string(),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Detiene la sesión de un guild. Idempotente: sin sesión devuelve
    /// `Ok(None)` sin tocar estado.
    pub async fn stop(&self, guild_id: GuildId) -> Result<Option<ActiveSession>> {
        // Adelantarse a un Play en vuelo antes de pelear por el lock
        if let Some((_, token)) = self.cancel_tokens.remove(&guild_id) {
            token.cancel();
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return Ok(None);
        };

        self.transport.stop(guild_id).await;

        match tokio::time::timeout(
            self.timings.disconnect_timeout,
            self.transport.disconnect(guild_id),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("❌ Error desconectando en guild {}: {}", guild_id, e),
            Err(_) => warn!("⏰ Desconexión agotó {}s en guild {}",
                self.timings.disconnect_timeout.as_secs(), guild_id),
        }

        info!("⏹️ Sesión de '{}' detenida en guild {}", session.station_name, guild_id);
        Ok(Some(session))
    }

    /// Lectura pura: estación, tiempo transcurrido, canal y oyentes.
    pub fn status(&self, guild_id: GuildId) -> Option<SessionStatus> {
        let session = self.sessions.get(&guild_id)?;
        let elapsed = (Utc::now() - session.started_at)
            .to_std()
            .unwrap_or_default();

        Some(SessionStatus {
            station_name: session.station_name.clone(),
            channel_id: session.channel_id,
            started_at: session.started_at,
            elapsed,
            listeners: self.occupancy.non_bot_members(guild_id, session.channel_id),
        })
    }

    pub fn current(&self, guild_id: GuildId) -> Option<ActiveSession> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn is_playing_station(&self, guild_id: GuildId, station_name: &str) -> bool {
        self.sessions
            .get(&guild_id)
            .is_some_and(|s| s.station_name == station_name)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Metadatos de sesiones activas para el snapshot, con claves
    /// serializables.
    pub fn snapshot_sessions(&self) -> std::collections::HashMap<String, ActiveSession> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().get().to_string(), entry.value().clone()))
            .collect()
    }
}
