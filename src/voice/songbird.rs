use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::error::JoinError;
use songbird::input::HttpRequest;
use songbird::tracks::TrackHandle;
use songbird::Songbird;
use std::sync::Arc;
use tracing::{info, warn};

use super::{TransportError, VoiceTransport};

/// Transporte de producción sobre songbird. `join` de songbird ya mueve la
/// conexión si existe en otro canal, así que `connect` cubre ambos casos.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    channels: DashMap<GuildId, ChannelId>,
    tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self {
            manager,
            http,
            channels: DashMap::new(),
            tracks: DashMap::new(),
        }
    }
}

fn map_join_error(e: JoinError) -> TransportError {
    match e {
        JoinError::TimedOut => TransportError::Timeout,
        other => TransportError::Closed(other.to_string()),
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> std::result::Result<(), TransportError> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
                self.channels.insert(guild_id, channel_id);
                Ok(())
            }
            Err(e) => Err(map_join_error(e)),
        }
    }

    async fn disconnect(&self, guild_id: GuildId) -> std::result::Result<(), TransportError> {
        if let Some((_, track)) = self.tracks.remove(&guild_id) {
            let _ = track.stop();
        }
        self.channels.remove(&guild_id);

        match self.manager.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => Ok(()), // ya no había conexión
            Err(e) => Err(map_join_error(e)),
        }
    }

    async fn play(
        &self,
        guild_id: GuildId,
        url: &str,
    ) -> std::result::Result<(), TransportError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| TransportError::Other("no voice connection".to_string()))?;

        let input = HttpRequest::new(self.http.clone(), url.to_string());

        let mut handler = call.lock().await;
        // Una sola fuente de audio por guild: lo anterior se detiene antes
        handler.stop();
        let track_handle = handler.play_input(input.into());
        drop(handler);

        self.tracks.insert(guild_id, track_handle);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some((_, track)) = self.tracks.remove(&guild_id) {
            let _ = track.stop();
        }

        if let Some(call) = self.manager.get(guild_id) {
            call.lock().await.stop();
        } else {
            warn!("⏹️ stop sin conexión de voz en guild {}", guild_id);
        }
    }

    fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|entry| *entry.value())
    }
}
