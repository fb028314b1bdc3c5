//! Seams hacia la capa de plataforma: transporte de voz, ocupación de
//! canales y notificaciones de texto. El núcleo solo conoce estos traits;
//! la implementación real vive en [`songbird`](self::songbird) y en el glue
//! de serenity.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use thiserror::Error;

pub mod songbird;

/// Fallos del transporte de voz, clasificados para la política de
/// reintentos: `AlreadyConnected` fuerza desconexión previa, `Timeout` y
/// `Closed` son transitorios y reintentables.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("voice join timed out")]
    Timeout,

    #[error("already connected to a voice channel")]
    AlreadyConnected,

    #[error("voice connection closed: {0}")]
    Closed(String),

    #[error("playback rejected: {0}")]
    Playback(String),

    #[error("{0}")]
    Other(String),
}

/// Transporte de voz por guild. `connect` une o mueve la conexión al canal
/// indicado; el manager de sesiones decide cuándo reusar la existente.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> std::result::Result<(), TransportError>;

    async fn disconnect(&self, guild_id: GuildId) -> std::result::Result<(), TransportError>;

    /// Arranca la reproducción de la URL en la conexión del guild,
    /// reemplazando cualquier fuente de audio anterior.
    async fn play(
        &self,
        guild_id: GuildId,
        url: &str,
    ) -> std::result::Result<(), TransportError>;

    /// Detiene el audio sin soltar la conexión.
    async fn stop(&self, guild_id: GuildId);

    fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;
}

/// Vista de ocupación de canales de voz, sin contar bots.
pub trait ChannelOccupancy: Send + Sync {
    /// `None` cuando el canal no es observable (fuera de caché).
    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize>;
}

/// Sink de notificaciones de texto. El núcleo emite eventos estructurados;
/// el glue decide canal y formato.
#[async_trait]
pub trait TextNotifier: Send + Sync {
    /// "Gracias por escuchar": el bot abandonó un canal vacío.
    async fn idle_departure(&self, guild_id: GuildId, channel_id: ChannelId, station_name: &str);
}
