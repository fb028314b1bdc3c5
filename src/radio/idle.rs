use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Weak;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::radio::RadioCore;

/// Vigilante de canales vacíos: cuando el canal donde suena la radio se
/// queda sin oyentes arranca un temporizador de gracia; si nadie vuelve
/// antes de que venza, detiene la sesión y emite la despedida.
///
/// Como mucho un temporizador por guild; arrancar uno duplicado es un
/// no-op, no se apilan.
pub struct IdleMonitor {
    core: Weak<RadioCore>,
    timers: DashMap<GuildId, CancellationToken>,
    grace: Duration,
}

impl IdleMonitor {
    pub(crate) fn new(core: Weak<RadioCore>, grace: Duration) -> Self {
        Self {
            core,
            timers: DashMap::new(),
            grace,
        }
    }

    /// Un miembro salió de `channel_id`. Si es el canal de la sesión del
    /// guild y quedó vacío (sin contar bots), arranca el temporizador.
    pub fn member_left(&self, guild_id: GuildId, channel_id: ChannelId) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let Some(session) = core.sessions().current(guild_id) else {
            return;
        };
        if session.channel_id != channel_id {
            return;
        }

        if core.occupancy().non_bot_members(guild_id, channel_id) != Some(0) {
            return;
        }

        if self.timers.contains_key(&guild_id) {
            debug!("⏰ Temporizador ya pendiente en guild {}", guild_id);
            return;
        }

        let token = CancellationToken::new();
        self.timers.insert(guild_id, token.clone());
        info!(
            "⏰ Canal vacío en guild {}, auto-stop en {}s",
            guild_id,
            self.grace.as_secs()
        );

        let weak = self.core.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }

            let Some(core) = weak.upgrade() else {
                return;
            };
            core.idle().timers.remove(&guild_id);

            // El estado pudo cambiar durante la gracia: revalidar todo
            let still_empty =
                core.occupancy().non_bot_members(guild_id, channel_id) == Some(0);
            let session_matches = core
                .sessions()
                .current(guild_id)
                .is_some_and(|s| s.channel_id == channel_id);

            if !still_empty || !session_matches {
                debug!("⏰ Temporizador venció pero el canal revivió en guild {}", guild_id);
                return;
            }

            match core.stop(guild_id).await {
                Ok(Some(stopped)) => {
                    info!("🚪 Auto-stop por canal vacío en guild {}", guild_id);
                    core.notifier()
                        .idle_departure(guild_id, channel_id, &stopped.station_name)
                        .await;
                }
                Ok(None) => {}
                Err(e) => debug!("Auto-stop falló en guild {}: {}", guild_id, e),
            }
        });
    }

    /// Alguien volvió a un canal con temporizador pendiente: se cancela.
    pub fn member_joined(&self, guild_id: GuildId, channel_id: ChannelId) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let session_matches = core
            .sessions()
            .current(guild_id)
            .is_some_and(|s| s.channel_id == channel_id);

        if session_matches {
            if let Some((_, token)) = self.timers.remove(&guild_id) {
                token.cancel();
                info!("⏰ Temporizador cancelado, volvió un oyente en guild {}", guild_id);
            }
        }
    }

    /// Cancelación directa (stop explícito o nuevo play).
    pub fn cancel(&self, guild_id: GuildId) {
        if let Some((_, token)) = self.timers.remove(&guild_id) {
            token.cancel();
        }
    }

    pub fn has_pending_timer(&self, guild_id: GuildId) -> bool {
        self.timers.contains_key(&guild_id)
    }
}
