//! Capa Discord del bot de radio.
//!
//! [`RadioBot`] implementa el [`EventHandler`] de Serenity y traduce los
//! eventos del gateway a operaciones del núcleo ([`RadioCore`]): comandos
//! slash, autocompletado y cambios de estado de voz (para el auto-stop por
//! canal vacío).

use anyhow::Result;
use serenity::{
    all::{ActivityData, ChannelType, Context, EventHandler, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    config::Config,
    radio::RadioCore,
    ui::embeds,
    voice::{ChannelOccupancy, TextNotifier},
};

/// Handler principal del bot.
pub struct RadioBot {
    config: Arc<Config>,
    core: Arc<RadioCore>,
    occupancy: Arc<CacheOccupancy>,
    notifier: Arc<ChannelNotifier>,
}

impl RadioBot {
    pub fn new(
        config: Arc<Config>,
        core: Arc<RadioCore>,
        occupancy: Arc<CacheOccupancy>,
        notifier: Arc<ChannelNotifier>,
    ) -> Self {
        Self {
            config,
            core,
            occupancy,
            notifier,
        }
    }

    pub fn core(&self) -> &RadioCore {
        &self.core
    }

    /// Refleja el número de radios activas en la presencia del bot.
    pub fn update_presence(&self, ctx: &Context) {
        let active = self.core.active_sessions();
        let activity = if active == 0 {
            ActivityData::listening("/radio play")
        } else {
            ActivityData::listening(format!("radio en {} servidores", active))
        };
        ctx.set_activity(Some(activity));
    }

    /// Registra los comandos slash, globales o por guild según configuración
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // Los adaptadores de caché/http se completan aquí, cuando el
        // gateway ya existe
        self.occupancy.attach(ctx.cache.clone());
        self.notifier.attach(ctx.http.clone(), ctx.cache.clone());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.update_presence(&ctx);

        self.core.restore().await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Autocomplete(autocomplete) => {
                if let Err(e) = handlers::handle_autocomplete(&ctx, autocomplete, self).await {
                    error!("Error manejando autocompletado: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // El propio bot desconectado a la fuerza: limpiar la sesión
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id {
            if old.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                if let Err(e) = self.core.stop(guild_id).await {
                    error!("Error al limpiar sesión tras desconexión: {:?}", e);
                }
            }
            return;
        }

        // Otros bots no cuentan como oyentes
        if new.member.as_ref().is_some_and(|member| member.user.bot) {
            return;
        }

        let old_channel = old.as_ref().and_then(|state| state.channel_id);
        let new_channel = new.channel_id;

        if let Some(left) = old_channel.filter(|c| Some(*c) != new_channel) {
            self.core.idle().member_left(guild_id, left);
        }
        if let Some(joined) = new_channel.filter(|c| Some(*c) != old_channel) {
            self.core.idle().member_joined(guild_id, joined);
        }
    }
}

/// Cuenta oyentes humanos en un canal de voz usando la caché del gateway.
#[derive(Default)]
pub struct CacheOccupancy {
    cache: OnceLock<Arc<serenity::cache::Cache>>,
}

impl CacheOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, cache: Arc<serenity::cache::Cache>) {
        let _ = self.cache.set(cache);
    }
}

impl ChannelOccupancy for CacheOccupancy {
    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        let cache = self.cache.get()?;
        let guild = cache.guild(guild_id)?;

        let count = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .filter(|state| {
                // Sin entrada de miembro en caché se asume humano
                !guild
                    .members
                    .get(&state.user_id)
                    .is_some_and(|member| member.user.bot)
            })
            .count();

        Some(count)
    }
}

/// Envía la despedida por canal vacío a un canal de texto del servidor.
#[derive(Default)]
pub struct ChannelNotifier {
    http: OnceLock<Arc<Http>>,
    cache: OnceLock<Arc<serenity::cache::Cache>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, http: Arc<Http>, cache: Arc<serenity::cache::Cache>) {
        let _ = self.http.set(http);
        let _ = self.cache.set(cache);
    }

    /// Canal de sistema si existe, si no el primer canal de texto.
    fn pick_text_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let cache = self.cache.get()?;
        let guild = cache.guild(guild_id)?;

        guild.system_channel_id.or_else(|| {
            let mut text_channels: Vec<_> = guild
                .channels
                .values()
                .filter(|channel| channel.kind == ChannelType::Text)
                .collect();
            text_channels.sort_by_key(|channel| channel.position);
            text_channels.first().map(|channel| channel.id)
        })
    }
}

#[async_trait]
impl TextNotifier for ChannelNotifier {
    async fn idle_departure(&self, guild_id: GuildId, _channel_id: ChannelId, station_name: &str) {
        let Some(http) = self.http.get() else {
            return;
        };
        let Some(target) = self.pick_text_channel(guild_id) else {
            warn!("🚪 Sin canal de texto para avisar en guild {}", guild_id);
            return;
        };

        let embed = embeds::create_idle_departure_embed(station_name);
        if let Err(e) = target
            .send_message(http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("❌ No se pudo enviar la despedida en guild {}: {}", guild_id, e);
        }
    }
}
