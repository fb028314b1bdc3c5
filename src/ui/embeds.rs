use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::error::RadioError;
use crate::radio::session::SessionStatus;
use crate::radio::stations::{Station, StationScope};
use crate::radio::{NowPlaying, StoppedPlayback};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const RADIO_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "📻 Open Radio Bot";

/// Crea un embed para una radio que acaba de arrancar
pub fn create_now_playing_embed(playing: &NowPlaying) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📻 Radio Sintonizada")
        .description(format!("**{}**", playing.station.name))
        .color(colors::SUCCESS_GREEN)
        .field("🔊 Canal", format!("<#{}>", playing.channel_id), true);

    if let Some(description) = &playing.station.description {
        embed = embed.field("📝 Descripción", description, false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para una radio detenida
pub fn create_stopped_embed(stopped: &StoppedPlayback) -> CreateEmbed {
    CreateEmbed::default()
        .title("⏹️ Radio Detenida")
        .description(format!("**{}** dejó de sonar", stopped.station_name))
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con el estado actual de la radio del servidor
pub fn create_status_embed(status: &SessionStatus) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📻 Sonando Ahora")
        .description(format!("**{}**", status.station_name))
        .color(colors::INFO_BLUE)
        .field("🔊 Canal", format!("<#{}>", status.channel_id), true)
        .field("⏱️ En el aire", format_uptime(status.elapsed), true);

    if let Some(listeners) = status.listeners {
        embed = embed.field("👥 Oyentes", listeners.to_string(), true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed cuando no hay nada sonando
pub fn create_idle_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("📻 Radio")
        .description("😴 **No hay ninguna radio sonando**\n\n💡 Usa `/radio play <estación>` para sintonizar una")
        .color(colors::NEUTRAL_GRAY)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con el catálogo de estaciones: globales primero, luego
/// las propias del servidor
pub fn create_station_list_embed(stations: &[(Station, StationScope)]) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Estaciones Disponibles")
        .color(colors::RADIO_PURPLE);

    if stations.is_empty() {
        return embed
            .description("😴 **No hay estaciones configuradas**")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let mut globals = String::new();
    let mut locals = String::new();
    for (station, scope) in stations {
        let line = match &station.description {
            Some(description) => format!("**{}** — {}\n", station.name, description),
            None => format!("**{}**\n", station.name),
        };
        match scope {
            StationScope::Global => globals.push_str(&line),
            StationScope::Guild => locals.push_str(&line),
        }
    }

    if !globals.is_empty() {
        embed = embed.field("🌐 Globales", globals, false);
    }
    if !locals.is_empty() {
        embed = embed.field("🏠 De este servidor", locals, false);
    }

    embed
        .footer(CreateEmbedFooter::new(
            "📻 Usa /radio play <estación> para sintonizar",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed para una estación recién añadida
pub fn create_station_added_embed(station: &Station) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Estación Añadida")
        .description(format!("**{}** ya está disponible en este servidor", station.name))
        .color(colors::SUCCESS_GREEN)
        .field("🔗 URL", format!("`{}`", station.url), false);

    if let Some(added_by) = station.added_by {
        embed = embed.field("👤 Añadida por", format!("<@{}>", added_by), true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para una estación eliminada
pub fn create_station_removed_embed(station: &Station) -> CreateEmbed {
    CreateEmbed::default()
        .title("➖ Estación Eliminada")
        .description(format!("**{}** ya no está disponible en este servidor", station.name))
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error con un mensaje apto para el usuario
pub fn create_error_embed(error: &RadioError) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(user_message(error))
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de despedida cuando el canal se queda vacío
pub fn create_idle_departure_embed(station_name: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("🚪 Canal Vacío")
        .description(format!(
            "**{}** se apagó porque no quedaba nadie escuchando",
            station_name
        ))
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Traducción de errores internos a mensajes para el chat
fn user_message(error: &RadioError) -> String {
    match error {
        RadioError::StationNotFound { name } => {
            format!("No conozco la estación **{}**. Usa `/radio list` para ver el catálogo.", name)
        }
        RadioError::StationConflict { name } => {
            format!("Ya existe una estación llamada **{}**.", name)
        }
        RadioError::StationIsGlobal { name } => {
            format!("**{}** es una estación global y no se puede eliminar.", name)
        }
        RadioError::StationInUse { name } => {
            format!("**{}** está sonando ahora mismo. Detenla antes de eliminarla.", name)
        }
        RadioError::PermissionDenied => {
            "Necesitas permisos de administrador para gestionar estaciones.".to_string()
        }
        RadioError::UnsafeUrl { reason } => {
            format!("Esa URL no parece un stream de audio seguro: {}.", reason)
        }
        RadioError::NoVoiceChannel => {
            "Debes estar en un canal de voz para sintonizar la radio.".to_string()
        }
        RadioError::ConnectionFailed { attempts } => {
            format!("No pude conectarme al canal de voz tras {} intentos.", attempts)
        }
        RadioError::StreamUnavailable { .. } => {
            "El stream no responde ahora mismo. Inténtalo más tarde.".to_string()
        }
        other => format!("Algo salió mal: {}", other),
    }
}

/// Formatea el tiempo en el aire como `2h 5m 30s`
pub fn format_uptime(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uptime_drops_subsecond_noise() {
        let formatted = format_uptime(Duration::from_millis(3_725_400));
        assert_eq!(formatted, "1h 2m 5s");
    }

    #[test]
    fn test_user_message_mentions_station_name() {
        let msg = user_message(&RadioError::StationNotFound {
            name: "Jazz".to_string(),
        });
        assert!(msg.contains("Jazz"));
    }
}
