use anyhow::Result;
use serenity::{
    builder::{
        CreateAutocompleteResponse, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    bot::RadioBot,
    radio::stations::StationScope,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let Some((sub, options)) = subcommand(&command) else {
        return respond_plain(ctx, &command, "❌ Comando no reconocido").await;
    };
    let sub = sub.to_string();
    let options = options.to_vec();

    match (command.data.name.as_str(), sub.as_str()) {
        ("radio", "play") => handle_radio_play(ctx, command, bot, guild_id, &options).await?,
        ("radio", "stop") => handle_radio_stop(ctx, command, bot, guild_id).await?,
        ("radio", "info") => handle_radio_info(ctx, command, bot, guild_id).await?,
        ("radio", "list") => handle_radio_list(ctx, command, bot, guild_id).await?,
        ("station", "add") => handle_station_add(ctx, command, bot, guild_id, &options).await?,
        ("station", "remove") => handle_station_remove(ctx, command, bot, guild_id, &options).await?,
        _ => respond_plain(ctx, &command, "❌ Comando no reconocido").await?,
    }

    Ok(())
}

/// Maneja el autocompletado de nombres de estación
pub async fn handle_autocomplete(
    ctx: &Context,
    interaction: CommandInteraction,
    bot: &RadioBot,
) -> Result<()> {
    let Some(guild_id) = interaction.guild_id else {
        return Ok(());
    };
    let Some(focused) = interaction.data.autocomplete() else {
        return Ok(());
    };

    let typed = focused.value.to_lowercase();
    // `/station remove` solo ofrece estaciones del servidor; las globales
    // no se pueden eliminar
    let only_guild = interaction.data.name == "station";

    let mut response = CreateAutocompleteResponse::new();
    for (station, _) in bot
        .core()
        .list_stations(guild_id)
        .into_iter()
        .filter(|(_, scope)| !only_guild || *scope == StationScope::Guild)
        .filter(|(station, _)| station.name.to_lowercase().contains(&typed))
        .take(25)
    {
        response = response.add_string_choice(&station.name, &station.name);
    }

    interaction
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;

    Ok(())
}

// Handlers específicos para cada subcomando

async fn handle_radio_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
    options: &[CommandDataOption],
) -> Result<()> {
    let station = option_str(options, "station")
        .ok_or_else(|| anyhow::anyhow!("Estación no proporcionada"))?
        .to_string();

    // Defer: resolver la URL y conectar al canal puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let voice_channel = user_voice_channel(ctx, guild_id, command.user.id);

    let embed = match bot.core().play(guild_id, voice_channel, &station).await {
        Ok(playing) => embeds::create_now_playing_embed(&playing),
        Err(e) => embeds::create_error_embed(&e),
    };
    bot.update_presence(ctx);

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_radio_stop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.core().stop(guild_id).await {
        Ok(Some(stopped)) => embeds::create_stopped_embed(&stopped),
        Ok(None) => embeds::create_idle_embed(),
        Err(e) => embeds::create_error_embed(&e),
    };
    bot.update_presence(ctx);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_radio_info(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.core().status(guild_id) {
        Some(status) => embeds::create_status_embed(&status),
        None => embeds::create_idle_embed(),
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_radio_list(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
) -> Result<()> {
    let stations = bot.core().list_stations(guild_id);
    let embed = embeds::create_station_list_embed(&stations);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_station_add(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
    options: &[CommandDataOption],
) -> Result<()> {
    let name = option_str(options, "name")
        .ok_or_else(|| anyhow::anyhow!("Nombre no proporcionado"))?
        .to_string();
    let url = option_str(options, "url")
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?
        .to_string();
    let description = option_str(options, "description").map(str::to_string);

    // Defer: la resolución de prueba sale a la red
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot
        .core()
        .add_station(
            guild_id,
            &name,
            &url,
            description,
            command.user.id.get(),
            member_is_admin(&command),
        )
        .await
    {
        Ok(station) => embeds::create_station_added_embed(&station),
        Err(e) => embeds::create_error_embed(&e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_station_remove(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RadioBot,
    guild_id: GuildId,
    options: &[CommandDataOption],
) -> Result<()> {
    let name = option_str(options, "name")
        .ok_or_else(|| anyhow::anyhow!("Nombre no proporcionado"))?;

    let embed = match bot
        .core()
        .remove_station(guild_id, name, member_is_admin(&command))
        .await
    {
        Ok(removed) => embeds::create_station_removed_embed(&removed),
        Err(e) => embeds::create_error_embed(&e),
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;

    Ok(())
}

// Helpers

fn subcommand(command: &CommandInteraction) -> Option<(&str, &[CommandDataOption])> {
    let first = command.data.options.first()?;
    match &first.value {
        CommandDataOptionValue::SubCommand(options) => {
            Some((first.name.as_str(), options.as_slice()))
        }
        _ => None,
    }
}

fn option_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn member_is_admin(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|perms| perms.administrator() || perms.manage_guild())
}

/// Canal de voz en el que está el usuario, si está en alguno
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| {
            guild
                .voice_states
                .get(&user_id)
                .and_then(|voice_state| voice_state.channel_id)
        })
}

async fn respond_plain(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
