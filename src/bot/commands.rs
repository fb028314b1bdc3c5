use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    let commands = vec![radio_command(), station_command()];

    for command in commands {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let commands = vec![radio_command(), station_command()];

    guild_id.set_commands(&ctx.http, commands).await?;

    Ok(())
}

// Comando principal de radio

fn radio_command() -> CreateCommand {
    CreateCommand::new("radio")
        .description("Escucha radios por internet en tu canal de voz")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "play",
                "Sintoniza una estación en tu canal de voz",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "station",
                    "Nombre de la estación",
                )
                .set_autocomplete(true)
                .required(true),
            ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "stop",
            "Detiene la radio y desconecta el bot",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "info",
            "Muestra qué está sonando y desde cuándo",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Muestra las estaciones disponibles",
        ))
}

// Gestión de estaciones del servidor (solo administradores)

fn station_command() -> CreateCommand {
    CreateCommand::new("station")
        .description("Gestiona las estaciones de este servidor")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "add",
                "Añade una estación al servidor",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la estación")
                    .required(true),
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "url", "URL del stream o playlist")
                    .required(true),
            )
            .add_sub_option(CreateCommandOption::new(
                CommandOptionType::String,
                "description",
                "Descripción corta opcional",
            )),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "remove",
                "Elimina una estación del servidor",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la estación")
                    .set_autocomplete(true)
                    .required(true),
            ),
        )
}
