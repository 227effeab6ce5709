use async_trait::async_trait;
use log::{debug, error, info, warn};
use serenity::all::{
    ApplicationId, Cache, ChannelType, Client, Command, CommandInteraction, Context, CreateCommand,
    EditInteractionResponse, EditMember, EventHandler, GatewayIntents, Http, Interaction, Message,
    Ready, ShardManager, VoiceState,
};
use songbird::{SerenityInit, Songbird};
use std::num::NonZeroU64;
use std::sync::{Arc, OnceLock};

use crate::bot::commands::{CommandInvocation, GuardCommand, COMMAND_FAILED};
use crate::bot::shutdown::ShutdownComponent;
use crate::bot::GuardBot;
use crate::config::DiscordCredentials;
use crate::platforms::{PlatformError, VoicePlatform};
use crate::types::{
    ChannelId, ChatMessage, GuildId, MessageId, UserId, VoiceChannelInfo, VoiceMember, VoicePresenceChange,
};

/// Gateway events the guard listens to
pub fn gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

fn nonzero(id: u64, what: &str) -> Result<NonZeroU64, PlatformError> {
    NonZeroU64::new(id).ok_or_else(|| PlatformError::NotFound(format!("{} 0", what)))
}

fn guild_ref(id: GuildId) -> Result<serenity::all::GuildId, PlatformError> {
    nonzero(id.get(), "guild").map(|id| serenity::all::GuildId::new(id.get()))
}

fn channel_ref(id: ChannelId) -> Result<serenity::all::ChannelId, PlatformError> {
    nonzero(id.get(), "channel").map(|id| serenity::all::ChannelId::new(id.get()))
}

fn user_ref(id: UserId) -> Result<serenity::all::UserId, PlatformError> {
    nonzero(id.get(), "user").map(|id| serenity::all::UserId::new(id.get()))
}

/// Discord implementation of [`VoicePlatform`].
///
/// Reads come from the serenity cache, voice presence from songbird's
/// call registry. The REST and cache handles are attached once the client
/// has been built.
pub struct DiscordPlatform {
    http: OnceLock<Arc<Http>>,
    cache: OnceLock<Arc<Cache>>,
    songbird: Arc<Songbird>,
}

impl DiscordPlatform {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            http: OnceLock::new(),
            cache: OnceLock::new(),
            songbird,
        }
    }

    pub fn attach(&self, http: Arc<Http>, cache: Arc<Cache>) {
        if self.http.set(http).is_err() || self.cache.set(cache).is_err() {
            warn!("Discord client handles were already attached");
        }
    }

    fn http(&self) -> Result<&Arc<Http>, PlatformError> {
        self.http.get().ok_or(PlatformError::NotReady)
    }

    fn cache(&self) -> Result<&Arc<Cache>, PlatformError> {
        self.cache.get().ok_or(PlatformError::NotReady)
    }

    fn collect_voice_channels(&self, guild_id: GuildId) -> Result<Vec<VoiceChannelInfo>, PlatformError> {
        let cache = self.cache()?;
        let guild = cache
            .guild(guild_ref(guild_id)?)
            .ok_or_else(|| PlatformError::NotFound(format!("guild {}", guild_id)))?;

        let mut channels: Vec<_> = guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Voice)
            .collect();
        channels.sort_by_key(|c| (c.position, c.id));

        Ok(channels
            .into_iter()
            .map(|channel| {
                let members = guild
                    .voice_states
                    .values()
                    .filter(|state| state.channel_id == Some(channel.id))
                    .map(|state| {
                        let member = state.member.as_ref().or_else(|| guild.members.get(&state.user_id));
                        VoiceMember {
                            user_id: UserId(state.user_id.get()),
                            name: member
                                .map(|m| m.user.name.clone())
                                .unwrap_or_else(|| state.user_id.to_string()),
                            is_bot: member.map(|m| m.user.bot).unwrap_or(false),
                        }
                    })
                    .collect();

                VoiceChannelInfo {
                    id: ChannelId(channel.id.get()),
                    name: channel.name.clone(),
                    members,
                }
            })
            .collect())
    }

    fn check_connect_permission(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool, PlatformError> {
        let cache = self.cache()?;
        let bot_id = cache.current_user().id;
        let guild = cache
            .guild(guild_ref(guild_id)?)
            .ok_or_else(|| PlatformError::NotFound(format!("guild {}", guild_id)))?;
        let channel = guild
            .channels
            .get(&channel_ref(channel_id)?)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {}", channel_id)))?;

        match guild.members.get(&bot_id) {
            Some(member) => Ok(guild.user_permissions_in(channel, member).connect()),
            None => {
                debug!("Bot member not cached in guild {}, assuming connect is allowed", guild_id);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl VoicePlatform for DiscordPlatform {
    fn platform_name(&self) -> &str {
        "discord"
    }

    fn current_user_id(&self) -> Option<UserId> {
        self.cache.get().map(|cache| UserId(cache.current_user().id.get()))
    }

    fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self
            .cache
            .get()
            .map(|cache| cache.guilds().into_iter().map(|id| GuildId(id.get())).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    async fn voice_channels(&self, guild_id: GuildId) -> Result<Vec<VoiceChannelInfo>, PlatformError> {
        self.collect_voice_channels(guild_id)
    }

    async fn current_connection(&self, guild_id: GuildId) -> Option<ChannelId> {
        let guild = guild_ref(guild_id).ok()?;
        let call = self.songbird.get(guild)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId(channel.0.get()))
    }

    async fn can_connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool, PlatformError> {
        self.check_connect_permission(guild_id, channel_id)
    }

    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlatformError> {
        let guild = guild_ref(guild_id)?;
        let channel = channel_ref(channel_id)?;

        // Presence only: deafen and mute before the gateway join goes out
        {
            let call = self.songbird.get_or_insert(guild);
            let mut call = call.lock().await;
            call.deafen(true)
                .await
                .map_err(|e| PlatformError::Voice(e.to_string()))?;
            call.mute(true)
                .await
                .map_err(|e| PlatformError::Voice(e.to_string()))?;
        }

        self.songbird
            .join_gateway(guild, channel)
            .await
            .map_err(|e| PlatformError::Voice(e.to_string()))?;
        debug!("Voice gateway joined channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlatformError> {
        let guild = guild_ref(guild_id)?;
        match self.songbird.remove(guild).await {
            Ok(()) | Err(songbird::error::JoinError::NoCall) => Ok(()),
            Err(e) => Err(PlatformError::Voice(e.to_string())),
        }
    }

    async fn member_voice_channel(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<ChannelId>, PlatformError> {
        let cache = self.cache()?;
        let guild = cache
            .guild(guild_ref(guild_id)?)
            .ok_or_else(|| PlatformError::NotFound(format!("guild {}", guild_id)))?;
        Ok(guild
            .voice_states
            .get(&user_ref(user_id)?)
            .and_then(|state| state.channel_id)
            .map(|id| ChannelId(id.get())))
    }

    async fn disconnect_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        reason: &str,
    ) -> Result<(), PlatformError> {
        let http = self.http()?;
        guild_ref(guild_id)?
            .edit_member(
                &**http,
                user_ref(user_id)?,
                EditMember::new().disconnect_member().audit_log_reason(reason),
            )
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), PlatformError> {
        let http = self.http()?;
        let message = nonzero(message_id.get(), "message")?;
        channel_ref(channel_id)?
            .delete_message(&**http, serenity::all::MessageId::new(message.get()))
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<(), PlatformError> {
        let http = self.http()?;
        channel_ref(channel_id)?
            .say(&**http, content)
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;
        Ok(())
    }

    async fn user_name(&self, user_id: UserId) -> Option<String> {
        let id = user_ref(user_id).ok()?;
        if let Some(name) = self.cache.get().and_then(|cache| cache.user(id).map(|u| u.name.clone())) {
            return Some(name);
        }

        let http = self.http().ok()?;
        match http.get_user(id).await {
            Ok(user) => Some(user.name),
            Err(e) => {
                debug!("Could not fetch user {}: {}", user_id, e);
                None
            }
        }
    }
}

/// Translates serenity gateway events into calls on [`GuardBot`]
pub struct DiscordHandler {
    bot: Arc<GuardBot>,
    command_guild_id: Option<GuildId>,
}

impl DiscordHandler {
    pub fn new(bot: Arc<GuardBot>, command_guild_id: Option<GuildId>) -> Self {
        Self { bot, command_guild_id }
    }

    async fn register_commands(&self, ctx: &Context) {
        let commands: Vec<CreateCommand> = GuardCommand::all()
            .iter()
            .map(|command| CreateCommand::new(command.name()).description(command.description()))
            .collect();
        let count = commands.len();

        let result = match self.command_guild_id.map(guild_ref) {
            Some(Ok(guild)) => guild.set_commands(&ctx.http, commands).await.map(|_| ()),
            Some(Err(e)) => {
                error!("Invalid command guild: {}", e);
                return;
            }
            None => Command::set_global_commands(&ctx.http, commands).await.map(|_| ()),
        };

        match result {
            Ok(()) => info!("Registered {} slash commands", count),
            Err(e) => error!("Error registering commands: {}", e),
        }
    }

    async fn handle_command(&self, ctx: &Context, command: CommandInteraction) {
        let Some(guild_command) = GuardCommand::from_name(&command.data.name) else {
            debug!("Ignoring unknown command: {}", command.data.name);
            return;
        };

        if let Err(e) = command.defer(ctx).await {
            error!("Could not defer reply to '{}': {}", command.data.name, e);
            return;
        }

        let reply = match command.guild_id {
            Some(guild_id) => {
                if let Some(progress) = guild_command.progress_message() {
                    edit_reply(ctx, &command, progress).await;
                }
                let invocation = CommandInvocation {
                    command: guild_command,
                    guild_id: GuildId(guild_id.get()),
                    user_id: UserId(command.user.id.get()),
                    user_tag: command.user.tag(),
                };
                self.bot.on_command(&invocation).await
            }
            None => {
                warn!("Command '{}' used outside a guild", command.data.name);
                COMMAND_FAILED.to_string()
            }
        };

        edit_reply(ctx, &command, &reply).await;
    }
}

async fn edit_reply(ctx: &Context, command: &CommandInteraction, content: &str) {
    if let Err(e) = command
        .edit_response(ctx, EditInteractionResponse::new().content(content))
        .await
    {
        error!("Could not edit reply to '{}': {}", command.data.name, e);
    }
}

fn channel_name(ctx: &Context, message: &Message) -> String {
    message
        .guild_id
        .and_then(|guild_id| {
            ctx.cache
                .guild(guild_id)
                .and_then(|guild| guild.channels.get(&message.channel_id).map(|c| c.name.clone()))
        })
        .unwrap_or_else(|| message.channel_id.to_string())
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Logged in as {}", ready.user.tag());
        self.register_commands(&ctx).await;
        self.bot.on_ready().await;
    }

    async fn message(&self, ctx: Context, message: Message) {
        let Some(guild_id) = message.guild_id else {
            return;
        };

        let chat_message = ChatMessage {
            message_id: MessageId(message.id.get()),
            guild_id: GuildId(guild_id.get()),
            channel_id: ChannelId(message.channel_id.get()),
            channel_name: channel_name(&ctx, &message),
            author_id: UserId(message.author.id.get()),
            author_tag: message.author.tag(),
            author_name: message.author.name.clone(),
            author_is_bot: message.author.bot,
            content: message.content.clone(),
            timestamp: chrono::DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
                .unwrap_or_else(chrono::Utc::now),
        };

        self.bot.on_message(&chat_message).await;
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let change = VoicePresenceChange {
            guild_id: GuildId(guild_id.get()),
            user_id: UserId(new.user_id.get()),
            user_tag: new
                .member
                .as_ref()
                .map(|m| m.user.tag())
                .unwrap_or_else(|| new.user_id.to_string()),
            old_channel: old.and_then(|state| state.channel_id).map(|id| ChannelId(id.get())),
            new_channel: new.channel_id.map(|id| ChannelId(id.get())),
        };

        self.bot.on_voice_state_update(&change).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            self.handle_command(&ctx, command).await;
        }
    }
}

/// Build the serenity client with songbird registered as the voice manager
pub async fn build_client(
    credentials: &DiscordCredentials,
    handler: DiscordHandler,
    platform: &DiscordPlatform,
) -> Result<Client, serenity::Error> {
    let mut builder = Client::builder(&credentials.token, gateway_intents())
        .event_handler(handler)
        .register_songbird_with(Arc::clone(&platform.songbird));

    if let Some(application_id) = credentials.application_id.and_then(NonZeroU64::new) {
        builder = builder.application_id(ApplicationId::new(application_id.get()));
    }

    let client = builder.await?;
    platform.attach(Arc::clone(&client.http), Arc::clone(&client.cache));
    Ok(client)
}

/// Stops every gateway shard on shutdown
pub struct GatewayShutdown(pub Arc<ShardManager>);

#[async_trait]
impl ShutdownComponent for GatewayShutdown {
    fn name(&self) -> &str {
        "discord_gateway"
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.0.shutdown_all().await;
        Ok(())
    }
}
