use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use irc::client::prelude::*;
use irc::proto::CapSubCommand;
use leaky_bucket::RateLimiter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::bot::{self, commands::SenderInfo};
use crate::chat::ChatOrchestrator;
use crate::constants::{IRC_PING_TIME, IRC_PORT, IRC_SERVER};
use crate::util::env::{self, EnvErr};

// platform send budget: 20 lines per 30 seconds
const SEND_BURST: usize = 20;
const SEND_REFILL_MS: u64 = 1500;

#[derive(Debug)]
pub struct BotConnection {
    pub config: Config,
    pub client: Client,
    pub channels: Vec<String>,
    pub login: String,
    pub id: Uuid,
}

/// Spawns the platform listener, or nothing at all when the bot credentials
/// are absent - the HTTP surface keeps working either way.
#[instrument(skip(orchestrator))]
pub async fn bot_runner(orchestrator: Arc<ChatOrchestrator>) -> BotResult<Vec<JoinHandle<()>>> {
    let vars = env::vars().await?;

    if !vars.bot_configured() {
        tracing::warn!("bot credentials or channel list unset - listener disabled");
        return Ok(Vec::new());
    }

    let channels = vars.bot_channels.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = run_event_loop(channels, orchestrator).await {
            tracing::error!(error = ?e, "bot listener exited");
        }
    });

    Ok(vec![handle])
}

async fn run_event_loop(
    channels: Vec<String>,
    orchestrator: Arc<ChatOrchestrator>,
) -> BotResult<()> {
    let mut conn = BotConnection::init(channels).await?;
    conn.connect()?;

    let mut stream = conn.client.stream()?;
    let limiter = RateLimiter::builder()
        .max(SEND_BURST)
        .initial(SEND_BURST)
        .refill(1)
        .interval(Duration::from_millis(SEND_REFILL_MS))
        .build();

    let mut check_interval = tokio::time::interval(Duration::from_secs(30));
    check_interval.tick().await;

    loop {
        tokio::select! {
            Some(msg_res) = stream.next() => {
                match msg_res {
                    Ok(msg) => {
                        if let Err(e) = handle_message(&msg, &mut conn, &orchestrator, &limiter).await {
                            tracing::error!(error = ?e, "message handling failure");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = ?e, "stream read failure");
                    }
                }
            }

            _ = check_interval.tick() => {
                if let Err(e) = rejoin_channels(&mut conn) {
                    tracing::error!(error = ?e, "channel rejoin failure");
                }
            }
        }
    }
}

impl BotConnection {
    #[instrument(skip(channels))]
    pub async fn init(channels: Vec<String>) -> BotResult<Self> {
        let vars = env::vars().await?;
        let login = vars.bot_login.clone().unwrap_or_default();
        let token = vars.bot_token.clone().unwrap_or_default();

        let channel_rooms: Vec<String> = channels.iter().map(|chan| format!("#{}", chan)).collect();

        tracing::info!(channels = ?channels, "channel list");

        let config = Config {
            use_tls: Some(true),
            nickname: Some(login.clone()),
            password: Some(format!("oauth:{}", token)),

            server: Some(IRC_SERVER.to_string()),
            port: Some(IRC_PORT),
            ping_time: Some(IRC_PING_TIME),
            ..Config::default()
        };

        let connection = Client::from_config(config.clone()).await?;

        Ok(Self {
            config,
            client: connection,
            channels: channel_rooms,
            login,
            id: Uuid::new_v4(),
        })
    }

    #[instrument(skip(self))]
    pub fn connect(&mut self) -> BotResult<()> {
        self.client.identify()?; // authenticate
        self.client.send_cap_req(&[
            ChatCap::Commands.into(),
            ChatCap::Membership.into(),
            ChatCap::Tags.into(),
        ])?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub fn join_all_channels(&mut self) -> BotResult<()> {
        let channels = self.channels.clone();
        self.join_channels(channels)
    }

    #[instrument(skip(self))]
    pub fn join_channels(&mut self, channels: Vec<String>) -> BotResult<()> {
        let join_str = channels.join(",");

        tracing::info!("sending join");
        self.client.send_join(join_str)?;

        Ok(())
    }

    #[instrument(skip(self), fields(id = %self.id))]
    pub fn get_joined(&mut self) -> Vec<String> {
        if let Some(channels) = self.client.list_channels() {
            return channels;
        }

        Vec::new()
    }
}

#[instrument(skip(conn))]
fn rejoin_channels(conn: &mut BotConnection) -> BotResult<()> {
    let expected: HashSet<String> = conn.channels.iter().cloned().collect();
    let joined: HashSet<String> = conn.get_joined().into_iter().collect();

    let missing: Vec<String> = expected.difference(&joined).cloned().collect();

    if !missing.is_empty() {
        tracing::warn!(missing_count = missing.len(), missing = ?missing, "trying channel rejoin");
        conn.join_channels(missing)?;
    } else {
        tracing::debug!(joined_count = joined.len(), "all channels appear joined");
    }

    Ok(())
}

#[instrument(skip(msg, conn, orchestrator, limiter))]
async fn handle_message(
    msg: &Message,
    conn: &mut BotConnection,
    orchestrator: &ChatOrchestrator,
    limiter: &RateLimiter,
) -> BotResult<()> {
    match &msg.command {
        // this is the only command we REALLY care about, but the others
        // are nice to have
        Command::PRIVMSG(channel, msg_content) => {
            let sender = parse_tags(msg);
            let channel_name = channel.trim_start_matches('#').to_string();

            tracing::info!(login = sender.login, channel = channel_name, "RX PRIVMSG");

            let replies =
                bot::handle_privmsg(orchestrator, &sender, &channel_name, msg_content, &conn.login)
                    .await;

            for line in replies {
                limiter.acquire_one().await;
                conn.client.send_privmsg(channel, line)?;
            }
        }

        Command::PONG(_, _) | Command::PING(_, _) => {
            let joined = conn.get_joined();
            tracing::debug!(
                current_joined_channel_count = joined.len(),
                total_tracked_channel_count = conn.channels.len(),
                "join stats (RX PING)",
            );
        }

        Command::CAP(_, result, caps, _) => match result {
            CapSubCommand::ACK => {
                if let Some(caps) = caps {
                    tracing::info!("CAP REQ {} ok", caps);
                }

                if conn.get_joined().is_empty() {
                    conn.join_all_channels()?;
                }
            }

            CapSubCommand::NAK => {
                tracing::warn!("CAP REQ {:?} invalid", caps)
            }

            _ => tracing::error!("unknown CAP REQ res {:?} (raw msg={:?})", result, msg),
        },

        Command::NOTICE(msg_id, target) => {
            tracing::warn!("{}: RECV NOTICE: {}", target, msg_id);
        }

        Command::JOIN(channel, _, _) => {
            if let Some(Prefix::Nickname(user, _, _)) = &msg.prefix {
                tracing::debug!("{}: JOIN {}", user, channel);
            }
        }

        Command::PART(channel, _) => {
            if let Some(Prefix::Nickname(user, _, _)) = &msg.prefix {
                tracing::info!("{}: PART {}", user, channel);
            }
        }

        Command::Response(Response::RPL_MOTD, parts) if parts.len() > 1 => {
            info!(username = parts[0], motd = parts[1], "MOTD RX");
        }

        _ => {
            tracing::debug!(command = ?msg.command, message = ?msg, "received generic cmd");
        }
    }

    Ok(())
}

/// Pulls sender identity and badge bits out of the message tag envelope
#[instrument(skip(msg))]
pub fn parse_tags(msg: &Message) -> SenderInfo {
    let mut result = SenderInfo::default();

    if let Some(Prefix::Nickname(nick, _, _)) = &msg.prefix {
        result.login = nick.to_lowercase();
    }

    for tag in msg.tags.clone().unwrap_or_default() {
        match (tag.0.as_str(), tag.1) {
            ("user-id", Some(user_id)) => result.user_id = user_id,
            ("display-name", Some(name)) => result.display_name = name,
            ("color", Some(color)) => result.color = color,
            ("mod", Some(flag)) => result.moderator = result.moderator || flag == "1",
            ("badges", Some(badges)) => {
                if badges.split(',').any(|badge| badge.starts_with("broadcaster/")) {
                    result.broadcaster = true;
                }
                if badges.split(',').any(|badge| badge.starts_with("moderator/")) {
                    result.moderator = true;
                }
            }
            _ => (),
        }
    }

    if result.login.is_empty() {
        warn!(tags = ?msg.tags, "PRIVMSG without a usable sender prefix");
    }

    result
}

#[derive(Debug)]
pub enum ChatCap {
    Tags,
    Commands,
    Membership,
}

impl From<ChatCap> for Capability {
    fn from(value: ChatCap) -> Self {
        match value {
            ChatCap::Tags => Capability::Custom("twitch.tv/tags"),
            ChatCap::Commands => Capability::Custom("twitch.tv/commands"),
            ChatCap::Membership => Capability::Custom("twitch.tv/membership"),
        }
    }
}

pub type BotResult<T> = core::result::Result<T, BotErr>;

#[derive(Debug, Error)]
pub enum BotErr {
    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error(transparent)]
    ClientError(#[from] irc::error::Error),
}
