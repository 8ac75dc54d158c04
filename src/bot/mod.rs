use std::time::Duration;

use tracing::instrument;

use crate::chat::{ChatOrchestrator, ChatRequest};
use crate::classifier::{self, Label};
use crate::constants::{LEADERBOARD_SIZE, REPLY_LINE_WIDTH, TRIGGER_WORD};
use crate::db;
use crate::db::prelude::*;
use crate::levels;
use crate::progression::{ProgressionEngine, ProgressionResult, PromotionOutcome, XpReward};
use crate::util::env;

pub mod client;
pub mod commands;

use commands::{BotCommand, SenderInfo};

/// One inbound channel message in, zero or more reply lines out. Commands win
/// over mention-triggered chat; anything else is ignored.
#[instrument(skip(orchestrator, sender, text))]
pub async fn handle_privmsg(
    orchestrator: &ChatOrchestrator,
    sender: &SenderInfo,
    channel: &str,
    text: &str,
    bot_login: &str,
) -> Vec<String> {
    if sender.login.eq_ignore_ascii_case(bot_login) {
        return Vec::new();
    }

    if let Some(parsed) = commands::parse(text) {
        return match parsed {
            Ok(command) => dispatch_command(sender, command).await,
            Err(e) => vec![format!("@{} {}", sender.login, e)],
        };
    }

    if mentions_bot(text, bot_login) {
        return mention_reply(orchestrator, sender, channel, text, bot_login).await;
    }

    Vec::new()
}

fn mentions_bot(text: &str, bot_login: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains(TRIGGER_WORD) || lowered.contains(&format!("@{}", bot_login.to_lowercase()))
}

fn strip_mention(text: &str, bot_login: &str) -> String {
    let mut content = text.to_string();
    for needle in [
        format!("@{bot_login}"),
        format!("@{}", bot_login.to_lowercase()),
    ] {
        content = content.replace(&needle, "");
    }

    content.trim().to_string()
}

async fn mention_reply(
    orchestrator: &ChatOrchestrator,
    sender: &SenderInfo,
    channel: &str,
    text: &str,
    bot_login: &str,
) -> Vec<String> {
    let mut content = strip_mention(text, bot_login);
    if content.is_empty() {
        content = String::from("Hello!");
    }

    orchestrator.history().push(channel, &sender.login, &content);

    let req = ChatRequest {
        message: content.clone(),
        user_id: Some(sender.login.clone()),
        context: None,
    };
    let reply = orchestrator.respond(&req, Some(channel)).await;

    orchestrator
        .history()
        .push(channel, bot_login, &reply.response);

    // engagement xp rides along; promotions stay silent here so a chatty
    // batch doesn't turn into a wall of level-up spam
    award_message_xp(sender, &content).await;

    split_reply(&reply.response)
}

async fn award_message_xp(sender: &SenderInfo, content: &str) {
    let Some(pool) = db::try_pool() else {
        return;
    };

    let engine = ProgressionEngine::new(pool);
    let id = UserId::from(sender.login.as_str());

    if let Err(e) = engine.register(&id, sender.display()).await {
        tracing::warn!(error = ?e, "register failed during message xp award");
        return;
    }

    let sample = classifier::classify(content);
    let reward = if sample.label == Label::Builder {
        XpReward::HelpfulMessage
    } else {
        XpReward::Message
    };

    if let Err(e) = engine.add_xp(&id, reward.amount(), reward.reason()).await {
        tracing::warn!(error = ?e, "message xp award failed");
    }

    if let Err(e) = engine.observe_builder_signal(&id, &sample).await {
        tracing::warn!(error = ?e, "builder score update failed");
    }
}

#[instrument(skip(sender))]
async fn dispatch_command(sender: &SenderInfo, command: BotCommand) -> Vec<String> {
    match command {
        BotCommand::Ping => vec![String::from("pong! still here, still counting xp")],
        BotCommand::Status => status_command().await,
        BotCommand::Help => help_lines(),
        BotCommand::Level => level_command(sender).await,
        BotCommand::Leaderboard => leaderboard_command().await,
        BotCommand::GiveXp {
            target,
            amount,
            reason,
        } => give_xp_command(sender, &target, amount, &reason).await,
        BotCommand::Verify { url } => verify_command(sender, &url).await,
    }
}

/// Probes our own HTTP surface, same as an external monitor would
async fn status_command() -> Vec<String> {
    let port = match env::vars().await {
        Ok(vars) => vars.server_api_port,
        Err(_) => return vec![String::from("config trouble - check the service logs")],
    };

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(_) => return vec![String::from("couldn't even build an http client, so: not great")],
    };

    match client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
    {
        Ok(res) if res.status().is_success() => {
            vec![String::from("all systems online and healthy!")]
        }
        Ok(res) => vec![format!("the api answered with status {}", res.status())],
        Err(_) => vec![String::from("the api is not responding")],
    }
}

fn help_lines() -> Vec<String> {
    vec![
        format!(
            "talk to me by mentioning '{TRIGGER_WORD}' anywhere in a message. commands: !ping, !status, !level, !leaderboard, !verify <url>, !give_xp <user> <amount> [reason] (mods)"
        ),
    ]
}

async fn level_command(sender: &SenderInfo) -> Vec<String> {
    let Some(pool) = db::try_pool() else {
        return vec![store_down_line(&sender.login)];
    };

    let engine = ProgressionEngine::new(pool);
    let id = UserId::from(sender.login.as_str());

    let existing = match engine.get_user(&id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = ?e, "level lookup failed");
            return vec![store_down_line(&sender.login)];
        }
    };

    let user = match existing {
        Some(user) => user,
        None => match engine.register(&id, sender.display()).await {
            Ok(user) => return vec![welcome_line(sender.display()), level_status_line(&user)],
            Err(e) => {
                tracing::error!(error = ?e, "registration failed");
                return vec![store_down_line(&sender.login)];
            }
        },
    };

    // a pending eligible promotion is claimed here, explicitly, rather than
    // silently on each xp grant
    let eligible = levels::eligible_level(user.total_xp);
    if eligible > user.current_level {
        match engine.promote(&id, eligible, &sender.login).await {
            Ok(promoted) => return vec![level_up_line(sender.display(), &promoted)],
            Err(e) => {
                tracing::error!(error = ?e, "eligible promotion failed");
            }
        }
    }

    vec![level_status_line(&user)]
}

async fn leaderboard_command() -> Vec<String> {
    let Some(pool) = db::try_pool() else {
        return vec![String::from("the ledger is offline right now, try again later")];
    };

    let rows = match UserRepository::new(pool)
        .leaderboard_page(LEADERBOARD_SIZE, 0)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = ?e, "leaderboard query failed");
            return vec![String::from("leaderboard query fell over, sorry")];
        }
    };

    if rows.is_empty() {
        return vec![String::from("no builders registered yet - be the first!")];
    }

    let entries = rows
        .iter()
        .map(|row| {
            let rank_name = levels::get(row.current_level)
                .unwrap_or(levels::base())
                .name;
            format!(
                "{}. {} - {} XP ({})",
                row.ranking, row.username, row.total_xp, rank_name
            )
        })
        .collect::<Vec<_>>()
        .join(" | ");

    split_reply(&format!("TOP BUILDERS: {entries}"))
}

async fn give_xp_command(
    sender: &SenderInfo,
    target: &str,
    amount: i64,
    reason: &str,
) -> Vec<String> {
    if !sender.can_moderate() {
        return vec![format!("@{} only moderators can give xp!", sender.login)];
    }

    let Some(pool) = db::try_pool() else {
        return vec![store_down_line(&sender.login)];
    };

    let engine = ProgressionEngine::new(pool);
    let target_id = UserId::from(target);

    let granted: ProgressionResult<_> = async {
        engine.register(&target_id, target).await?;
        engine
            .add_xp(&target_id, amount, &format!("manual: {reason}"))
            .await
    }
    .await;

    let outcome = match granted {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = ?e, "manual xp grant failed");
            return vec![format!("@{} couldn't apply that grant: {}", sender.login, e)];
        }
    };

    let mut replies = vec![format!(
        "gave {} XP to {}! total: {} XP",
        amount, target, outcome.total_xp
    )];

    if outcome.can_promote {
        match engine
            .promote(&target_id, outcome.eligible_level, &sender.login)
            .await
        {
            Ok(promoted) => replies.push(level_up_line(target, &promoted)),
            Err(e) => {
                tracing::error!(error = ?e, "post-grant promotion failed");
            }
        }
    }

    replies
}

async fn verify_command(sender: &SenderInfo, url: &str) -> Vec<String> {
    let Some(pool) = db::try_pool() else {
        return vec![store_down_line(&sender.login)];
    };

    let engine = ProgressionEngine::new(pool);
    let id = UserId::from(sender.login.as_str());

    let submitted: ProgressionResult<_> = async {
        engine.register(&id, sender.display()).await?;
        engine.submit_social_url(&id, url).await
    }
    .await;

    match submitted {
        Ok(check) if check.is_valid => {
            let reward = XpReward::SocialVerified;
            if let Err(e) = engine.add_xp(&id, reward.amount(), reward.reason()).await {
                tracing::error!(error = ?e, "verification xp award failed");
            }

            vec![format!(
                "@{} got it - profile recorded, +{} XP. a moderator will confirm it shortly",
                sender.login,
                reward.amount()
            )]
        }
        Ok(_) => vec![format!(
            "@{} that doesn't look like a profile on a platform i recognize",
            sender.login
        )],
        Err(e) => {
            tracing::error!(error = ?e, "social url submission failed");
            vec![store_down_line(&sender.login)]
        }
    }
}

fn store_down_line(login: &str) -> String {
    format!("@{login} the ledger is offline right now, try again later")
}

fn welcome_line(username: &str) -> String {
    format!(
        "welcome {username}! you're in the LOBBY (level 0). chat with me to earn XP - !level shows your progress"
    )
}

fn level_status_line(user: &UserRecord) -> String {
    let def = levels::get(user.current_level).unwrap_or(levels::base());

    let next = match levels::next_threshold(user.current_level) {
        Some(threshold) => format!("next level at {threshold} XP"),
        None => String::from("max level reached"),
    };

    format!(
        "@{} level {} {} ({}) - {} XP, builder score {:.0}%, status {} - {}",
        user.username,
        user.current_level,
        def.name,
        def.title,
        user.total_xp,
        user.builder_score * 100.0,
        user.status(),
        next,
    )
}

fn level_up_line(username: &str, promoted: &PromotionOutcome) -> String {
    let next = match levels::next_threshold(promoted.to_level) {
        Some(threshold) => format!("next level at {threshold} XP"),
        None => String::from("top of the ladder"),
    };

    format!(
        "LEVEL UP! {} reached level {}: {} ({}) - new channels: {} - perks: {} - {}",
        username,
        promoted.to_level,
        promoted.name,
        promoted.title,
        promoted.channels.join(", "),
        promoted.perks.join(", "),
        next,
    )
}

/// Splits a reply into line-width chunks on word boundaries
pub fn split_reply(text: &str) -> Vec<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>();
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in cleaned {
        if !current.is_empty() && current.len() + word.len() + 1 > REPLY_LINE_WIDTH {
            chunks.push(std::mem::take(&mut current));
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mention_detection() {
        assert!(mentions_bot("hey verdant, what's up", "verdantbot"));
        assert!(mentions_bot("VERDANT please help", "verdantbot"));
        assert!(mentions_bot("ping @VerdantBot", "verdantbot"));
        assert!(!mentions_bot("just chatting about plants", "verdantbot"));
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("@verdant hello", "verdant"), "hello");
        assert_eq!(strip_mention("hello", "verdant"), "hello");
    }

    #[test]
    fn test_split_reply_short_text_is_one_chunk() {
        let chunks = split_reply("a short reply");
        assert_eq!(chunks, vec!["a short reply".to_string()]);
    }

    #[test]
    fn test_split_reply_respects_width() {
        let long = "word ".repeat(200);
        let chunks = split_reply(&long);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= REPLY_LINE_WIDTH);
        }
        assert_eq!(chunks.join(" "), long.trim());
    }

    #[test]
    fn test_split_reply_flattens_newlines() {
        let chunks = split_reply("line one\nline two");
        assert_eq!(chunks, vec!["line one line two".to_string()]);
    }

    #[test]
    fn test_level_up_line_contains_grants() {
        let promoted = PromotionOutcome {
            user_id: UserId::from("plss"),
            from_level: 0,
            to_level: 1,
            name: "SEEDLING",
            title: "Verified Human",
            channels: &["lounge", "how-to-help"],
            perks: &["Can chat in lounge"],
        };

        let line = level_up_line("plss", &promoted);
        assert!(line.contains("SEEDLING"));
        assert!(line.contains("Verified Human"));
        assert!(line.contains("lounge"));
        assert!(line.contains("next level at 200 XP"));
    }
}
