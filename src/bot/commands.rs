use thiserror::Error;

use crate::constants::COMMAND_PREFIX;

/// Cursor over a prefix-command body; all methods are utf8-boundary safe
pub struct Lexer<'a> {
    pub input: &'a str,
    pub byte_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, byte_pos: 0 }
    }

    pub fn peek_char(&self) -> Option<char> {
        self.input[self.byte_pos..].chars().next()
    }

    pub fn next(&mut self) -> Option<char> {
        let ch = self.peek_char();
        if let Some(utf) = ch {
            self.byte_pos += utf.len_utf8();
            Some(utf)
        } else {
            None
        }
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.next();
            } else {
                break;
            }
        }
    }

    /// Consumes consecutive non-whitespace characters, returning the word
    pub fn next_word(&mut self) -> Option<&'a str> {
        let start = self.byte_pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                break;
            }

            self.next();
        }

        if start == self.byte_pos {
            None
        } else {
            Some(&self.input[start..self.byte_pos])
        }
    }

    /// Consume the remaining input stream and return it whole
    pub fn rest(&mut self) -> Option<&'a str> {
        if self.is_eof() {
            None
        } else {
            let result = &self.input[self.byte_pos..];
            self.byte_pos = self.input.len();
            Some(result)
        }
    }

    pub fn is_eof(&self) -> bool {
        self.byte_pos >= self.input.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BotCommand {
    Ping,
    Status,
    Help,
    Level,
    Leaderboard,
    GiveXp {
        target: String,
        amount: i64,
        reason: String,
    },
    Verify {
        url: String,
    },
}

/// Message metadata lifted from the platform's tag envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SenderInfo {
    pub user_id: String,
    pub login: String,
    pub display_name: String,
    pub color: String,
    pub moderator: bool,
    pub broadcaster: bool,
}

impl SenderInfo {
    pub fn display(&self) -> &str {
        if self.display_name.is_empty() {
            &self.login
        } else {
            &self.display_name
        }
    }

    pub fn can_moderate(&self) -> bool {
        self.moderator || self.broadcaster
    }
}

pub type CommandResult = core::result::Result<BotCommand, CommandError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}' - try !help")]
    UnknownCommand(String),

    #[error("'{command}' needs a {param}")]
    MissingParameter { command: String, param: String },

    #[error("'{0}' is not an xp amount")]
    InvalidAmount(String),
}

/// `None` for ordinary chat; `Some` when the message carries the command
/// prefix, whether or not the body parses.
pub fn parse(input: &str) -> Option<CommandResult> {
    let body = input.trim().strip_prefix(COMMAND_PREFIX)?;
    if body.is_empty() || body.starts_with(char::is_whitespace) {
        return None;
    }

    let mut lexer = Lexer::new(body);
    let command = lexer.next_word()?.to_lowercase();
    lexer.skip_whitespace();

    Some(match command.as_str() {
        "ping" => Ok(BotCommand::Ping),
        "status" => Ok(BotCommand::Status),
        "help" => Ok(BotCommand::Help),
        "level" => Ok(BotCommand::Level),
        "leaderboard" => Ok(BotCommand::Leaderboard),
        "give_xp" => parse_give_xp(&mut lexer),
        "verify" => parse_verify(&mut lexer),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    })
}

fn parse_give_xp(lexer: &mut Lexer) -> CommandResult {
    let target = lexer
        .next_word()
        .ok_or_else(|| CommandError::MissingParameter {
            command: "give_xp".to_string(),
            param: "target user".to_string(),
        })?
        .trim_start_matches('@')
        .to_lowercase();
    lexer.skip_whitespace();

    let raw_amount = lexer
        .next_word()
        .ok_or_else(|| CommandError::MissingParameter {
            command: "give_xp".to_string(),
            param: "xp amount".to_string(),
        })?;
    let amount = raw_amount
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidAmount(raw_amount.to_string()))?;
    lexer.skip_whitespace();

    let reason = lexer
        .rest()
        .map(|rest| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
        .unwrap_or_else(|| String::from("manual award"));

    Ok(BotCommand::GiveXp {
        target,
        amount,
        reason,
    })
}

fn parse_verify(lexer: &mut Lexer) -> CommandResult {
    let url = lexer
        .next_word()
        .ok_or_else(|| CommandError::MissingParameter {
            command: "verify".to_string(),
            param: "profile url".to_string(),
        })?
        .to_string();

    Ok(BotCommand::Verify { url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_chat_is_not_a_command() {
        assert!(parse("hello verdant, how are you").is_none());
        assert!(parse("").is_none());
        assert!(parse("!").is_none());
        assert!(parse("! level").is_none());
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("!ping").unwrap().unwrap(), BotCommand::Ping);
        assert_eq!(parse("  !status  ").unwrap().unwrap(), BotCommand::Status);
        assert_eq!(parse("!LEVEL").unwrap().unwrap(), BotCommand::Level);
        assert_eq!(
            parse("!leaderboard").unwrap().unwrap(),
            BotCommand::Leaderboard
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse("!frobnicate").unwrap().unwrap_err(),
            CommandError::UnknownCommand("frobnicate".to_string())
        );
    }

    #[test]
    fn test_give_xp_full_form() {
        let parsed = parse("!give_xp @Plss 25 helped debug the socket pool")
            .unwrap()
            .unwrap();

        assert_eq!(
            parsed,
            BotCommand::GiveXp {
                target: "plss".to_string(),
                amount: 25,
                reason: "helped debug the socket pool".to_string(),
            }
        );
    }

    #[test]
    fn test_give_xp_default_reason() {
        let parsed = parse("!give_xp someone 5").unwrap().unwrap();

        assert_eq!(
            parsed,
            BotCommand::GiveXp {
                target: "someone".to_string(),
                amount: 5,
                reason: "manual award".to_string(),
            }
        );
    }

    #[test]
    fn test_give_xp_negative_amount_parses() {
        // penalties are a caller policy, the parser just reads the integer
        let parsed = parse("!give_xp someone -10 spam").unwrap().unwrap();

        match parsed {
            BotCommand::GiveXp { amount, .. } => assert_eq!(amount, -10),
            other => panic!("expected GiveXp, got {other:?}"),
        }
    }

    #[test]
    fn test_give_xp_bad_amount() {
        assert_eq!(
            parse("!give_xp someone lots").unwrap().unwrap_err(),
            CommandError::InvalidAmount("lots".to_string())
        );
    }

    #[test]
    fn test_give_xp_missing_params() {
        assert!(matches!(
            parse("!give_xp").unwrap().unwrap_err(),
            CommandError::MissingParameter { .. }
        ));
        assert!(matches!(
            parse("!give_xp someone").unwrap().unwrap_err(),
            CommandError::MissingParameter { .. }
        ));
    }

    #[test]
    fn test_verify_command() {
        assert_eq!(
            parse("!verify https://github.com/plss").unwrap().unwrap(),
            BotCommand::Verify {
                url: "https://github.com/plss".to_string()
            }
        );
        assert!(matches!(
            parse("!verify").unwrap().unwrap_err(),
            CommandError::MissingParameter { .. }
        ));
    }

    #[test]
    fn test_lexer_utf8_words() {
        let mut lexer = Lexer::new("héllo wörld");

        assert_eq!(lexer.next_word(), Some("héllo"));
        lexer.skip_whitespace();
        assert_eq!(lexer.rest(), Some("wörld"));
        assert!(lexer.is_eof());
    }
}
