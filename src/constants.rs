pub const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const OPENAI_MODEL: &str = "gpt-3.5-turbo";

pub const PROVIDER_TIMEOUT_SECS: u64 = 30;
pub const MAX_COMPLETION_TOKENS: u32 = 500;
pub const SAMPLING_TEMPERATURE: f32 = 0.7;

pub const PERSONA_PROMPT: &str = "You are Verdant, the resident guide of a community of builders. \
You help members find their next concrete step: scoping an idea, unblocking a stuck task, or \
pointing at the right channel and the right people. You speak plainly and warmly, as a member of \
the community rather than a generic assistant, and you favor specific suggestions over platitudes. \
Keep responses concise but useful. Max 300 words.";

// chat platform connection
pub const IRC_SERVER: &str = "irc.chat.twitch.tv";
pub const IRC_PORT: u16 = 6697;
pub const IRC_PING_TIME: u32 = 300;

pub const COMMAND_PREFIX: char = '!';
pub const TRIGGER_WORD: &str = "verdant";

/// Reply lines are split below the IRC message ceiling to leave headroom for
/// the protocol envelope
pub const REPLY_LINE_WIDTH: usize = 400;

// per-channel prompt-context window; non-authoritative, resets on restart
pub const HISTORY_WINDOW: usize = 20;
pub const CONTEXT_MESSAGES: usize = 5;
pub const STORED_CONTEXT_ROWS: i64 = 3;

pub const LEADERBOARD_SIZE: i64 = 10;
