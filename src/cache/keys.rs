/// Counting key namespace.
const RATE_PREFIX: &str = "rate:";

/// Block key namespace.
const BLOCK_PREFIX: &str = "block:";

/// Identity namespace for bare client addresses.
const IP_PREFIX: &str = "ip:";

/// Identity namespace for API tokens.
const TOKEN_PREFIX: &str = "token:";

pub fn counting_key(identity: &str) -> String {
    format!("{}{}", RATE_PREFIX, identity)
}

pub fn block_key(identity: &str) -> String {
    format!("{}{}", BLOCK_PREFIX, identity)
}

pub fn ip_identity(addr: &str) -> String {
    format!("{}{}", IP_PREFIX, addr)
}

pub fn token_identity(token: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, token)
}

pub fn is_counting_key(key: &str) -> bool {
    key.starts_with(RATE_PREFIX)
}

fn token_counting_prefix() -> String {
    counting_key(TOKEN_PREFIX)
}

/// Hides most of the token in a `rate:token:<value>` key. At most four
/// characters, and never more than half the token, stay visible. Other keys
/// are returned unchanged.
pub fn redact_counting_key(key: &str) -> String {
    let prefix = token_counting_prefix();
    match key.strip_prefix(&prefix) {
        Some(token) => {
            let shown = (token.chars().count() / 2).min(4);
            let visible: String = token.chars().take(shown).collect();
            format!("{}{}***", prefix, visible)
        }
        None => key.to_string(),
    }
}

/// True when `prefix` filters on part of a token value, which would let a
/// caller recover tokens one character at a time.
pub fn reaches_into_token(prefix: &str) -> bool {
    let tokens = token_counting_prefix();
    prefix.len() > tokens.len() && prefix.starts_with(&tokens)
}
