//! Simulated progressive reveal
//!
//! When the runtime cannot read the response body incrementally, the client
//! fetches the whole reply and replays it token by token so the user still
//! sees text appear progressively.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Splits `text` into word tokens that keep their trailing whitespace
///
/// Concatenating the tokens always yields `text` exactly. Leading whitespace
/// stays attached to the first word.
///
/// # Examples
///
/// ```
/// use noor::client::reveal::tokenize_preserving_whitespace;
///
/// let tokens = tokenize_preserving_whitespace("Peace be upon you");
/// assert_eq!(tokens, vec!["Peace ", "be ", "upon ", "you"]);
/// ```
pub fn tokenize_preserving_whitespace(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut seen_word = false;
    let mut previous_was_space = false;

    for (index, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        if !is_space && previous_was_space && seen_word {
            tokens.push(&text[start..index]);
            start = index;
        }
        if !is_space {
            seen_word = true;
        }
        previous_was_space = is_space;
    }

    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Result of a reveal run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    /// Text shown to the user before the reveal ended
    pub revealed: String,
    /// Whether the reveal was stopped by cancellation
    pub cancelled: bool,
}

/// Replays `text` one token per tick, calling `on_token` for each
///
/// The first token is emitted immediately. Cancellation is checked before
/// every tick and takes priority over it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use noor::client::reveal::reveal;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let mut shown = Vec::new();
/// let result = reveal(
///     "Peace be upon you",
///     Duration::from_millis(1),
///     &CancellationToken::new(),
///     |token| shown.push(token.to_string()),
/// )
/// .await;
/// assert_eq!(result.revealed, "Peace be upon you");
/// assert_eq!(shown.len(), 4);
/// # });
/// ```
pub async fn reveal<F>(
    text: &str,
    interval: Duration,
    cancel: &CancellationToken,
    mut on_token: F,
) -> Reveal
where
    F: FnMut(&str),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut revealed = String::with_capacity(text.len());

    for token in tokenize_preserving_whitespace(text) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Reveal { revealed, cancelled: true };
            }
            _ = ticker.tick() => {
                revealed.push_str(token);
                on_token(token);
            }
        }
    }

    Reveal {
        revealed,
        cancelled: false,
    }
}
