use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, KeyboardMarkup, ParseMode};
use tracing::error;

/// Splits `/cmd@botname args` into a lower-cased command name and its arguments.
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, args))
}

pub async fn send_html(bot: &Bot, chat_id: ChatId, text: impl Into<String>) {
    if let Err(e) = bot
        .send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html)
        .await
    {
        error!("Failed to send message to {}: {}", chat_id, e);
    }
}

pub async fn send_with_keyboard(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    keyboard: InlineKeyboardMarkup,
) {
    if let Err(e) = bot
        .send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await
    {
        error!("Failed to send message to {}: {}", chat_id, e);
    }
}

pub async fn send_with_menu(bot: &Bot, chat_id: ChatId, text: impl Into<String>, menu: KeyboardMarkup) {
    if let Err(e) = bot
        .send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html)
        .reply_markup(menu)
        .await
    {
        error!("Failed to send message to {}: {}", chat_id, e);
    }
}
