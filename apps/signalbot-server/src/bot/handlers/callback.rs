use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{info, warn};

use crate::bot::handlers::payment::{send_checkout, send_verification};
use crate::bot::utils::send_html;
use crate::state::AppState;
use crate::texts;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let tg_id = q.from.id.0 as i64;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(tg_id));
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    match state.users.is_banned(tg_id).await {
        Ok(true) => {
            send_html(&bot, chat_id, texts::banned()).await;
            return Ok(());
        }
        Ok(false) => {}
        Err(e) => warn!("Ban check for {} failed: {}", tg_id, e),
    }

    if let Some(plan) = data.strip_prefix("pay:") {
        send_checkout(&bot, chat_id, &state, tg_id, plan).await;
    } else if let Some(link_id) = data.strip_prefix("verify:") {
        send_verification(&bot, chat_id, &state, tg_id, Some(link_id)).await;
    } else {
        warn!("Unknown callback data {:?} from {}", data, tg_id);
    }

    Ok(())
}
