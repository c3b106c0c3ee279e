use teloxide::prelude::*;
use tracing::{error, info};

use crate::bot::handlers::admin::admin_command;
use crate::bot::handlers::payment::{send_checkout, send_verification};
use crate::bot::keyboards::{main_menu, menu_command, plans_keyboard};
use crate::bot::utils::{parse_command, send_html, send_with_keyboard, send_with_menu};
use crate::state::AppState;
use crate::texts;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let tg_id = msg
        .from
        .as_ref()
        .map(|u| u.id.0 as i64)
        .unwrap_or(chat_id.0);
    let full_name = msg.from.as_ref().map(|u| u.full_name());

    // Every message refreshes name and chat
    let user = match state.users.touch(tg_id, full_name.as_deref(), chat_id.0).await {
        Ok(user) => Some(user),
        Err(e) => {
            error!("Failed to upsert user {}: {}", tg_id, e);
            None
        }
    };
    if user.as_ref().is_some_and(|u| u.is_banned) {
        send_html(&bot, chat_id, texts::banned()).await;
        return Ok(());
    }

    let (command, args) = match parse_command(text) {
        Some((command, args)) => (command, args),
        None => match menu_command(text.trim()) {
            Some(command) => (command.to_string(), ""),
            None => return Ok(()),
        },
    };
    info!("Command /{} from {}", command, tg_id);

    match command.as_str() {
        "start" => {
            let name = user
                .as_ref()
                .map(|u| u.label())
                .unwrap_or_else(|| "trader".to_string());
            send_with_menu(&bot, chat_id, texts::welcome(&name, &state.catalog), main_menu()).await;
            send_with_keyboard(
                &bot,
                chat_id,
                "👇 Choose a plan:",
                plans_keyboard(&state.catalog),
            )
            .await;
        }
        "help" => send_html(&bot, chat_id, texts::help(state.is_admin(tg_id))).await,
        "plans" => {
            send_with_keyboard(
                &bot,
                chat_id,
                texts::plan_list(&state.catalog),
                plans_keyboard(&state.catalog),
            )
            .await;
        }
        "pay" => send_checkout(&bot, chat_id, &state, tg_id, args).await,
        "verify" => send_verification(&bot, chat_id, &state, tg_id, Some(args)).await,
        "status" => {
            let reply = match (
                state.subscriptions.status_of(tg_id).await,
                state.subscriptions.history(tg_id).await,
            ) {
                (Ok(status), Ok(history)) => texts::status(&status, &history),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Status lookup for {} failed: {}", tg_id, e);
                    texts::user_error(&e)
                }
            };
            send_html(&bot, chat_id, reply).await;
        }
        "cancel" => match state.subscriptions.cancel(tg_id).await {
            Ok(_) => send_html(&bot, chat_id, texts::cancelled()).await,
            Err(e) => send_html(&bot, chat_id, texts::user_error(&e)).await,
        },
        "broadcast" | "ban" | "unban" | "refund" => {
            if state.is_admin(tg_id) {
                admin_command(&bot, chat_id, &state, &command, args).await;
            } else {
                send_html(&bot, chat_id, texts::admin_only()).await;
            }
        }
        _ => send_html(&bot, chat_id, "🤔 Unknown command. Send /help for the list.").await,
    }

    Ok(())
}
