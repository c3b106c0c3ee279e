use teloxide::prelude::*;
use tracing::{info, warn};

use crate::bot::utils::send_html;
use crate::services::broadcast_service::Audience;
use crate::state::AppState;
use crate::texts::{self, escape_html};

pub async fn admin_command(bot: &Bot, chat_id: ChatId, state: &AppState, command: &str, args: &str) {
    match command {
        "broadcast" => broadcast(bot, chat_id, state, args).await,
        "ban" | "unban" => {
            let Ok(tg_id) = args.trim().parse::<i64>() else {
                send_html(bot, chat_id, format!("Usage: /{} &lt;tg_id&gt;", command)).await;
                return;
            };
            let result = if command == "ban" {
                state.admin.ban(tg_id).await
            } else {
                state.admin.unban(tg_id).await
            };
            match result {
                Ok(user) => {
                    let verb = if user.is_banned { "banned" } else { "unbanned" };
                    send_html(
                        bot,
                        chat_id,
                        format!("✅ {} ({}) {}.", escape_html(&user.label()), user.id, verb),
                    )
                    .await;
                }
                Err(e) => send_html(bot, chat_id, format!("❌ {}", escape_html(&e.to_string()))).await,
            }
        }
        "refund" => {
            let link_id = args.trim();
            if link_id.is_empty() {
                send_html(bot, chat_id, "Usage: /refund &lt;link_id&gt;").await;
                return;
            }
            match state.admin.refund(link_id).await {
                Ok(record) => {
                    send_html(
                        bot,
                        chat_id,
                        format!(
                            "✅ Payment <code>{}</code> of user {} marked refunded.",
                            escape_html(&record.link_id),
                            record.user_id
                        ),
                    )
                    .await
                }
                Err(e) => send_html(bot, chat_id, format!("❌ {}", escape_html(&e.to_string()))).await,
            }
        }
        other => warn!("Unhandled admin command {}", other),
    }
}

async fn broadcast(bot: &Bot, chat_id: ChatId, state: &AppState, args: &str) {
    let (audience, message) = match args.split_once(char::is_whitespace) {
        Some((audience, message)) if !message.trim().is_empty() => (audience, message.trim()),
        _ => {
            send_html(
                bot,
                chat_id,
                "Usage: /broadcast &lt;all|active|expired&gt; &lt;message&gt;",
            )
            .await;
            return;
        }
    };
    let audience = match audience.parse::<Audience>() {
        Ok(audience) => audience,
        Err(e) => {
            send_html(bot, chat_id, format!("❌ {}", escape_html(&e))).await;
            return;
        }
    };

    send_html(bot, chat_id, format!("📣 Broadcasting to <b>{}</b>...", audience)).await;

    // Large audiences take a while at the dispatch rate, so report from a task
    let bot = bot.clone();
    let broadcasts = state.broadcasts.clone();
    let message = message.to_string();
    tokio::spawn(async move {
        let reply = match broadcasts.broadcast(audience, &message).await {
            Ok(report) => {
                info!("Admin broadcast finished: {:?}", report);
                format!(
                    "✅ Broadcast done: {} sent, {} failed.",
                    report.succeeded, report.failed
                )
            }
            Err(e) => texts::user_error(&e),
        };
        send_html(&bot, chat_id, reply).await;
    });
}
