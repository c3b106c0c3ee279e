use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::bot::keyboards::{payment_keyboard, plans_keyboard};
use crate::bot::utils::{send_html, send_with_keyboard};
use crate::services::payment_service::LinkVerification;
use crate::services::subscription_service::SubscriptionStatus;
use crate::state::AppState;
use crate::texts;

/// `/pay <plan>` and the plan buttons.
pub async fn send_checkout(bot: &Bot, chat_id: ChatId, state: &AppState, tg_id: i64, plan: &str) {
    if plan.trim().is_empty() {
        send_with_keyboard(
            bot,
            chat_id,
            texts::plan_list(&state.catalog),
            plans_keyboard(&state.catalog),
        )
        .await;
        return;
    }

    match state.payments.start_checkout(tg_id, plan).await {
        Ok(record) => {
            info!("Checkout {} started by {}", record.link_id, tg_id);
            let plan = match state.catalog.lookup(&record.plan_id) {
                Ok(plan) => plan,
                Err(e) => {
                    send_html(bot, chat_id, texts::user_error(&e.into())).await;
                    return;
                }
            };
            send_with_keyboard(
                bot,
                chat_id,
                texts::payment_link(plan, &record),
                payment_keyboard(&record),
            )
            .await;
        }
        Err(e) => {
            warn!("Checkout for {} ({}) failed: {}", tg_id, plan, e);
            send_html(bot, chat_id, texts::user_error(&e)).await;
        }
    }
}

/// `/verify [link]` and the "I have paid" button. Without a link id the
/// user's newest unpaid link is checked.
pub async fn send_verification(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    tg_id: i64,
    link_id: Option<&str>,
) {
    let record = match link_id.map(str::trim).filter(|l| !l.is_empty()) {
        Some(link_id) => state.payments.get(link_id).await,
        None => state.payments.latest_pending_for_user(tg_id).await,
    };
    let record = match record {
        Ok(Some(record)) if record.user_id == tg_id || state.is_admin(tg_id) => record,
        Ok(_) => {
            send_html(bot, chat_id, texts::unknown_link()).await;
            return;
        }
        Err(e) => {
            error!("Payment lookup for {} failed: {}", tg_id, e);
            send_html(bot, chat_id, texts::user_error(&e)).await;
            return;
        }
    };

    match state.payments.verify_link(&record.link_id).await {
        Ok(LinkVerification::Paid(record)) => {
            match state.subscriptions.status_of(record.user_id).await {
                Ok(SubscriptionStatus::Active { until }) => {
                    send_html(bot, chat_id, texts::already_active(until)).await
                }
                Ok(SubscriptionStatus::Unsubscribed) => {
                    send_html(bot, chat_id, texts::status(&SubscriptionStatus::Unsubscribed, &[])).await
                }
                Err(e) => send_html(bot, chat_id, texts::user_error(&e)).await,
            }
        }
        Ok(LinkVerification::NotYetPaid) => send_html(bot, chat_id, texts::not_yet_paid()).await,
        Ok(LinkVerification::Unknown) => send_html(bot, chat_id, texts::unknown_link()).await,
        Ok(LinkVerification::Failed(record)) => {
            send_html(bot, chat_id, texts::payment_failed(&record.link_id)).await
        }
        Err(e) => {
            warn!("Verification of {} failed: {}", record.link_id, e);
            send_html(bot, chat_id, texts::user_error(&e)).await;
        }
    }
}
