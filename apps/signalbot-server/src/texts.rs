//! User-facing message templates. All of them are Telegram HTML.

use chrono::{DateTime, Utc};
use signalbot_db::models::{PaymentRecord, SubscriptionPeriod};
use signalbot_shared::{Plan, PlanCatalog, format_amount};

use crate::error::BillingError;
use crate::services::subscription_service::SubscriptionStatus;

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn date(ts: DateTime<Utc>) -> String {
    ts.format("%d %b %Y, %H:%M UTC").to_string()
}

pub fn welcome(name: &str, catalog: &PlanCatalog) -> String {
    format!(
        "👋 Welcome, <b>{}</b>!\n\n\
         Get premium trading signals delivered straight to this chat.\n\n{}\n\n\
         Pick a plan below or send /help to see all commands.",
        escape_html(name),
        plan_list(catalog)
    )
}

pub fn help(is_admin: bool) -> String {
    let mut text = String::from(
        "📖 <b>Commands</b>\n\n\
         /plans - list subscription plans\n\
         /pay &lt;plan&gt; - get a payment link\n\
         /verify [link] - check a payment you made\n\
         /status - show your subscription\n\
         /cancel - stop your subscription",
    );
    if is_admin {
        text.push_str(
            "\n\n🛠 <b>Admin</b>\n\
             /broadcast &lt;all|active|expired&gt; &lt;message&gt;\n\
             /ban &lt;tg_id&gt;\n\
             /unban &lt;tg_id&gt;\n\
             /refund &lt;link_id&gt;",
        );
    }
    text
}

pub fn plan_line(plan: &Plan) -> String {
    format!(
        "• <b>{}</b>: {} for {} days",
        escape_html(&plan.name),
        plan.price_display(),
        plan.duration_days()
    )
}

pub fn plan_list(catalog: &PlanCatalog) -> String {
    let lines: Vec<String> = catalog.plans().iter().map(plan_line).collect();
    format!("💎 <b>Plans</b>\n{}", lines.join("\n"))
}

pub fn payment_link(plan: &Plan, record: &PaymentRecord) -> String {
    let url = record.short_url.as_deref().unwrap_or("");
    format!(
        "💳 <b>{}</b> plan, {}\n\n\
         Pay here: {}\n\n\
         Your subscription starts as soon as the payment is confirmed. \
         If nothing happens a minute after paying, press <b>I have paid</b> or send \
         <code>/verify {}</code>.",
        escape_html(&plan.name),
        format_amount(record.amount),
        escape_html(url),
        escape_html(&record.link_id)
    )
}

pub fn subscription_activated(plan: &Plan, until: DateTime<Utc>) -> String {
    format!(
        "✅ Payment received for <b>{}</b>.\n\nYour subscription is active until <b>{}</b>.",
        escape_html(&plan.name),
        date(until)
    )
}

pub fn status(status: &SubscriptionStatus, history: &[SubscriptionPeriod]) -> String {
    let head = match status {
        SubscriptionStatus::Active { until } => {
            format!("🟢 Subscribed until <b>{}</b>.", date(*until))
        }
        SubscriptionStatus::Unsubscribed => {
            "⚪️ You have no active subscription. See /plans.".to_string()
        }
    };
    if history.is_empty() {
        return head;
    }

    let recent: Vec<String> = history
        .iter()
        .rev()
        .take(5)
        .map(|p| {
            format!(
                "• {} {} → {}{}",
                escape_html(&p.plan_id),
                p.starts_at.format("%d %b %Y"),
                p.ends_at.format("%d %b %Y"),
                if p.active { "" } else { " (ended)" }
            )
        })
        .collect();
    format!("{}\n\n<b>History</b>\n{}", head, recent.join("\n"))
}

pub fn not_yet_paid() -> &'static str {
    "⏳ We have not received this payment yet. Try again in a minute."
}

pub fn payment_failed(link_id: &str) -> String {
    format!(
        "❌ Payment link <code>{}</code> was cancelled or expired. Use /plans to get a new one.",
        escape_html(link_id)
    )
}

pub fn unknown_link() -> &'static str {
    "🤷 I don't know that payment link. Use /plans to start a new payment."
}

pub fn already_active(until: DateTime<Utc>) -> String {
    format!(
        "✅ This payment is already applied. Subscribed until <b>{}</b>.",
        date(until)
    )
}

pub fn cancelled() -> &'static str {
    "🛑 Your subscription has been cancelled. Payments are not refunded automatically."
}

pub fn banned() -> &'static str {
    "🚫 <b>Access denied.</b> Your account has been banned."
}

pub fn admin_only() -> &'static str {
    "⛔️ This command is for the administrator only."
}

pub fn refunded(link_id: &str, until: Option<DateTime<Utc>>) -> String {
    let access = match until {
        Some(until) => format!("Remaining access ends <b>{}</b>.", date(until)),
        None => "You no longer have an active subscription.".to_string(),
    };
    format!(
        "💸 Payment <code>{}</code> was refunded. {}",
        escape_html(link_id),
        access
    )
}

pub fn operator_alert(context: &str, err: &BillingError) -> String {
    format!(
        "🚨 <b>Billing alert</b>\n\n{}\n<code>{}</code>",
        escape_html(context),
        escape_html(&err.to_string())
    )
}

/// Reply shown to the user when a billing operation fails.
pub fn user_error(err: &BillingError) -> String {
    match err {
        BillingError::InvalidPlan(plan) => format!(
            "❓ Unknown plan <code>{}</code>. Use /plans to see what is available.",
            escape_html(plan)
        ),
        BillingError::NotFound(_) => unknown_link().to_string(),
        BillingError::Gateway(_) => {
            "⚠️ The payment provider is not responding. Please try again later.".to_string()
        }
        BillingError::AmountMismatch { .. }
        | BillingError::UnknownPlan(_)
        | BillingError::NotesMismatch(_) => {
            "⚠️ There is a problem with this payment. The administrator has been notified."
                .to_string()
        }
        _ => "⚠️ Something went wrong. Please try again later.".to_string(),
    }
}
