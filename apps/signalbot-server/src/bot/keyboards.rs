use reqwest::Url;
use signalbot_db::models::PaymentRecord;
use signalbot_shared::PlanCatalog;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

pub const MENU_PLANS: &str = "💎 Plans";
pub const MENU_STATUS: &str = "📊 My Subscription";
pub const MENU_HELP: &str = "❓ Help";

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(MENU_PLANS), KeyboardButton::new(MENU_STATUS)],
        vec![KeyboardButton::new(MENU_HELP)],
    ])
    .resize_keyboard()
}

/// Maps a main-menu button press to the command it stands for.
pub fn menu_command(text: &str) -> Option<&'static str> {
    match text {
        MENU_PLANS => Some("plans"),
        MENU_STATUS => Some("status"),
        MENU_HELP => Some("help"),
        _ => None,
    }
}

pub fn plans_keyboard(catalog: &PlanCatalog) -> InlineKeyboardMarkup {
    let rows = catalog
        .plans()
        .iter()
        .map(|plan| {
            vec![InlineKeyboardButton::callback(
                format!(
                    "{} · {} / {} days",
                    plan.name,
                    plan.price_display(),
                    plan.duration_days()
                ),
                format!("pay:{}", plan.id),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn payment_keyboard(record: &PaymentRecord) -> InlineKeyboardMarkup {
    let mut row = Vec::new();
    if let Some(url) = record.short_url.as_deref().and_then(|u| Url::parse(u).ok()) {
        row.push(InlineKeyboardButton::url("💳 Pay now", url));
    }
    row.push(InlineKeyboardButton::callback(
        "✅ I have paid",
        format!("verify:{}", record.link_id),
    ));
    InlineKeyboardMarkup::new(vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_buttons_map_to_commands() {
        assert_eq!(menu_command(MENU_PLANS), Some("plans"));
        assert_eq!(menu_command("💎 plans"), None);
    }

    #[test]
    fn one_button_per_plan() {
        let catalog = PlanCatalog::default();
        let keyboard = plans_keyboard(&catalog);
        assert_eq!(keyboard.inline_keyboard.len(), catalog.plans().len());
    }
}
