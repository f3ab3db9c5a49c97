// src/services/format.rs

//! Message text for the delivery channel.
//!
//! Uses Telegram's legacy Markdown; the notifier falls back to plain text
//! when a dish name trips the parser.

use crate::models::{CacheEntry, DayKey, DayVerdict, MealVerdict, Venue, VerdictPayload};

pub const WELCOME: &str = "👋 *Welcome!* I check the Kumoh cafeteria menus for pork every day.\n\
Here is today's verdict:";

pub const HELP: &str = "*Commands*\n\
/today - today's verdict\n\
/tomorrow - tomorrow's verdict\n\
/week - cached status for the rest of the week\n\
/refresh - re-analyze today's menu now\n\
/feedback <text> - report a wrong verdict\n\
/help - this message";

pub const ANALYZING: &str = "⏳ Checking the menu...";

pub const FEEDBACK_USAGE: &str = "Usage: /feedback <what was wrong>";

pub const FEEDBACK_THANKS: &str = "🙏 Thanks, your feedback was recorded.";

/// Reply when no verdict could be produced.
pub fn could_not_analyze(day: &DayKey) -> String {
    format!("⚠️ Could not analyze the menu for {}. Please try again later.", day)
}

/// Full message for one day's verdict.
pub fn day_message(day: &DayKey, payload: &VerdictPayload) -> String {
    match payload.parse() {
        Ok(verdict) => render_day(&verdict),
        Err(e) => {
            log::warn!("Cached verdict for {} has unexpected shape: {}", day, e);
            could_not_analyze(day)
        }
    }
}

fn render_day(verdict: &DayVerdict) -> String {
    let mut message = format!("🍽️ *Kumoh Menu - {}*\n", verdict.day);

    for venue in &verdict.cafeterias {
        message.push_str(&format!("\n🏫 *{}*\n", venue.name()));
        match venue {
            Venue::Package { meals, .. } => {
                for meal in meals {
                    message.push_str(&format!(
                        "{} {}: {}",
                        meal_icon(meal.verdict),
                        meal.time,
                        meal.verdict
                    ));
                    if !meal.main_dish.is_empty() {
                        message.push_str(&format!(" ({})", meal.main_dish));
                    }
                    message.push('\n');
                    if !meal.skip_items.is_empty() {
                        message.push_str(&format!("   skip: {}\n", meal.skip_items.join(", ")));
                    }
                    if !meal.reason.is_empty() && meal.verdict != MealVerdict::None {
                        message.push_str(&format!("   {}\n", meal.reason));
                    }
                }
            }
            Venue::Individual {
                safe_options,
                avoid,
                ..
            } => {
                if safe_options.is_empty() {
                    message.push_str("❌ nothing safe to order\n");
                } else {
                    message.push_str(&format!("✅ {}\n", safe_options.join(", ")));
                }
                if !avoid.is_empty() {
                    message.push_str(&format!("🚫 {}\n", avoid.join(", ")));
                }
            }
        }
    }
    message
}

fn meal_icon(verdict: MealVerdict) -> &'static str {
    match verdict {
        MealVerdict::Safe => "✅",
        MealVerdict::WorthIt => "🟡",
        MealVerdict::NotWorth => "❌",
        MealVerdict::None => "➖",
        MealVerdict::Unknown => "⚠️",
    }
}

/// One status line of the weekly summary.
pub fn week_line(day: &DayKey, entry: Option<&CacheEntry>) -> String {
    let Some(entry) = entry else {
        return format!("• {}: not yet available", day);
    };
    match entry.verdict.parse() {
        Ok(verdict) => {
            let tally = verdict.tally();
            format!(
                "• {}: ✅ {} · 🟡 {} · ❌ {} · à la carte {}",
                day, tally.safe, tally.worth_it, tally.not_worth, tally.individual_options
            )
        }
        Err(_) => format!("• {}: not yet available", day),
    }
}

/// Weekly summary built from per-day lines.
pub fn week_message(lines: &[String]) -> String {
    if lines.is_empty() {
        return "📅 No more menus this week.".to_string();
    }
    format!("📅 *This week*\n{}\n\nUse /today for details.", lines.join("\n"))
}

/// Feedback as forwarded to the admin.
pub fn admin_feedback(chat_id: i64, sender: Option<&str>, text: &str) -> String {
    format!(
        "📝 Feedback from {} (chat {}):\n{}",
        sender.unwrap_or("unknown"),
        chat_id,
        text
    )
}
