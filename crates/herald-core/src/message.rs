//! Announcement text rendering.
//!
//! Turns an [`Announcement`] into Discord-flavoured markdown: bold names,
//! markdown links to place pages, `<t:unix:R>` relative timestamps and an
//! optional `<@&role>` mention. The reconciliation logic never inspects
//! the rendered text.

use chrono::DateTime;

use crate::config::MessageStyle;
use crate::detect::Announcement;

/// Label used for a place whose listing entry carried no name.
pub const UNNAMED_PLACE: &str = "Unnamed place";

/// Render `announcement` for the game labelled `game_name`.
pub fn render(announcement: &Announcement, game_name: &str, style: &MessageStyle) -> String {
    let body = match announcement {
        Announcement::Milestone { milestone } => format!(
            "🎉 **{game_name}** has reached **{}** visits!",
            group_thousands(*milestone)
        ),
        Announcement::NewPlaces { places } => {
            let noun = if places.len() == 1 { "place" } else { "places" };
            let base = style.place_url_base.trim_end_matches('/');
            let header = format!("🆕 **{game_name}** has {} new {noun}:", places.len());
            let lines = places.iter().map(|place| {
                let name = place
                    .name
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(UNNAMED_PLACE);
                format!("- [{name}]({base}/{})", place.id)
            });
            std::iter::once(header)
                .chain(lines)
                .collect::<Vec<_>>()
                .join("\n")
        }
        Announcement::Updated { updated_at } => format!(
            "🛠️ **{game_name}** was updated {}!",
            relative_time(updated_at)
        ),
    };

    match &style.role_id {
        Some(role_id) => format!("<@&{role_id}> {body}"),
        None => body,
    }
}

/// Format `value` with `,` between groups of three digits.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len().saturating_add(digits.len() / 3));
    let lead = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && i % 3 == lead {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Render an "updated" token as a Discord relative timestamp.
///
/// Tokens that are not RFC 3339 fall back to the raw token in backticks.
pub fn relative_time(token: &str) -> String {
    DateTime::parse_from_rfc3339(token).map_or_else(
        |_| format!("at `{token}`"),
        |parsed| format!("<t:{}:R>", parsed.timestamp()),
    )
}
