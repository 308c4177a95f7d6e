//! Notification rendering.

use serde_json::json;

use crate::config::NotifyConfig;
use crate::directory::UserDisplay;
use crate::parser::{FIELD_PLACEHOLDER, FindEvent, parse_rarity_value};
use crate::webhook::RenderedNotification;

/// Avatar shown when the owner's display info cannot be resolved.
pub const DEFAULT_AVATAR_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

/// Whether a find deserves the attention caption.
///
/// True at or above the rarity threshold, or whenever the event's icon is not
/// the ordinary global one.
pub fn is_exceptional(event: &FindEvent, config: &NotifyConfig) -> bool {
    let rarity_value = parse_rarity_value(event.rarity_text.as_deref(), &event.description);
    rarity_value >= config.exceptional_rarity_threshold || event.icon_url != config.global_icon_url
}

/// Build the outgoing notification for a find.
///
/// Display resolution failure degrades to placeholders. Auxiliary fields are
/// included only when the feed actually sent them; the rarity field is added
/// only for rare-format events, ordinary finds already carry it in the
/// description.
pub fn render_notification(
    event: &FindEvent,
    owner_id: u64,
    display: Option<&UserDisplay>,
    config: &NotifyConfig,
) -> RenderedNotification {
    let (mention, footer_name, footer_icon) = match display {
        Some(display) => (
            format!("<@{owner_id}>"),
            display.display_name.clone(),
            display.avatar_url.clone(),
        ),
        None => (
            "Unknown User".to_string(),
            "N/A".to_string(),
            DEFAULT_AVATAR_URL.to_string(),
        ),
    };

    let mut fields = Vec::new();
    if event.rolls != FIELD_PLACEHOLDER {
        fields.push(json!({"name": "Rolls", "value": event.rolls}));
    }
    if event.rare_format
        && let Some(rarity) = &event.rarity_text
    {
        fields.push(json!({"name": "Rarity", "value": rarity}));
    }
    if event.luck != FIELD_PLACEHOLDER {
        fields.push(json!({"name": "Luck", "value": event.luck}));
    }
    if event.discovered_at != FIELD_PLACEHOLDER {
        fields.push(json!({"name": "Time Discovered", "value": event.discovered_at}));
    }

    let embed = json!({
        "description": format!("\n**User**\n{mention}\n\n{}", event.description),
        "color": event.color,
        "timestamp": event.timestamp,
        "author": {
            "name": event.display_name,
            "url": event.profile_url,
            "icon_url": event.icon_url,
        },
        "fields": fields,
        "footer": {
            "text": format!("Found by: {footer_name}"),
            "icon_url": footer_icon,
        },
    });

    let content = is_exceptional(event, config).then(|| config.exceptional_caption.clone());

    RenderedNotification { content, embed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_GLOBAL_ICON_URL;

    fn event() -> FindEvent {
        FindEvent {
            username: "someone".to_string(),
            display_name: "Diami(@Someone)".to_string(),
            icon_url: DEFAULT_GLOBAL_ICON_URL.to_string(),
            profile_url: "https://example.com/profile".to_string(),
            description: "⭐ **Diami(@Someone)** HAS FOUND **Starlight**, CHANCE OF **1 in 1,000** ⭐"
                .to_string(),
            item_name: "Starlight".to_string(),
            rarity_text: None,
            rolls: "123".to_string(),
            luck: "x2".to_string(),
            discovered_at: "12:00".to_string(),
            timestamp: "2024-05-01T12:00:05Z".to_string(),
            color: 0xFFD700,
            rare_format: false,
        }
    }

    fn display() -> UserDisplay {
        UserDisplay {
            display_name: "someone".to_string(),
            avatar_url: "https://example.com/avatar.png".to_string(),
        }
    }

    #[test]
    fn test_render_with_display() {
        let rendered = render_notification(&event(), 42, Some(&display()), &NotifyConfig::default());

        let description = rendered.embed["description"].as_str().unwrap();
        assert!(description.starts_with("\n**User**\n<@42>\n\n"));
        assert!(description.contains("Starlight"));
        assert_eq!(rendered.embed["author"]["name"], "Diami(@Someone)");
        assert_eq!(rendered.embed["footer"]["text"], "Found by: someone");
        assert_eq!(rendered.embed["fields"].as_array().unwrap().len(), 3);
        // Ordinary find with the global icon: no caption.
        assert!(rendered.content.is_none());
    }

    #[test]
    fn test_render_without_display_uses_placeholders() {
        let rendered = render_notification(&event(), 42, None, &NotifyConfig::default());

        assert!(
            rendered.embed["description"]
                .as_str()
                .unwrap()
                .contains("Unknown User")
        );
        assert_eq!(rendered.embed["footer"]["text"], "Found by: N/A");
        assert_eq!(rendered.embed["footer"]["icon_url"], DEFAULT_AVATAR_URL);
    }

    #[test]
    fn test_placeholder_fields_omitted() {
        let mut event = event();
        event.rolls = FIELD_PLACEHOLDER.to_string();
        event.luck = FIELD_PLACEHOLDER.to_string();
        event.discovered_at = FIELD_PLACEHOLDER.to_string();

        let rendered = render_notification(&event, 42, None, &NotifyConfig::default());
        assert!(rendered.embed["fields"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_rarity_field_only_for_rare_format() {
        let mut event = event();
        event.rare_format = true;
        event.rarity_text = Some("1 in 2,000,000,000".to_string());

        let rendered = render_notification(&event, 42, None, &NotifyConfig::default());
        let fields = rendered.embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["name"] == "Rarity"));
    }

    #[test]
    fn test_caption_at_rarity_threshold() {
        let mut event = event();
        event.description =
            "**a** HAS FOUND **Starlight**, CHANCE OF **1 in 750,000,000**".to_string();

        let config = NotifyConfig::default();
        assert!(is_exceptional(&event, &config));
        let rendered = render_notification(&event, 42, None, &config);
        assert_eq!(rendered.content.as_deref(), Some("Good find!"));
    }

    #[test]
    fn test_caption_for_non_global_icon() {
        let mut event = event();
        event.icon_url = "https://cdn.mongoosee.com/assets/stars/Special.png".to_string();
        assert!(is_exceptional(&event, &NotifyConfig::default()));
    }

    #[test]
    fn test_no_caption_below_threshold() {
        assert!(!is_exceptional(&event(), &NotifyConfig::default()));
    }
}
