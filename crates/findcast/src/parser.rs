//! Feed payload parsing.
//!
//! The feed announces finds as batches of Discord-style embed blocks in two
//! encodings: ordinary finds inline the rarity inside the bold-marked
//! description, rare finds carry it in a dedicated `Rarity` field. A broken
//! block never fails the batch; it is recorded as a diagnostic and skipped.

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Value used for auxiliary fields the feed did not send.
pub const FIELD_PLACEHOLDER: &str = "?";

/// Item label used when a rare-format description defies extraction.
const RARE_FALLBACK_LABEL: &str = "Rare Find";

/// Marker distinguishing ordinary descriptions ("... CHANCE OF **1 in N**").
const INLINE_RARITY_MARKER: &str = "CHANCE";

/// Captures the username inside "DisplayName(@username)".
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());

/// Captures a bracketed item label inside a rare-format description.
static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());

/// One structured find decoded from an embed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindEvent {
    /// Normalized (lower-cased, `@`-stripped) username the find belongs to.
    pub username: String,
    /// Author line exactly as the feed sent it.
    pub display_name: String,
    pub icon_url: String,
    pub profile_url: String,
    pub description: String,
    /// What was found.
    pub item_name: String,
    /// Dedicated rarity text; only rare-format events carry one, ordinary
    /// events keep the rarity inside the description.
    pub rarity_text: Option<String>,
    pub rolls: String,
    pub luck: String,
    /// "Time Discovered" field text.
    pub discovered_at: String,
    /// Opaque feed timestamp, passed through to the rendered embed.
    pub timestamp: String,
    pub color: u32,
    /// True when the rarity travels in a dedicated field instead of the
    /// description.
    pub rare_format: bool,
}

/// Result of decoding one raw payload.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub events: Vec<FindEvent>,
    pub errors: Vec<String>,
}

/// Decodes raw feed frames into [`FindEvent`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadParser;

impl PayloadParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw frame. Structural failure yields zero events and one batch
    /// error; a malformed individual block is skipped with a diagnostic that
    /// includes a truncated preview of the offending block.
    pub fn parse(&self, raw: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        let payload: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                outcome.errors.push(format!("invalid JSON: {e}"));
                return outcome;
            }
        };

        let Some(blocks) = payload
            .get("data")
            .and_then(|data| data.get("embeds"))
            .and_then(Value::as_array)
        else {
            outcome
                .errors
                .push("missing payload structure: no data.embeds array".to_string());
            return outcome;
        };

        for (index, block) in blocks.iter().enumerate() {
            match self.parse_block(block) {
                Ok(event) => outcome.events.push(event),
                Err(e) => {
                    let preview = truncate(&block.to_string(), 500);
                    outcome.errors.push(format!("embed {index}: {e}; raw: {preview}"));
                }
            }
        }

        outcome
    }

    fn parse_block(&self, block: &Value) -> Result<FindEvent> {
        let author = block
            .get("author")
            .ok_or_else(|| RelayError::parse("missing author block"))?;
        let display_name = author
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RelayError::parse("missing author name"))?
            .to_string();

        let username = self.extract_username(&display_name);
        let description = str_field(block, "description");

        // Field lookup by lower-cased name.
        let mut fields: FxHashMap<String, String> = FxHashMap::default();
        if let Some(raw_fields) = block.get("fields").and_then(Value::as_array) {
            for field in raw_fields {
                let name = str_field(field, "name").to_lowercase();
                let value = field
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or(FIELD_PLACEHOLDER)
                    .to_string();
                fields.insert(name, value);
            }
        }

        let has_rarity_field = fields.contains_key("rarity");
        let rare_format =
            has_rarity_field || !description.to_uppercase().contains(INLINE_RARITY_MARKER);

        let (item_name, rarity_text) = if rare_format {
            (extract_item_rare(&description), fields.get("rarity").cloned())
        } else {
            let (item, _) = extract_item_rarity_inline(&description)?;
            (item, None)
        };

        let aux = |key: &str| {
            fields
                .get(key)
                .cloned()
                .unwrap_or_else(|| FIELD_PLACEHOLDER.to_string())
        };
        let discovered_at = fields
            .get("time discovered")
            .or_else(|| fields.get("time"))
            .cloned()
            .unwrap_or_else(|| FIELD_PLACEHOLDER.to_string());

        Ok(FindEvent {
            username,
            icon_url: str_field(author, "icon_url"),
            profile_url: str_field(author, "url"),
            display_name,
            item_name,
            rarity_text,
            rolls: aux("rolls"),
            luck: aux("luck"),
            discovered_at,
            timestamp: str_field(block, "timestamp"),
            color: block.get("color").and_then(Value::as_u64).unwrap_or(0) as u32,
            rare_format,
            description,
        })
    }

    /// Extract the tracked username from an author line.
    ///
    /// The feed formats authors as `"DisplayName(@username)"` (sometimes
    /// without the `@`). Falls back to the whole line when there is no
    /// parenthesized group. Always lower-cased.
    pub fn extract_username(&self, author_name: &str) -> String {
        let name = USERNAME_RE
            .captures(author_name)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| author_name.to_string());
        name.replace('@', "").to_lowercase()
    }
}

/// Extract item label and rarity text from an ordinary description.
///
/// Ordinary finds read `"... HAS FOUND **Item**, CHANCE OF **1 in N** ..."`:
/// splitting on `**` puts the item at segment 4 and the rarity at segment 6.
/// Fewer segments fail this event only.
pub fn extract_item_rarity_inline(description: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = description.split("**").collect();
    if parts.len() < 6 {
        return Err(RelayError::parse(format!(
            "expected 6+ bold segments, got {}",
            parts.len()
        )));
    }
    let item = parts[3].to_string();
    let rarity = parts[5].strip_prefix("1 in ").unwrap_or(parts[5]).to_string();
    Ok((item, rarity))
}

/// Best-effort item extraction for rare-format descriptions.
///
/// Rare announcements are inconsistent, so this tries a bracketed label
/// first, then the first bold segment that is not the mention or a rarity
/// figure, and finally a fixed fallback. Never fails.
pub fn extract_item_rare(description: &str) -> String {
    if let Some(caps) = BRACKET_RE.captures(description) {
        return caps[1].to_string();
    }

    for part in description.split("**").skip(1) {
        let part = part.trim();
        if part.is_empty()
            || part.contains('@')
            || part.starts_with("1 in")
            || part.starts_with('>')
        {
            continue;
        }
        // The player name repeated, e.g. "Diami(@Someone)".
        if part.contains('(') && part.contains(')') {
            continue;
        }
        return part.to_string();
    }

    RARE_FALLBACK_LABEL.to_string()
}

/// Convert rarity text to its numeric value, tolerating thousands separators
/// and a literal `1 in` prefix.
///
/// When no dedicated text exists the number is recovered from the
/// description's `1 IN <N>` phrase. Anything unparseable degrades to 0 so
/// rarity comparisons treat the find as ordinary.
pub fn parse_rarity_value(rarity_text: Option<&str>, description: &str) -> u64 {
    let text = match rarity_text {
        Some(text) => text.to_string(),
        None => {
            let upper = description.to_uppercase();
            match upper.rsplit_once("1 IN ") {
                Some((_, rest)) => rest
                    .split("**")
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string(),
                None => return 0,
            }
        }
    };

    let cleaned = text.replace([',', ' '], "").to_lowercase();
    let cleaned = cleaned.strip_prefix("1in").unwrap_or(&cleaned);
    cleaned.parse().unwrap_or(0)
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Cut a diagnostic preview at a char boundary.
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    }
}
