use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
}

impl HighlightColor {
    pub const ALL: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Orange,
    ];

    pub fn hex(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "#ffeb3b",
            HighlightColor::Green => "#a5d6a7",
            HighlightColor::Blue => "#90caf9",
            HighlightColor::Pink => "#f48fb1",
            HighlightColor::Orange => "#ffcc80",
        }
    }

    /// Accepts a palette hex value or a palette name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|color| {
            color.hex().eq_ignore_ascii_case(value) || color.name().eq_ignore_ascii_case(value)
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Orange => "orange",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRecord {
    pub id: String,
    pub url: String,
    pub text: String,
    #[serde(default)]
    pub note: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub xpath: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl HighlightRecord {
    pub fn new(input: CreateHighlight) -> Self {
        HighlightRecord {
            id: Uuid::new_v4().to_string(),
            url: input.url,
            text: input.text,
            note: input.note,
            start_offset: input.start_offset,
            end_offset: input.end_offset,
            xpath: input.xpath,
            timestamp: chrono::Utc::now().timestamp_millis(),
            color: input.color,
        }
    }

    /// Stored color, or the default palette color when none was recorded.
    pub fn color(&self) -> &str {
        self.color
            .as_deref()
            .unwrap_or(HighlightColor::default().hex())
    }

    /// Shallow merge of the editable fields. Returns true when anything
    /// changed.
    pub fn apply(&mut self, update: &UpdateHighlight) -> bool {
        let mut changed = false;
        if let Some(note) = &update.note {
            changed |= self.note != *note;
            self.note = note.clone();
        }
        if let Some(color) = &update.color {
            changed |= self.color.as_deref() != Some(color.as_str());
            self.color = Some(color.clone());
        }
        changed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHighlight {
    pub url: String,
    pub text: String,
    #[serde(default)]
    pub note: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub xpath: String,
    pub color: Option<String>,
}

impl CreateHighlight {
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("url must not be empty".to_string());
        }
        if self.end_offset <= self.start_offset {
            return Err(format!(
                "endOffset ({}) must be greater than startOffset ({})",
                self.end_offset, self.start_offset
            ));
        }
        if self.xpath.parse::<crate::address::StructuralAddress>().is_err() {
            return Err(format!("xpath is not a structural address: {}", self.xpath));
        }
        validate_color(self.color.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateHighlight {
    pub note: Option<String>,
    pub color: Option<String>,
}

impl UpdateHighlight {
    pub fn validate(&self) -> Result<(), String> {
        validate_color(self.color.as_deref())
    }
}

fn validate_color(color: Option<&str>) -> Result<(), String> {
    match color {
        Some(c) if HighlightColor::parse(c).is_none() => {
            Err(format!("color {} is not in the palette", c))
        }
        _ => Ok(()),
    }
}
