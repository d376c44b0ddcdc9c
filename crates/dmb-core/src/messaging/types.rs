use serde::{Deserialize, Serialize};

/// Rich embed as carried by a message.
///
/// Well-known fields are typed; everything else the platform sent (footer,
/// image, thumbnail, author, provider, video, ...) rides along in `extra` so a
/// replayed embed keeps every original field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
    }

    pub fn field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One outgoing message to the archive channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }

    pub fn with_content(content: impl Into<String>, embed: Embed) -> Self {
        Self {
            content: Some(content.into()),
            embeds: vec![embed],
        }
    }
}

/// Platform limits that shape outgoing records.
#[derive(Clone, Copy, Debug)]
pub struct ArchiveLimits {
    pub max_field_value_len: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_field_value_len: 1024,
        }
    }
}
