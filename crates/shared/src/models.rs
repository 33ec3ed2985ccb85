//! Shared data models for gateway events and REST payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Identity ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialApplication {
    pub id: String,
}

/// Payload of the READY dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ready {
    pub session_id: String,
    pub application: PartialApplication,
    #[serde(default)]
    pub user: Option<User>,
}

// --- Messaging ---

/// A channel message as delivered by MESSAGE_CREATE or the REST API.
///
/// Fields the bot does not interpret are kept in `extra` so handlers still
/// see the full raw message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body for creating or editing a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessagePayload {
    pub content: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl MessagePayload {
    /// Message with a single action row holding `buttons`.
    pub fn with_buttons(content: impl Into<String>, buttons: Vec<Component>) -> Self {
        Self {
            content: content.into(),
            components: vec![Component::action_row(buttons)],
        }
    }
}

// --- Components ---

pub mod component_type {
    pub const ACTION_ROW: u8 = 1;
    pub const BUTTON: u8 = 2;
    pub const TEXT_INPUT: u8 = 4;
}

pub mod button_style {
    pub const PRIMARY: u8 = 1;
    pub const SECONDARY: u8 = 2;
}

pub mod text_input_style {
    pub const SHORT: u8 = 1;
    pub const PARAGRAPH: u8 = 2;
}

/// A message or modal component. Action rows nest their children in
/// `components`; buttons and text inputs are leaves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
}

impl Component {
    pub fn action_row(components: Vec<Component>) -> Self {
        Self {
            kind: component_type::ACTION_ROW,
            components,
            ..Default::default()
        }
    }

    pub fn button(custom_id: &str, label: &str, style: u8) -> Self {
        Self {
            kind: component_type::BUTTON,
            custom_id: Some(custom_id.to_string()),
            label: Some(label.to_string()),
            style: Some(style),
            ..Default::default()
        }
    }

    pub fn text_input(custom_id: &str, label: &str, style: u8) -> Self {
        Self {
            kind: component_type::TEXT_INPUT,
            custom_id: Some(custom_id.to_string()),
            label: Some(label.to_string()),
            style: Some(style),
            ..Default::default()
        }
    }

    /// Depth-first search for a component with `custom_id`.
    pub fn find(&self, custom_id: &str) -> Option<&Component> {
        if self.custom_id.as_deref() == Some(custom_id) {
            return Some(self);
        }
        self.components.iter().find_map(|c| c.find(custom_id))
    }
}

// --- Interactions ---

/// Interaction kinds. Unrecognised kinds are preserved rather than rejected
/// so that new server-side types never fail decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum InteractionType {
    Ping,
    ApplicationCommand,
    MessageComponent,
    ApplicationCommandAutocomplete,
    ModalSubmit,
    Unknown(u8),
}

impl From<u8> for InteractionType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Ping,
            2 => Self::ApplicationCommand,
            3 => Self::MessageComponent,
            4 => Self::ApplicationCommandAutocomplete,
            5 => Self::ModalSubmit,
            other => Self::Unknown(other),
        }
    }
}

impl From<InteractionType> for u8 {
    fn from(value: InteractionType) -> Self {
        match value {
            InteractionType::Ping => 1,
            InteractionType::ApplicationCommand => 2,
            InteractionType::MessageComponent => 3,
            InteractionType::ApplicationCommandAutocomplete => 4,
            InteractionType::ModalSubmit => 5,
            InteractionType::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InteractionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<u8>,
    /// Submitted modal rows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InteractionData {
    /// Value of a submitted text input, looked up by its custom id.
    pub fn text_input_value(&self, custom_id: &str) -> Option<&str> {
        self.components
            .iter()
            .find_map(|c| c.find(custom_id))
            .and_then(|c| c.value.as_deref())
    }
}

/// The interaction context handed to interaction handlers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub token: String,
    /// The message a component was attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Interaction {
    pub fn custom_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.custom_id.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum InteractionCallbackType {
    Pong,
    ChannelMessageWithSource,
    DeferredChannelMessageWithSource,
    DeferredUpdateMessage,
    UpdateMessage,
    ApplicationCommandAutocompleteResult,
    Modal,
    Unknown(u8),
}

impl From<u8> for InteractionCallbackType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Pong,
            4 => Self::ChannelMessageWithSource,
            5 => Self::DeferredChannelMessageWithSource,
            6 => Self::DeferredUpdateMessage,
            7 => Self::UpdateMessage,
            8 => Self::ApplicationCommandAutocompleteResult,
            9 => Self::Modal,
            other => Self::Unknown(other),
        }
    }
}

impl From<InteractionCallbackType> for u8 {
    fn from(value: InteractionCallbackType) -> Self {
        match value {
            InteractionCallbackType::Pong => 1,
            InteractionCallbackType::ChannelMessageWithSource => 4,
            InteractionCallbackType::DeferredChannelMessageWithSource => 5,
            InteractionCallbackType::DeferredUpdateMessage => 6,
            InteractionCallbackType::UpdateMessage => 7,
            InteractionCallbackType::ApplicationCommandAutocompleteResult => 8,
            InteractionCallbackType::Modal => 9,
            InteractionCallbackType::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModalPayload {
    pub title: String,
    pub custom_id: String,
    pub components: Vec<Component>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CallbackData {
    Message(MessagePayload),
    Modal(ModalPayload),
}

/// Body of an interaction callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionCallbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CallbackData>,
}

impl InteractionResponse {
    pub fn update_message(payload: MessagePayload) -> Self {
        Self {
            kind: InteractionCallbackType::UpdateMessage,
            data: Some(CallbackData::Message(payload)),
        }
    }

    pub fn modal(modal: ModalPayload) -> Self {
        Self {
            kind: InteractionCallbackType::Modal,
            data: Some(CallbackData::Modal(modal)),
        }
    }
}

// --- Application commands ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_command_type")]
    pub kind: u8,
}

fn default_command_type() -> u8 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_keeps_unknown_fields() {
        let raw = json!({
            "id": "1",
            "channel_id": "2",
            "content": "!todo buy milk",
            "timestamp": "2024-03-01T12:00:00.000000+00:00",
            "tts": false,
            "nonce": "abc"
        });
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.content, "!todo buy milk");
        assert_eq!(msg.extra.get("nonce"), Some(&json!("abc")));
        assert!(msg.timestamp.is_some());
    }

    #[test]
    fn interaction_type_preserves_unknown_values() {
        let kind: InteractionType = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(kind, InteractionType::Unknown(42));
        assert_eq!(serde_json::to_value(kind).unwrap(), json!(42));
    }

    #[test]
    fn modal_submission_exposes_text_input_value() {
        let raw = json!({
            "custom_id": "edit_modal",
            "components": [{
                "type": 1,
                "components": [{"type": 4, "custom_id": "edit_modal_text", "value": "walk dog"}]
            }]
        });
        let data: InteractionData = serde_json::from_value(raw).unwrap();
        assert_eq!(data.text_input_value("edit_modal_text"), Some("walk dog"));
        assert_eq!(data.text_input_value("missing"), None);
    }

    #[test]
    fn update_message_response_serializes_flat() {
        let payload = MessagePayload::with_buttons(
            "☐ | milk",
            vec![Component::button("done", "✔️", button_style::SECONDARY)],
        );
        let value = serde_json::to_value(InteractionResponse::update_message(payload)).unwrap();
        assert_eq!(value["type"], json!(7));
        assert_eq!(value["data"]["content"], json!("☐ | milk"));
        assert_eq!(value["data"]["components"][0]["type"], json!(1));
        assert_eq!(
            value["data"]["components"][0]["components"][0]["custom_id"],
            json!("done")
        );
    }
}
