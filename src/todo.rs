//! The todo list: a `!todo` command posting checkable items, and the button
//! and modal handlers that toggle, edit and delete them.

use std::sync::Arc;

use anyhow::Context;
use distodo_client::{spawn_purge, ApiClient, Gateway};
use distodo_shared::{
    button_style, text_input_style, Component, Interaction, InteractionResponse, Message,
    MessagePayload, ModalPayload,
};
use tracing::{debug, info, warn};

pub const TODO: char = '☐';
pub const DONE: char = '☒';
pub const SEPARATOR: &str = " | ";

pub const DONE_ID: &str = "done";
pub const UNDO_ID: &str = "undo";
pub const EDIT_ID: &str = "edit";
pub const DELETE_ID: &str = "delete";
pub const EDIT_MODAL_ID: &str = "edit_modal";
pub const EDIT_MODAL_TEXT_ID: &str = "edit_modal_text";

const MAX_TODO_LENGTH: u16 = 4000;

/// One todo line as rendered in a message: `☐ | text` or `☒ | ~~text~~`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    pub text: String,
    pub done: bool,
}

impl TodoItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    pub fn parse(content: &str) -> Option<Self> {
        let mut chars = content.chars();
        let marker = chars.next()?;
        let rest = chars.as_str().strip_prefix(SEPARATOR)?;
        match marker {
            TODO => Some(Self::new(rest)),
            DONE => {
                let text = rest
                    .strip_prefix("~~")
                    .and_then(|t| t.strip_suffix("~~"))
                    .unwrap_or(rest);
                Some(Self {
                    text: text.to_string(),
                    done: true,
                })
            }
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        if self.done {
            format!("{DONE}{SEPARATOR}~~{}~~", self.text)
        } else {
            format!("{TODO}{SEPARATOR}{}", self.text)
        }
    }

    pub fn buttons(&self) -> Vec<Component> {
        let button = |id: &str, label: &str| Component::button(id, label, button_style::SECONDARY);
        if self.done {
            vec![button(UNDO_ID, "↩️"), button(DELETE_ID, "❌")]
        } else {
            vec![
                button(DONE_ID, "✔️"),
                button(EDIT_ID, "✏️"),
                button(DELETE_ID, "❌"),
            ]
        }
    }

    pub fn payload(&self) -> MessagePayload {
        MessagePayload::with_buttons(self.render(), self.buttons())
    }

    /// Modal with the current text prefilled.
    pub fn edit_modal(&self) -> ModalPayload {
        let mut input = Component::text_input(
            EDIT_MODAL_TEXT_ID,
            "Insert TODO here.",
            text_input_style::PARAGRAPH,
        );
        input.value = Some(self.text.clone());
        input.placeholder = Some("TODO".into());
        input.min_length = Some(1);
        input.max_length = Some(MAX_TODO_LENGTH);
        input.required = Some(true);

        ModalPayload {
            title: "Edit TODO.".into(),
            custom_id: EDIT_MODAL_ID.into(),
            components: vec![Component::action_row(vec![input])],
        }
    }
}

fn source_message(interaction: &Interaction) -> anyhow::Result<&Message> {
    interaction
        .message
        .as_ref()
        .context("interaction carries no message")
}

fn todo_from(interaction: &Interaction) -> anyhow::Result<TodoItem> {
    let message = source_message(interaction)?;
    TodoItem::parse(&message.content)
        .with_context(|| format!("message {} is not a todo", message.id))
}

/// `!todo <text>`: replace the command message with a fresh todo.
pub async fn create_todo(
    api: Arc<ApiClient>,
    message: Message,
    args: Option<String>,
) -> anyhow::Result<()> {
    let Some(text) = args else {
        debug!("!todo without text, ignoring");
        return Ok(());
    };
    api.delete_message(&message.channel_id, &message.id)
        .await
        .context("deleting command message")?;
    api.create_message(&message.channel_id, &TodoItem::new(text).payload())
        .await
        .context("posting todo")?;
    Ok(())
}

async fn set_done(api: &ApiClient, interaction: Interaction, done: bool) -> anyhow::Result<()> {
    let mut item = todo_from(&interaction)?;
    item.done = done;
    let response = InteractionResponse::update_message(item.payload());
    api.create_interaction_response(&interaction, &response)
        .await
        .context("updating todo")?;
    Ok(())
}

pub async fn mark_done(api: Arc<ApiClient>, interaction: Interaction) -> anyhow::Result<()> {
    set_done(&api, interaction, true).await
}

pub async fn mark_undone(api: Arc<ApiClient>, interaction: Interaction) -> anyhow::Result<()> {
    set_done(&api, interaction, false).await
}

pub async fn delete_todo(api: Arc<ApiClient>, interaction: Interaction) -> anyhow::Result<()> {
    let message = source_message(&interaction)?;
    let channel_id = interaction
        .channel_id
        .as_deref()
        .unwrap_or(&message.channel_id);
    api.delete_message(channel_id, &message.id)
        .await
        .context("deleting todo")?;
    Ok(())
}

pub async fn open_edit_modal(api: Arc<ApiClient>, interaction: Interaction) -> anyhow::Result<()> {
    let item = todo_from(&interaction)?;
    api.create_interaction_response(&interaction, &InteractionResponse::modal(item.edit_modal()))
        .await
        .context("opening edit modal")?;
    Ok(())
}

/// Modal submission: the edited todo starts unchecked again.
pub async fn submit_edit(api: Arc<ApiClient>, interaction: Interaction) -> anyhow::Result<()> {
    let text = interaction
        .data
        .as_ref()
        .and_then(|data| data.text_input_value(EDIT_MODAL_TEXT_ID))
        .context("modal submission without text")?;
    let item = TodoItem::new(text);
    let response = InteractionResponse::update_message(item.payload());
    api.create_interaction_response(&interaction, &response)
        .await
        .context("saving edited todo")?;
    Ok(())
}

/// `!purge`: delete the channel's whole history in the background.
pub async fn purge_channel(
    api: Arc<ApiClient>,
    message: Message,
    _args: Option<String>,
) -> anyhow::Result<()> {
    let messages = api
        .get_all_channel_messages(&message.channel_id)
        .await
        .context("fetching channel history")?;
    let channel_id = message.channel_id;
    let handle = spawn_purge(api, channel_id.clone(), &messages);
    tokio::spawn(async move {
        let summary = handle.wait().await;
        if summary.failures.is_empty() {
            info!(channel_id = %channel_id, deleted = summary.deleted, "Purge finished");
        } else {
            warn!(
                channel_id = %channel_id,
                deleted = summary.deleted,
                failed = summary.failures.len(),
                "Purge finished with failures"
            );
        }
    });
    Ok(())
}

/// Wire every todo command and interaction into `gateway`.
pub fn register(gateway: &mut Gateway, api: Arc<ApiClient>) {
    let a = api.clone();
    gateway.register_command('!', "todo", move |message: Message, args: Option<String>| {
        create_todo(a.clone(), message, args)
    });
    let a = api.clone();
    gateway.register_command('!', "purge", move |message: Message, args: Option<String>| {
        purge_channel(a.clone(), message, args)
    });

    let a = api.clone();
    gateway.register_interaction(DONE_ID, move |i: Interaction| mark_done(a.clone(), i));
    let a = api.clone();
    gateway.register_interaction(UNDO_ID, move |i: Interaction| mark_undone(a.clone(), i));
    let a = api.clone();
    gateway.register_interaction(DELETE_ID, move |i: Interaction| delete_todo(a.clone(), i));
    let a = api.clone();
    gateway.register_interaction(EDIT_ID, move |i: Interaction| open_edit_modal(a.clone(), i));
    gateway.register_interaction(EDIT_MODAL_ID, move |i: Interaction| submit_edit(api.clone(), i));
}
