use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use super::wire::{
    DialogClass, DialogsResponse, HistoryResponse, MessageBatch, MessageClass, Peer,
    SentMessageResponse, UpdateClass, UpdatesEnvelope, WireChat, WireMedia, WireMessage, WireUser,
};
use crate::models::{Dialog, Event, Message};

/// `@username` when set, otherwise first and last name
pub fn user_display_name(user: &WireUser) -> String {
    if let Some(username) = user.username.as_deref().filter(|u| !u.is_empty()) {
        return format!("@{}", username);
    }
    if user.last_name.is_empty() {
        user.first_name.clone()
    } else {
        format!("{} {}", user.first_name, user.last_name)
    }
}

fn timestamp(date: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(date, 0).single().unwrap_or_default()
}

fn media_placeholder(media: &WireMedia) -> &'static str {
    match media {
        WireMedia::Photo(_) => "📷 Фото",
        WireMedia::Document => "📎 Файл",
        WireMedia::Geo => "📍 Локація",
        WireMedia::Contact => "👤 Контакт",
        WireMedia::Venue => "📍 Місце",
        WireMedia::WebPage => "🔗 Посилання",
        WireMedia::Unsupported => "💬 Медіа",
    }
}

fn sender_name(msg: &WireMessage, users: &HashMap<i64, &WireUser>) -> String {
    if msg.out {
        return "You".to_string();
    }
    let lookup = |id: i64| users.get(&id).map(|u| user_display_name(u));
    let resolved = match msg.from {
        Some(Peer::User(id)) => lookup(id),
        Some(Peer::Channel(_)) => Some("Channel".to_string()),
        Some(Peer::Chat(_)) => Some("Chat".to_string()),
        // Private chats omit the sender; it is the peer itself
        None => match msg.peer {
            Peer::User(id) => lookup(id),
            _ => None,
        },
    };
    resolved.unwrap_or_else(|| "Unknown".to_string())
}

/// Convert one platform message; text-less messages without media are skipped
fn normalize_message(
    chat_id: i64,
    msg: &WireMessage,
    users: &HashMap<i64, &WireUser>,
) -> Option<Message> {
    let mut text = msg.text.clone();
    let mut photo_id = None;

    match &msg.media {
        Some(media) => {
            if let WireMedia::Photo(Some(id)) = media {
                photo_id = Some(*id);
            }
            if text.is_empty() {
                text = media_placeholder(media).to_string();
            }
        }
        None if text.is_empty() => return None,
        None => {}
    }

    Some(Message {
        id: msg.id,
        chat_id: chat_id.to_string(),
        chat_name: String::new(),
        text,
        sender: sender_name(msg, users),
        timestamp: timestamp(msg.date),
        is_read: !msg.out,
        out: msg.out,
        has_photo: photo_id.is_some(),
        photo_id,
    })
}

fn user_index(users: &[WireUser]) -> HashMap<i64, &WireUser> {
    users.iter().map(|u| (u.id, u)).collect()
}

fn normalize_batch(chat_id: i64, batch: &MessageBatch) -> Vec<Message> {
    let users = user_index(&batch.users);
    batch
        .messages
        .iter()
        .filter_map(|m| match m {
            MessageClass::Message(msg) => normalize_message(chat_id, msg, &users),
            _ => None,
        })
        .collect()
}

/// Collapse every history variant into a list of messages
pub fn normalize_history(chat_id: i64, response: &HistoryResponse) -> Vec<Message> {
    match response {
        HistoryResponse::Messages(batch)
        | HistoryResponse::Slice { batch, .. }
        | HistoryResponse::Channel { batch, .. } => normalize_batch(chat_id, batch),
        HistoryResponse::NotModified { .. } => Vec::new(),
    }
}

/// Collapse every dialogs variant into the chat list
pub fn normalize_dialogs(response: &DialogsResponse, now: DateTime<Utc>) -> Vec<Dialog> {
    let batch = match response {
        DialogsResponse::Dialogs(batch) | DialogsResponse::Slice { batch, .. } => batch,
        DialogsResponse::NotModified { .. } => return Vec::new(),
    };

    let users = user_index(&batch.users);
    let chats: HashMap<i64, &WireChat> = batch.chats.iter().map(|c| (c.id(), c)).collect();
    let last_messages: HashMap<i64, &WireMessage> = batch
        .messages
        .iter()
        .filter_map(|m| match m {
            MessageClass::Message(msg) => Some((msg.peer.id(), msg)),
            _ => None,
        })
        .collect();

    batch
        .dialogs
        .iter()
        .filter_map(|d| match d {
            DialogClass::Dialog(dialog) => Some(dialog),
            DialogClass::Folder { .. } => None,
        })
        .map(|dialog| {
            let peer_id = dialog.peer.id();
            let (name, kind) = match dialog.peer {
                Peer::User(id) => users
                    .get(&id)
                    .map(|u| (user_display_name(u), "user"))
                    .unwrap_or_default(),
                Peer::Chat(id) | Peer::Channel(id) => chats
                    .get(&id)
                    .map(|c| (c.title().to_string(), dialog.peer.kind()))
                    .unwrap_or_default(),
            };
            let (last_message, last_update_time) = match last_messages.get(&peer_id) {
                Some(msg) => (msg.text.clone(), timestamp(msg.date)),
                None => (String::new(), now),
            };

            Dialog {
                id: peer_id,
                name,
                last_message,
                unread_count: dialog.unread_count,
                last_update_time,
                kind: kind.to_string(),
            }
        })
        .collect()
}

fn update_event(update: &UpdateClass) -> Option<Event> {
    let message = match update {
        UpdateClass::NewMessage(MessageClass::Message(msg))
        | UpdateClass::NewChannelMessage(MessageClass::Message(msg)) => msg,
        _ => return None,
    };
    normalize_message(message.peer.id(), message, &HashMap::new())
        .map(|message| Event::NewMessage { message })
}

/// Extract new-message events from a pushed updates container
pub fn normalize_updates(envelope: &UpdatesEnvelope) -> Vec<Event> {
    match envelope {
        UpdatesEnvelope::Updates(updates) => updates.iter().filter_map(update_event).collect(),
        UpdatesEnvelope::Short(update) => update_event(update).into_iter().collect(),
        UpdatesEnvelope::TooLong => Vec::new(),
    }
}

/// Id of a freshly sent message, if the response carried one
pub fn sent_message_id(response: &SentMessageResponse) -> Option<i32> {
    match response {
        SentMessageResponse::ShortSent { id, .. } => Some(*id),
        SentMessageResponse::Updates(updates) => updates.iter().find_map(|u| match u {
            UpdateClass::MessageId { id, .. } => Some(*id),
            _ => None,
        }),
    }
}
