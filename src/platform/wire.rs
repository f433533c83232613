//! Result shapes returned by the messaging platform.
//!
//! The platform answers several requests with one of a few container variants
//! that carry the same logical payload. They are kept as closed enums here and
//! collapsed into the canonical [`crate::models`] types by
//! [`super::normalize`] before anything else sees them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    User(i64),
    Chat(i64),
    Channel(i64),
}

impl Peer {
    pub fn id(&self) -> i64 {
        match self {
            Peer::User(id) | Peer::Chat(id) | Peer::Channel(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Peer::User(_) => "user",
            Peer::Chat(_) => "chat",
            Peer::Channel(_) => "channel",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireChat {
    Chat { id: i64, title: String },
    ChatForbidden { id: i64, title: String },
    Channel { id: i64, title: String },
    ChannelForbidden { id: i64, title: String },
}

impl WireChat {
    pub fn id(&self) -> i64 {
        match self {
            WireChat::Chat { id, .. }
            | WireChat::ChatForbidden { id, .. }
            | WireChat::Channel { id, .. }
            | WireChat::ChannelForbidden { id, .. } => *id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            WireChat::Chat { title, .. }
            | WireChat::ChatForbidden { title, .. }
            | WireChat::Channel { title, .. }
            | WireChat::ChannelForbidden { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireMedia {
    /// `None` is an empty photo placeholder
    Photo(Option<i64>),
    Document,
    Geo,
    Contact,
    Venue,
    WebPage,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub id: i32,
    pub peer: Peer,
    pub from: Option<Peer>,
    pub out: bool,
    /// Unix seconds
    pub date: i64,
    pub text: String,
    pub media: Option<WireMedia>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageClass {
    Message(WireMessage),
    Service { id: i32, peer: Peer },
    Empty { id: i32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBatch {
    pub messages: Vec<MessageClass>,
    pub chats: Vec<WireChat>,
    pub users: Vec<WireUser>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryResponse {
    Messages(MessageBatch),
    Slice { count: i32, batch: MessageBatch },
    Channel { pts: i32, count: i32, batch: MessageBatch },
    NotModified { count: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireDialog {
    pub peer: Peer,
    pub top_message: i32,
    pub unread_count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogClass {
    Dialog(WireDialog),
    Folder { folder_id: i32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DialogBatch {
    pub dialogs: Vec<DialogClass>,
    pub messages: Vec<MessageClass>,
    pub chats: Vec<WireChat>,
    pub users: Vec<WireUser>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogsResponse {
    Dialogs(DialogBatch),
    Slice { count: i32, batch: DialogBatch },
    NotModified { count: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateClass {
    NewMessage(MessageClass),
    NewChannelMessage(MessageClass),
    MessageId { id: i32, random_id: i64 },
    Other,
}

/// Container for pushed updates
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatesEnvelope {
    Updates(Vec<UpdateClass>),
    Short(UpdateClass),
    TooLong,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SentMessageResponse {
    Updates(Vec<UpdateClass>),
    ShortSent { id: i32, date: i64 },
}
