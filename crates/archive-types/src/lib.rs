pub mod api;
pub mod models;
pub mod snowflake;

pub use models::{
    Attachment, AttachmentKind, Channel, Embed, Emoji, Message, Reaction, Role, Roster, Server,
    Transcript, User,
};
pub use snowflake::{Snowflake, SnowflakeError};
