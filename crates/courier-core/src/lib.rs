pub mod errors;
pub mod events;
pub mod ids;
pub mod message;

pub use errors::ChatError;
pub use events::ServerEvent;
pub use ids::{ConnectionId, MessageId, UserId};
pub use message::MessageKind;
