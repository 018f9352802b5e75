pub mod handlers;
pub mod history;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod server;

pub use registry::ConnectionRegistry;
pub use router::{DeliveryReceipt, DeliveryRouter};
pub use server::{start, ServerConfig, ServerHandle};
