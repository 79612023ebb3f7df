pub mod channel;
pub mod dispatch;
pub mod engine;
pub mod feedback;
pub mod send;
pub mod transport;

pub mod mock;

pub use channel::{reconnect_delay, ChannelManager};
pub use engine::ChatEngine;
pub use transport::{TransportConnector, WsConnector};

use std::sync::Arc;

use parking_lot::Mutex;
use tether_store::ChatStore;

/// The single shared state container. Every mutation handler runs to
/// completion under this lock, so readers never see a half-applied
/// transition. The lock is never held across an await point.
pub type SharedStore = Arc<Mutex<ChatStore>>;
