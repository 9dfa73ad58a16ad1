//! WebSocket adapter: connection registry, wire frames, fanout bridge,
//! lifecycle management, and the axum upgrade handler.

mod fanout;
mod handler;
mod lifecycle;
mod messages;
pub mod registry;

pub use self::fanout::FanoutHandler;
pub use self::handler::{websocket_router, ws_handler, WebSocketState};
pub use self::lifecycle::{ConnectionLifecycle, LifecycleConfig};
pub use self::messages::{ClientFrame, ServerFrame};
pub use self::registry::{Connection, ConnectionRegistry, RegistryStats};
