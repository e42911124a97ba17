// scenepilot-api: WebSocket client for the scene-switching control surface

pub mod control;
pub mod error;
pub mod protocol;
pub mod transport;

pub use control::{ControlChannel, SceneInfo, SceneList, SurfaceEvent, TransitionSettings, VersionInfo};
pub use error::Error;
pub use protocol::EventSubscription;
pub use transport::{
    ConnectionConfig, ConnectionEvent, ConnectionState, HandlerId, HandlerResult, TransportClient,
    TransportStats,
};
