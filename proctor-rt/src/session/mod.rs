//! Session model, lifecycle rules, rooms and the registry that owns them

pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod room;

pub use lifecycle::AccessDecision;
pub use model::{AcceptedEvent, DetectionEvent, DetectionSettings, KindSetting, NewSession, Session};
pub use registry::{Membership, RegistryTimeouts, RoomHandle, SessionGuard, SessionRegistry, SessionState};
pub use room::{Delivery, Room};
