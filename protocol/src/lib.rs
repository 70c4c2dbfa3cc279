//! Couchpad protocol
//!
//! Shared between the relay server and the desktop agent:
//! - `message`: the typed WebSocket frames
//! - `profile`: the static action → input mapping table and site classifier

pub mod message;
pub mod profile;

pub use message::{normalize_code, DecodeError, Message, Role};
pub use profile::{
    detect_profile, normalize_host, Catalog, InputDescriptor, MotionMode, MouseButton, Profile,
    ScrollDirection, DEFAULT_PROFILE,
};
