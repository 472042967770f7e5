//! MeshCore application layer.
//!
//! Everything the UI scripting layer and the development host touch:
//!
//! - [`ScriptApi`]: the thin, cycle-free contract over the engine, the
//!   settings store, and the async worker.
//! - [`EventBus`]: pub/sub with next-tick FIFO delivery.
//! - [`control`]: the host-side control framing (screenshots, key
//!   injection, script execution) behind a [`control::ControlBackend`].
//!
//! The display driver, keyboard scanner, and script VM are external
//! collaborators; this crate only defines the seams they plug into.

pub mod api;
pub mod bus;
pub mod control;
pub mod settings;

pub use api::{BootError, Continuation, SETTINGS_NAMESPACE, ScriptApi};
pub use bus::{BusHandler, EventBus, SubscriptionId};
pub use control::{
    ControlBackend, ControlChannel, ControlError, ControlParser, Framebuffer, INTER_BYTE_TIMEOUT,
    RequestFrame, ResponseFrame, STATUS_ERR, STATUS_OK, ScreenInfo, SpecialKey, handle_request,
    rle_encode,
};
pub use settings::DeviceSettings;
