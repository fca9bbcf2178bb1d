//! Client event stream reconstruction and SSE rendering.

pub mod reconstructor;
pub mod sse;

pub use reconstructor::{ClientEvent, StreamReconstructor};
pub use sse::render_event;
