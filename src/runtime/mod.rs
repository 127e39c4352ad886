//! Application lifecycle: background tasks and graceful shutdown.

mod lifecycle;

pub use lifecycle::{shutdown_signal, Application};
