pub mod app;
pub mod builtin;
pub mod shutdown;

pub use app::{Application, ApplicationBuilder};
pub use shutdown::ShutdownManager;
