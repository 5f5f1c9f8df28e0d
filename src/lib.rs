// Library surface for the binary and for headless/integration tests.
pub mod app;
pub mod app_dirs;
pub mod catalog;
pub mod config;
pub mod identity;
pub mod logging;
pub mod runtime;
pub mod session;
pub mod summary;
pub mod timer;
pub mod trainer;
pub mod ui;
pub mod util;

pub use app::App;
