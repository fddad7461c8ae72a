pub mod app;
pub mod theme;
#[allow(clippy::module_inception)]
pub mod ui;
