/// View layer: the grid's view-state controller and everything it talks to
///
/// Nothing in here touches iced. The shell in `main.rs` feeds events in and
/// runs the returned commands.
pub mod controller;
pub mod detail;
pub mod effects;
pub mod navigation;
pub mod params;
pub mod people;
pub mod sorting;
