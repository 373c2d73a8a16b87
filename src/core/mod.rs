pub mod actions;
pub mod calendar;
pub mod debounce;
pub mod overlay;
pub mod stats;
pub mod store;
pub mod task;
pub mod view;
