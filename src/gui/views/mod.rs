//! View modules for the GUI
//!
//! Each view is an `impl GuiApp` block rendering into an `egui::Ui`; the
//! functions are called from `App::update` in `app.rs`.
//!
//! - `strategy` - Run loading, strategy review and funding, success modal

pub mod strategy;
