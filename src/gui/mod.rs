//! GUI module for the fundpg application
//!
//! This module provides the graphical user interface built with egui/eframe.
//!
//! ## Module Structure
//!
//! - `app` - Main GuiApp struct, background jobs and the top-level layout
//! - `async_job` - Background tasks polled from the GUI thread
//! - `theme` - Colors, spacing and styled widgets (AppTheme)
//! - `notifications` - Notification history
//! - `views` - Screen rendering (strategy review)
//!
//! ## Usage
//!
//! ```no_run
//! use fundpg::config::Config;
//! use fundpg::gui;
//!
//! let config = Config::default();
//! gui::launch(config, None).expect("Failed to launch GUI");
//! ```

mod app;
pub mod async_job;
pub mod notifications;
pub mod theme;
pub mod views;

pub use app::{launch, GuiApp};
pub use async_job::AsyncJob;
pub use notifications::NotificationEntry;
pub use theme::{configure_style, AppTheme};
