//! Composition root for fieldcheck.
//!
//! Loads [`AppConfig`], installs tracing and wires the hosted backend's
//! identity provider and table store into the session manager and the data
//! services.
//!
//! ```no_run
//! use fieldcheck::{App, AppConfig, telemetry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! telemetry::init(&config.log_filter);
//!
//! let app = App::connect(&config).map_err(|e| e.to_string())?;
//! if let Some(user) = app.start().await {
//!     let inspections = app.services().inspections().list(&user, None).await?;
//!     println!("{} inspections", inspections.len());
//! }
//! # Ok(())
//! # }
//! ```

mod app;
pub mod config;
pub mod telemetry;

pub use app::App;
pub use config::AppConfig;
