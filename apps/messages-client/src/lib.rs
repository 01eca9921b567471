#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Demo web app: each controller calls the downstream messages API through an
//! [`oauth2_outbound::OAuth2ClientLayer`] configured with a different
//! client-registration resolver.

pub mod app;
pub mod authn;
pub mod config;
pub mod controllers;
pub mod error;
pub mod logging;
pub mod messages;

pub use app::{App, StartupError, serve};
pub use config::{AppConfig, ConfigError};
