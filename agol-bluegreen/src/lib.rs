//! agol-bluegreen automates blue/green data refreshes for hosted feature
//! layer views.
//!
//! A user-facing view layer points at one of two interchangeable backing
//! services. Data is reloaded into whichever one is not currently live
//! ("staging"), after which the view's data source is swapped over to it.
//! Swapping again rolls back.
//!
//! This crate provides an API that allows for embedding the workflow into
//! another application. For the command line interface, see the
//! `agol-bluegreen-cli` crate.

mod bluegreen;
mod config;
mod error;
mod item;
mod pending;
mod portal;
mod service;
mod session;
mod swap;

#[cfg(test)]
mod testing;

pub use bluegreen::{BackingService, BlueGreen, Color, Split, UserFacingService};
pub use config::Config;
pub use error::Error;
pub use item::Item;
pub use pending::{OperationStatus, PendingOperation};
pub use portal::{check_response, HttpPortal, Params, Portal};
pub use service::{FeatureService, LayerKind};
pub use session::Session;
pub use swap::{
    build_swapped_definition, swap_view_source, SwapOptions, SwapOutcome, SWAPPED_PROPERTIES,
};
