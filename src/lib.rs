// Movbay client core
// Cart, favorites, session storage, chat socket and notification routing

pub mod api;
pub mod cart;
pub mod cli;
pub mod config;
pub mod favorites;
pub mod notifications;
pub mod observability;
pub mod signals;
pub mod socket;
pub mod state;
pub mod storage;

pub use config::MovbayConfig;
pub use state::{AppServices, Collaborators};
