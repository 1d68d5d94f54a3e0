// Command Line Interface Module
// Drives the cart, favorites, session, notification and chat services from a terminal

pub mod commands;

use clap::{Args, Parser, Subcommand};
use colored::*;

/// Movbay - marketplace, delivery and rider client core
#[derive(Parser, Debug)]
#[command(name = "movbay")]
#[command(author = "Movbay Team")]
#[command(version)]
#[command(about = "🛵 Movbay client core - cart, favorites, chat and notifications from the terminal", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "movbay.toml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },

    /// Inspect and change favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Manage the signed-in session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Feed a notification through the router
    Notify {
        /// Notification title as sent by the backend
        title: String,

        /// Structured kind tag (e.g. ride_accepted); overrides the title
        #[arg(short, long)]
        kind: Option<String>,

        /// Extra JSON payload
        #[arg(short, long)]
        data: Option<String>,

        /// Treat the notification as tapped by the user
        #[arg(short, long)]
        tap: bool,
    },

    /// Open an interactive chat in a room
    Chat {
        /// Chat room identifier
        #[arg(short, long)]
        room: String,

        /// Auth token; defaults to the signed-in session
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProductArgs {
    /// Product identifier
    pub id: String,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub price: f64,

    #[arg(long)]
    pub discounted_price: Option<f64>,

    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum CartAction {
    /// Show cart contents and total
    List,

    /// Add one unit of a product
    Add {
        #[command(flatten)]
        product: ProductArgs,

        /// Units in stock when the product was viewed
        #[arg(long)]
        stock: u32,
    },

    /// Remove a product from the cart
    Remove { id: String },

    /// Set the quantity of a product already in the cart
    Update { id: String, quantity: u32 },

    /// Empty the cart
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum FavoritesAction {
    /// Show favorites
    List,

    /// Add or remove a product
    Toggle {
        #[command(flatten)]
        product: ProductArgs,
    },

    /// Remove all favorites
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Show session state
    Show,

    /// Store an auth token and account type
    Login {
        #[arg(short, long)]
        token: String,

        /// user or rider
        #[arg(short, long, default_value = "user")]
        user_type: String,
    },

    /// Forget the signed-in account
    Logout,

    /// Mark onboarding as complete
    Onboarded,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Validate the configuration file
    Validate,
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}
