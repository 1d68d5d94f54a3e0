// CLI Command Implementations
// Handles execution of each CLI command with colored output

use super::{
    error, info, success, warning, CartAction, Cli, Commands, ConfigAction, FavoritesAction,
    ProductArgs, SessionAction,
};
use crate::cart::{CartProduct, CartRejection};
use crate::config::MovbayConfig;
use crate::favorites::FavoriteProduct;
use crate::notifications::{Notification, NotificationKind};
use crate::signals;
use crate::socket::{SocketHandlers, SocketState};
use crate::state::{AppServices, Collaborators};
use crate::storage::UserType;
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How long the chat command waits for the first open before handing over to the prompt
const CONNECT_WAIT: Duration = Duration::from_secs(10);

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = MovbayConfig::load(&cli.config)?;

    if let Commands::Config { action } = cli.command {
        return config_command(&cli.config, config, action);
    }

    let services = bootstrap(config).await?;

    let result = match cli.command {
        Commands::Cart { action } => cart_command(&services, action).await,
        Commands::Favorites { action } => favorites_command(&services, action).await,
        Commands::Session { action } => session_command(&services, action).await,
        Commands::Notify {
            title,
            kind,
            data,
            tap,
        } => notify_command(&services, title, kind, data, tap).await,
        Commands::Chat { room, token } => chat_command(&services, room, token).await,
        Commands::Config { .. } => Ok(()),
    };

    // Background writes must land before the process exits
    services.cart().flush().await?;
    services.favorites().flush().await?;

    result
}

async fn bootstrap(config: MovbayConfig) -> Result<AppServices> {
    let collaborators = Collaborators::from_config(&config)?;
    Ok(AppServices::bootstrap(config, collaborators).await)
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn money(amount: f64) -> String {
    format!("₦{:.2}", amount)
}

async fn cart_command(services: &AppServices, action: CartAction) -> Result<()> {
    let cart = services.cart();

    match action {
        CartAction::List => {
            let items = cart.items();
            if items.is_empty() {
                info("Your cart is empty");
                return Ok(());
            }

            println!("{}", "🛒 Cart".bright_white().bold());
            println!("{}", "━".repeat(60).bright_black());
            for item in &items {
                let limit = if item.at_stock_limit() {
                    " (stock limit)".yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {:<16} {:<24} x{:<3} {}{}",
                    item.id.bright_black(),
                    item.title,
                    item.quantity,
                    money(item.line_total()).green(),
                    limit
                );
            }
            println!("{}", "━".repeat(60).bright_black());
            println!(
                "  {} {} items, total {}",
                "Σ".bright_white(),
                cart.item_count(),
                money(cart.total_amount()).green().bold()
            );
        }
        CartAction::Add { product, stock } => {
            let ProductArgs {
                id,
                title,
                price,
                discounted_price,
                image,
            } = product;
            let product = CartProduct {
                id: id.clone(),
                title: title.clone(),
                image,
                store: Value::Null,
                price,
                discounted_price,
                stock_available: stock,
            };

            match cart.add_to_cart(product).await {
                Ok(quantity) => success(&format!(
                    "{} in cart (quantity {}, {} left in stock)",
                    title.bright_white(),
                    quantity,
                    cart.get_remaining_stock(&id, stock)
                )),
                Err(rejection) => report_rejection(&rejection),
            }
        }
        CartAction::Remove { id } => match cart.remove_from_cart(&id).await {
            Ok(()) => success(&format!("Removed {}", id.bright_white())),
            Err(rejection) => report_rejection(&rejection),
        },
        CartAction::Update { id, quantity } => match cart.update_quantity(&id, quantity).await {
            Ok(()) => success(&format!(
                "{} quantity set to {}",
                id.bright_white(),
                cart.get_item_quantity(&id)
            )),
            Err(rejection) => report_rejection(&rejection),
        },
        CartAction::Clear => {
            cart.clear_cart().await;
            success("Cart cleared");
        }
    }

    Ok(())
}

fn report_rejection(rejection: &CartRejection) {
    error(&rejection.message());
    if let Some(remaining) = rejection.remaining() {
        info(&format!("{} remaining in stock", remaining));
    }
}

async fn favorites_command(services: &AppServices, action: FavoritesAction) -> Result<()> {
    let favorites = services.favorites();

    match action {
        FavoritesAction::List => {
            let items = favorites.items();
            if items.is_empty() {
                info("No favorites yet");
                return Ok(());
            }

            println!("{}", "❤ Favorites".bright_white().bold());
            println!("{}", "━".repeat(60).bright_black());
            for item in items {
                println!(
                    "  {:<16} {:<24} {}  {}",
                    item.id.bright_black(),
                    item.title,
                    money(item.discounted_price.unwrap_or(item.price)).green(),
                    item.date_added.format("%Y-%m-%d").to_string().bright_black()
                );
            }
        }
        FavoritesAction::Toggle { product } => {
            let title = product.title.clone();
            let product = FavoriteProduct {
                id: product.id,
                title: product.title,
                image: product.image,
                price: product.price,
                discounted_price: product.discounted_price,
                store: Value::Null,
            };

            if favorites.toggle_favorite(product).await {
                success(&format!("{} added to favorites", title.bright_white()));
            } else {
                success(&format!("{} removed from favorites", title.bright_white()));
            }
        }
        FavoritesAction::Clear => {
            favorites.clear_favorites().await;
            success("Favorites cleared");
        }
    }

    Ok(())
}

async fn session_command(services: &AppServices, action: SessionAction) -> Result<()> {
    let session = services.session();

    match action {
        SessionAction::Show => {
            let token = session.auth_token().await?;
            let user_type = session.user_type().await?;

            println!("{}", "👤 Session".bright_white().bold());
            println!("{}", "━".repeat(40).bright_black());
            println!(
                "  {} {}",
                "Signed in:".bright_white(),
                if token.is_some() { "yes".green() } else { "no".yellow() }
            );
            println!(
                "  {} {}",
                "Account:".bright_white(),
                user_type.map(|t| t.to_string()).unwrap_or_else(|| "-".to_string())
            );
            println!(
                "  {} {}",
                "Onboarded:".bright_white(),
                session.onboarding_complete().await?
            );
            if let Some(ride) = session.accepted_ride_id().await? {
                println!("  {} {}", "Active ride:".bright_white(), ride.cyan());
            }
            if let Some(sent_at) = session.token_sent_at().await? {
                println!("  {} {}", "Push token sent:".bright_white(), sent_at.to_rfc3339());
            }
        }
        SessionAction::Login { token, user_type } => {
            let user_type: UserType = user_type.parse().map_err(anyhow::Error::msg)?;
            session.set_auth_token(&token).await?;
            session.set_user_type(user_type).await?;
            success(&format!("Signed in as {}", user_type.to_string().bright_white()));
        }
        SessionAction::Logout => {
            session.clear().await?;
            success("Signed out");
        }
        SessionAction::Onboarded => {
            session.set_onboarding_complete().await?;
            success("Onboarding marked complete");
        }
    }

    Ok(())
}

async fn notify_command(
    services: &AppServices,
    title: String,
    kind: Option<String>,
    data: Option<String>,
    tap: bool,
) -> Result<()> {
    let router = services.notifications();
    router.initialize().await;

    let mut payload = match data {
        Some(raw) => serde_json::from_str(&raw).context("--data must be valid JSON")?,
        None => Value::Object(Default::default()),
    };
    if let Some(kind) = kind {
        if NotificationKind::from_tag(&kind).is_none() {
            warning(&format!("Unknown notification kind {}", kind.yellow()));
        }
        if let Value::Object(map) = &mut payload {
            map.insert("kind".to_string(), Value::String(kind));
        }
    }

    let notification = Notification::titled(&title).with_data(payload);
    let routed = if tap {
        router.on_notification_tapped(notification).await
    } else {
        router.on_notification_received(notification).await
    };

    match routed {
        Some(kind) => {
            let action = kind.action();
            success(&format!("Routed as {}", kind.tag().bright_white()));
            if let Some(route) = action.route {
                info(&format!("Route: {}", route.cyan()));
            }
            if router.should_refresh() {
                info("Data refresh requested");
            }
        }
        None => warning("Notification not recognized; nothing to do"),
    }

    Ok(())
}

async fn chat_command(services: &AppServices, room: String, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => services
            .session()
            .auth_token()
            .await?
            .context("Not signed in; pass --token or run `movbay session login`")?,
    };

    let (tx, mut inbound) = tokio::sync::mpsc::unbounded_channel::<Value>();
    let handlers = SocketHandlers::new()
        .on_message(move |message| {
            let _ = tx.send(message);
        })
        .on_connection_change(|connected| {
            if connected {
                success("Connected");
            } else {
                warning("Disconnected");
            }
        });
    let socket = services.chat_socket(handlers);

    let spinner = spinner(&format!("Connecting to room {}...", room));
    socket.connect(&room, &token);
    let deadline = tokio::time::Instant::now() + CONNECT_WAIT;
    while !socket.is_connected() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    spinner.finish_and_clear();

    if !socket.is_connected() {
        warning("Still not connected; reconnecting in the background");
    }
    info("Type a message and press Enter. /retry reconnects, Ctrl+C leaves.");

    let shutdown = signals::create_shutdown_listener()?;
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(message) = inbound.recv() => print_chat_message(&message),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/retry" {
                    if !socket.retry() {
                        info("Already connected");
                    }
                    continue;
                }
                if !socket.send_message(line, None) {
                    warning("Not connected; message not sent");
                    if socket.state() == SocketState::Closed {
                        info("Type /retry to reconnect");
                    }
                }
            }
        }
    }

    socket.disconnect();
    info("Left the chat");
    Ok(())
}

fn print_chat_message(message: &Value) {
    let sender = message
        .get("sender")
        .and_then(|s| s.get("username").or(Some(s)))
        .and_then(Value::as_str)
        .unwrap_or("peer");

    match message.get("content").and_then(Value::as_str) {
        Some(content) => println!("{} {}", format!("{}:", sender).cyan().bold(), content),
        None => println!("{} {}", "•".bright_black(), message),
    }
}

fn config_command(path: &str, config: MovbayConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        ConfigAction::Validate => {
            // `load` already validated; re-run for configs built from defaults
            config.validate()?;
            success(&format!("Configuration {} is valid", path.bright_white()));
            info(&format!(
                "Chat host {}://{}, API {}",
                config.socket.scheme, config.socket.host, config.api.base_url
            ));
        }
    }

    Ok(())
}
