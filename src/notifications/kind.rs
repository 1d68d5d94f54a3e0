// Notification kinds
// Typed classification, with the legacy title table kept as a migration shim

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every notification the client reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A sender requested a ride near the rider
    NewRideAlert,
    /// A rider accepted the sender's ride
    RideAccepted,
    /// The sender paid for an accepted ride
    SenderPaid,
    /// The sender canceled the ride
    RideCancelled,
    /// The buyer's order was confirmed by the seller
    OrderConfirmed,
    NewMessage,
    /// A new marketplace order awaits the seller
    NewOrder,
}

/// What the router does with a notification of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationAction {
    /// Deliver to subscribers
    pub notify: bool,
    /// Screen opened when the notification is tapped
    pub route: Option<&'static str>,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 7] = [
        NotificationKind::NewRideAlert,
        NotificationKind::RideAccepted,
        NotificationKind::SenderPaid,
        NotificationKind::RideCancelled,
        NotificationKind::OrderConfirmed,
        NotificationKind::NewMessage,
        NotificationKind::NewOrder,
    ];

    /// Structured tag carried in the payload's `kind` field
    pub fn tag(self) -> &'static str {
        match self {
            NotificationKind::NewRideAlert => "new_ride_alert",
            NotificationKind::RideAccepted => "ride_accepted",
            NotificationKind::SenderPaid => "sender_paid",
            NotificationKind::RideCancelled => "ride_cancelled",
            NotificationKind::OrderConfirmed => "order_confirmed",
            NotificationKind::NewMessage => "new_message",
            NotificationKind::NewOrder => "new_order",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Display title the backend sends today
    pub fn legacy_title(self) -> &'static str {
        match self {
            NotificationKind::NewRideAlert => "New Ride Alert on movbay",
            NotificationKind::RideAccepted => "Ride Accepted",
            NotificationKind::SenderPaid => "Sender's has made payment",
            NotificationKind::RideCancelled => "Ride has been canceled by sender",
            NotificationKind::OrderConfirmed => "Your Order has been Confirmed",
            NotificationKind::NewMessage => "New Message",
            NotificationKind::NewOrder => "New Order Available",
        }
    }

    /// Exact, case-sensitive match after trimming whitespace and one layer of quotes
    pub fn from_legacy_title(title: &str) -> Option<Self> {
        let normalized = normalize_title(title);
        Self::ALL.into_iter().find(|kind| kind.legacy_title() == normalized)
    }

    pub fn action(self) -> NotificationAction {
        match self {
            NotificationKind::NewRideAlert => NotificationAction {
                notify: true,
                route: Some("/rider/ride-requests"),
            },
            NotificationKind::RideAccepted => NotificationAction {
                notify: true,
                route: Some("/rides/active"),
            },
            NotificationKind::SenderPaid => NotificationAction {
                notify: true,
                route: Some("/rider/deliveries"),
            },
            NotificationKind::RideCancelled => NotificationAction {
                notify: true,
                route: None,
            },
            NotificationKind::OrderConfirmed => NotificationAction {
                notify: false,
                route: Some("/orders"),
            },
            NotificationKind::NewMessage => NotificationAction {
                notify: true,
                route: Some("/chats"),
            },
            NotificationKind::NewOrder => NotificationAction {
                notify: true,
                route: Some("/seller/orders"),
            },
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

fn normalize_title(title: &str) -> &str {
    let trimmed = title.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].trim();
        }
    }
    trimmed
}
