use std::thread;
use std::time::Duration;

use color_eyre::Result;
use log::info;

use crate::config::FirstSeenPolicy;
use crate::discogs::{Listing, MarketplaceStats, WantlistItem};
use crate::store::{ReleaseStats, Store};
use crate::telegram::{escape_html, Notifier};

const EMOJI_NEW: &str = "🆕";
const EMOJI_PRICE: &str = "💰";
const EMOJI_CONDITION: &str = "⭐";
const EMOJI_SELLER: &str = "👤";
const EMOJI_LINK: &str = "🔗";
const EMOJI_MORE: &str = "📈";
const EMOJI_DROP: &str = "📉";

// pacing between consecutive Telegram messages
const SEND_GAP: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum Event {
    NewListing {
        release: WantlistItem,
        listing: Listing,
    },
    MoreForSale {
        release: WantlistItem,
        from: u32,
        to: u32,
    },
    PriceDrop {
        release: WantlistItem,
        from: f64,
        to: f64,
    },
}

impl Event {
    /// One-line summary for the status log.
    pub fn describe(&self) -> String {
        match self {
            Event::NewListing { release, listing } => format!(
                "new listing {} for \"{}\" ({:.2} {})",
                listing.id, release.title, listing.price.value, listing.price.currency
            ),
            Event::MoreForSale { release, from, to } => {
                format!("\"{}\": copies for sale {} -> {}", release.title, from, to)
            }
            Event::PriceDrop { release, from, to } => {
                format!("\"{}\": lowest price {:.2} -> {:.2}", release.title, from, to)
            }
        }
    }
}

/// Compare one release's current marketplace state against the store and
/// record what we saw. Listings already in the seen set never produce an
/// event again; a release with no cached stats is in its first sighting,
/// and the policy decides whether that sighting alerts or only teaches.
pub fn diff_release(
    release: &WantlistItem,
    stats: &MarketplaceStats,
    listings: &[Listing],
    store: &mut Store,
    policy: FirstSeenPolicy,
) -> Vec<Event> {
    let current = ReleaseStats::from(stats);
    let cached = store.stats_for(release.id);
    let learning = cached.is_none() && policy == FirstSeenPolicy::Learn;

    let mut events = Vec::new();
    for listing in listings {
        if store.is_seen(listing.id) {
            continue;
        }
        store.mark_seen(listing.id);
        if !learning {
            events.push(Event::NewListing {
                release: release.clone(),
                listing: listing.clone(),
            });
        }
    }

    if let Some(prev) = cached {
        // a bare count increase only matters when no listing was caught
        // individually (the listings endpoint can lag the stats)
        if events.is_empty() && current.num_for_sale > prev.num_for_sale {
            events.push(Event::MoreForSale {
                release: release.clone(),
                from: prev.num_for_sale,
                to: current.num_for_sale,
            });
        }
        if let (Some(old), Some(new)) = (prev.lowest_price, current.lowest_price) {
            if new < old {
                events.push(Event::PriceDrop {
                    release: release.clone(),
                    from: old,
                    to: new,
                });
            }
        }
    }

    store.record_stats(release.id, current);
    events
}

fn render_new_listing(release: &WantlistItem, listing: &Listing) -> String {
    format!(
        "{EMOJI_NEW} <b>{}</b>\n{}\n\n{EMOJI_PRICE} {:.2} {}\n{EMOJI_CONDITION} {}\n{EMOJI_SELLER} {}\n{EMOJI_LINK} {}",
        escape_html(&release.title),
        escape_html(&release.artist),
        listing.price.value,
        escape_html(&listing.price.currency),
        escape_html(&listing.condition),
        escape_html(&listing.seller),
        escape_html(&listing.uri),
    )
}

fn render_more_for_sale(release: &WantlistItem, from: u32, to: u32) -> String {
    format!(
        "{EMOJI_MORE} <b>{}</b>\n{}\n\nCopies for sale: {from} → {to}",
        escape_html(&release.title),
        escape_html(&release.artist),
    )
}

fn render_price_drop(release: &WantlistItem, from: f64, to: f64) -> String {
    format!(
        "{EMOJI_DROP} <b>{}</b>\n{}\n\nLowest price: {from:.2} → {to:.2}",
        escape_html(&release.title),
        escape_html(&release.artist),
    )
}

pub fn render_event(event: &Event) -> String {
    match event {
        Event::NewListing { release, listing } => render_new_listing(release, listing),
        Event::MoreForSale { release, from, to } => render_more_for_sale(release, *from, *to),
        Event::PriceDrop { release, from, to } => render_price_drop(release, *from, *to),
    }
}

/// Send one Telegram message per event, pacing consecutive sends.
pub fn send_notifications(notifier: &Notifier, events: &[Event]) -> Result<u64> {
    let mut sent = 0u64;
    for event in events {
        if sent > 0 {
            thread::sleep(SEND_GAP);
        }
        info!("notifying: {}", event.describe());
        notifier.send(&render_event(event))?;
        sent += 1;
    }
    Ok(sent)
}
