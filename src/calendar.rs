//! Calendar event aggregator.
//!
//! DESIGN
//! ======
//! Four independently-updating live sources feed one sorted event list:
//! campaign starts, campaign ends, product expiries, and basket deliveries.
//! Each source owns one cell of a mutex-guarded cache; when a source emits,
//! only its cell is replaced, the four cells are concatenated in fixed
//! order and stably sorted by date, and the merged list is published. The
//! first snapshot from any single source already produces a (partial)
//! result; nothing waits for all four.
//!
//! The merge-and-publish happens under the cache lock so two sources can
//! never publish their merges out of order. A source that errors stops
//! updating (its cell keeps its last value) while the other three continue.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::SyncError;
use crate::listener::{Listener, ListenerHandle};
use crate::model::{CalendarEvent, EventType};
use crate::store::{Document, DocumentStore, FilterOp, Query, Snapshots};

// =============================================================================
// SOURCES
// =============================================================================

const FIELD_NAME: &str = "nome";
const FIELD_DESCRIPTION: &str = "descricao";

struct SourceSpec {
    collection: &'static str,
    date_field: &'static str,
    event_type: EventType,
    /// Disambiguates the two events derived from the same campaign document.
    id_suffix: &'static str,
}

/// Concatenation order of the cache cells; ties on equal dates keep it.
static SOURCES: [SourceSpec; 4] = [
    SourceSpec {
        collection: "campanhas",
        date_field: "dataInicio",
        event_type: EventType::CampaignStart,
        id_suffix: "-inicio",
    },
    SourceSpec {
        collection: "campanhas",
        date_field: "dataFim",
        event_type: EventType::CampaignEnd,
        id_suffix: "-fim",
    },
    SourceSpec {
        collection: "produtos",
        date_field: "validade",
        event_type: EventType::ProductExpiry,
        id_suffix: "",
    },
    SourceSpec {
        collection: "cabazes",
        date_field: "dataEntrega",
        event_type: EventType::BasketDelivery,
        id_suffix: "",
    },
];

// =============================================================================
// AGGREGATOR
// =============================================================================

/// Merges the four live event sources into one sorted, continuously-updated
/// list for a date range.
#[derive(Clone)]
pub struct CalendarAggregator {
    store: Arc<dyn DocumentStore>,
}

impl CalendarAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Live aggregated event list for `[start_ms, end_ms)`, ascending by
    /// date. An empty range degrades to an immediately-empty no-op
    /// listener. Cancelling releases all four underlying subscriptions.
    pub fn listen_range_events(&self, start_ms: i64, end_ms: i64) -> Listener<Vec<CalendarEvent>> {
        let handle = ListenerHandle::new();
        let (tx, listener) = Listener::new(handle.clone());

        if start_ms >= end_ms {
            let _ = tx.send(Ok(Vec::new()));
            return listener;
        }

        let cache = Arc::new(Mutex::new(vec![Vec::new(); SOURCES.len()]));
        for (slot, spec) in SOURCES.iter().enumerate() {
            let query = Query::collection(spec.collection)
                .filter(spec.date_field, FilterOp::Gte, start_ms)
                .filter(spec.date_field, FilterOp::Lt, end_ms);
            let live = self.store.subscribe(query);
            handle.attach(live.handle.clone());
            spawn_source(slot, spec, live.snapshots, Arc::clone(&cache), handle.clone(), tx.clone());
        }
        listener
    }
}

/// `[start, end)` millisecond bounds of one calendar month.
///
/// # Errors
///
/// `InvalidArgument` when the month is outside `1..=12`.
pub fn month_range(year: i32, month: u8) -> Result<(i64, i64), SyncError> {
    use time::{Date, Month};

    let month = Month::try_from(month)
        .map_err(|_| SyncError::InvalidArgument("month must be between 1 and 12"))?;
    let start = Date::from_calendar_date(year, month, 1)
        .map_err(|_| SyncError::InvalidArgument("invalid calendar month"))?;
    let end = match month {
        Month::December => Date::from_calendar_date(year + 1, Month::January, 1),
        other => Date::from_calendar_date(year, other.next(), 1),
    }
    .map_err(|_| SyncError::InvalidArgument("invalid calendar month"))?;
    Ok((date_ms(start), date_ms(end)))
}

/// Midnight UTC of a date, as milliseconds since the Unix epoch.
#[must_use]
pub fn date_ms(date: time::Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp() * 1000
}

// =============================================================================
// SOURCE TASKS
// =============================================================================

type EventSender = mpsc::UnboundedSender<Result<Vec<CalendarEvent>, SyncError>>;
type SourceCache = Arc<Mutex<Vec<Vec<CalendarEvent>>>>;

fn spawn_source(
    slot: usize,
    spec: &'static SourceSpec,
    mut snapshots: Snapshots,
    cache: SourceCache,
    handle: ListenerHandle,
    tx: EventSender,
) {
    tokio::spawn(async move {
        while let Some(snapshot) = snapshots.recv().await {
            if handle.is_cancelled() {
                break;
            }
            match snapshot {
                Ok(docs) => {
                    let events = map_events(&docs, spec);
                    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
                    cache[slot] = events;
                    let merged = merge(&cache);
                    if handle.is_cancelled() {
                        break;
                    }
                    if tx.send(Ok(merged)).is_err() {
                        drop(cache);
                        handle.cancel();
                        break;
                    }
                }
                Err(err) => {
                    // This source stops; its cell keeps the last value and
                    // the other three keep publishing.
                    error!(
                        source = ?spec.event_type,
                        error = %err,
                        "calendar source subscription failed"
                    );
                    let _ = tx.send(Err(SyncError::from(err)));
                    break;
                }
            }
        }
    });
}

fn map_events(docs: &[Document], spec: &SourceSpec) -> Vec<CalendarEvent> {
    docs.iter()
        .filter_map(|doc| {
            let Some(date) = doc.i64_field(spec.date_field) else {
                warn!(doc = %doc.id, field = spec.date_field, "skipping event document without date");
                return None;
            };
            Some(CalendarEvent {
                id: format!("{}{}", doc.id, spec.id_suffix),
                title: doc.str_field(FIELD_NAME).unwrap_or_default().to_string(),
                date,
                event_type: spec.event_type,
                description: doc.str_field(FIELD_DESCRIPTION).map(str::to_string),
            })
        })
        .collect()
}

/// Concatenate the cache cells in source order and sort stably by date, so
/// equal dates keep the fixed source order.
fn merge(cache: &[Vec<CalendarEvent>]) -> Vec<CalendarEvent> {
    let mut merged: Vec<CalendarEvent> = cache.iter().flatten().cloned().collect();
    merged.sort_by_key(|event| event.date);
    merged
}

#[cfg(test)]
#[path = "calendar_test.rs"]
mod tests;
