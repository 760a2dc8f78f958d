//! Analytics event types and the windowed stats view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Sentinel user id substituted by callers that cannot attribute an event.
///
/// The store itself never substitutes it; the caller decides before the
/// write reaches this layer.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Event-type-specific payload fields.
///
/// Serializes to a plain JSON object with no tag, so the stored shape is
/// exactly the fields a given event type uses. Unknown shapes (`click`,
/// `dismiss`, future event types) fall through to [`EventPayload::Other`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// A switch between client surfaces
    SurfaceSwitch {
        surface_from: String,
        surface_to: String,
    },
    /// A feed pagination request carrying the cursor it continued from
    LoadMore { cursor: String },
    /// A feed render carrying the number of items shown
    FeedView { items_count: i64 },
    /// Any other event-type payload, kept as-is
    Other(Map<String, Value>),
}

impl EventPayload {
    /// Payload for a `surface_switch` event
    pub fn surface_switch(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::SurfaceSwitch {
            surface_from: from.into(),
            surface_to: to.into(),
        }
    }

    /// Payload for a `load_more` event
    pub fn load_more(cursor: impl Into<String>) -> Self {
        Self::LoadMore {
            cursor: cursor.into(),
        }
    }

    /// Payload for a `view` event rendering a feed
    pub fn feed_view(items_count: i64) -> Self {
        Self::FeedView { items_count }
    }

    /// The empty payload (`{}`), also the fallback for unreadable rows
    pub fn empty() -> Self {
        Self::Other(Map::new())
    }

    /// Recognize a typed variant from a plain field map; anything whose keys
    /// don't match a variant exactly stays [`EventPayload::Other`].
    fn from_fields(fields: Map<String, Value>) -> Self {
        if fields.len() == 2 {
            if let (Some(Value::String(from)), Some(Value::String(to))) =
                (fields.get("surface_from"), fields.get("surface_to"))
            {
                return Self::SurfaceSwitch {
                    surface_from: from.clone(),
                    surface_to: to.clone(),
                };
            }
        }

        if fields.len() == 1 {
            if let Some(Value::String(cursor)) = fields.get("cursor") {
                return Self::LoadMore {
                    cursor: cursor.clone(),
                };
            }
            if let Some(items_count) = fields.get("items_count").and_then(Value::as_i64) {
                return Self::FeedView { items_count };
            }
        }

        Self::Other(fields)
    }
}

impl<'de> Deserialize<'de> for EventPayload {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_fields(fields))
    }
}

impl Default for EventPayload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Map<String, Value>> for EventPayload {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_fields(fields)
    }
}

/// Tolerate malformed stored payloads: substitute the empty object and log,
/// never fail the read.
pub(crate) fn decode_payload(
    parsed: serde_json::Result<EventPayload>,
    event_id: i64,
) -> EventPayload {
    match parsed {
        Ok(payload) => payload,
        Err(err) => {
            warn!(
                event_id,
                error = %err,
                "malformed event payload, substituting empty object"
            );
            EventPayload::empty()
        }
    }
}

/// One immutable record of a user interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Backend-assigned, monotonically increasing per backend instance
    pub id: i64,
    /// Actor id; `"anonymous"` when the caller could not attribute the event
    pub user_id: String,
    /// Open-ended interaction tag (`view`, `load_more`, `surface_switch`, ...)
    pub event_type: String,
    /// Client surface that produced the event (`web`, `mobile`)
    pub surface: String,
    pub payload: EventPayload,
    /// Assigned by the storage engine's clock at insert time
    pub created_at: DateTime<Utc>,
}

/// An event returned by the recent-events reader, with its rank within the
/// `(user_id, event_type)` partition (1 = that user's newest event of that
/// type, independent of the query limit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEvent {
    #[serde(flatten)]
    pub event: AnalyticsEvent,
    pub sequence: i64,
}

/// One `(event_type, surface)` group from the stats window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BreakdownRow {
    pub event_type: String,
    pub surface: String,
    pub count: i64,
    pub unique_users: i64,
}

/// Count and distinct-user count for one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: i64,
    pub unique_users: i64,
}

/// Per-event-type rollup, split by surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeStats {
    pub total: i64,
    pub by_surface: BTreeMap<String, GroupStats>,
}

/// Per-surface rollup, split by event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceStats {
    pub total: i64,
    pub by_event_type: BTreeMap<String, GroupStats>,
}

/// Aggregate statistics over a trailing time window.
///
/// Recomputed from stored events on every request, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedStats {
    /// Sum of all group counts in the window
    pub total_events: i64,
    /// Distinct users across the whole window; not the sum of per-group
    /// unique counts, since one user may appear in several groups
    pub unique_users: i64,
    pub by_event_type: BTreeMap<String, EventTypeStats>,
    pub by_surface: BTreeMap<String, SurfaceStats>,
    /// The raw cross-tabulation rows, for consumers that want them flat
    pub event_type_breakdown: Vec<BreakdownRow>,
}

impl WindowedStats {
    /// Assemble the stats view from grouped rows plus the window's overall
    /// distinct-user count.
    pub(crate) fn from_rows(rows: Vec<BreakdownRow>, unique_users: i64) -> Self {
        let mut total_events = 0;
        let mut by_event_type: BTreeMap<String, EventTypeStats> = BTreeMap::new();
        let mut by_surface: BTreeMap<String, SurfaceStats> = BTreeMap::new();

        for row in &rows {
            total_events += row.count;

            let type_entry = by_event_type
                .entry(row.event_type.clone())
                .or_insert_with(|| EventTypeStats {
                    total: 0,
                    by_surface: BTreeMap::new(),
                });
            type_entry.total += row.count;
            type_entry.by_surface.insert(
                row.surface.clone(),
                GroupStats {
                    count: row.count,
                    unique_users: row.unique_users,
                },
            );

            let surface_entry = by_surface
                .entry(row.surface.clone())
                .or_insert_with(|| SurfaceStats {
                    total: 0,
                    by_event_type: BTreeMap::new(),
                });
            surface_entry.total += row.count;
            surface_entry.by_event_type.insert(
                row.event_type.clone(),
                GroupStats {
                    count: row.count,
                    unique_users: row.unique_users,
                },
            );
        }

        Self {
            total_events,
            unique_users,
            by_event_type,
            by_surface,
            event_type_breakdown: rows,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
