// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of tracked units and points, derived from traffic.
//!
//! Updates are last-writer-wins: the most recently processed event for a uid
//! replaces the stored state entirely. No timestamp or sequence check is
//! made, so a late UDP datagram can roll a unit back to older data.

use crate::cot::{Event, MessageKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Server-side state of a tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unit {
    pub uid: String,
    pub callsign: String,
    pub cot_type: String,
    pub kind: MessageKind,
    pub lat: f64,
    pub lon: f64,
    pub hae: f64,
    pub ce: f64,
    pub le: f64,
    pub course: Option<f64>,
    pub speed: Option<f64>,
    pub team: Option<String>,
    pub role: Option<String>,
    pub remarks: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub stale: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

impl Unit {
    /// Project an event onto unit state.
    pub fn from_event(event: &Event, kind: MessageKind) -> Self {
        let detail = event.detail.as_ref();
        let track = detail.and_then(|d| d.track.as_ref());
        let group = detail.and_then(|d| d.group.as_ref());

        Self {
            uid: event.uid.clone(),
            callsign: event.callsign().unwrap_or_default().to_string(),
            cot_type: event.cot_type.clone(),
            kind,
            lat: event.point.lat,
            lon: event.point.lon,
            hae: event.point.hae,
            ce: event.point.ce,
            le: event.point.le,
            course: track.map(|t| t.course),
            speed: track.map(|t| t.speed),
            team: group.map(|g| g.name.clone()).filter(|s| !s.is_empty()),
            role: group.map(|g| g.role.clone()).filter(|s| !s.is_empty()),
            remarks: event.text().map(str::to_string),
            time: event.time,
            stale: event.stale,
            received_at: Utc::now(),
        }
    }
}

/// Tracked units keyed by uid.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: RwLock<HashMap<String, Unit>>,
}

impl UnitRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a unit. Returns the previous state, if any.
    pub async fn upsert(&self, uid: impl Into<String>, unit: Unit) -> Option<Unit> {
        self.units.write().await.insert(uid.into(), unit)
    }

    /// Remove a unit. No-op if absent.
    pub async fn remove(&self, uid: &str) -> Option<Unit> {
        self.units.write().await.remove(uid)
    }

    pub async fn get(&self, uid: &str) -> Option<Unit> {
        self.units.read().await.get(uid).cloned()
    }

    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }

    /// Copy of all units, sorted by uid.
    pub async fn snapshot(&self) -> Vec<Unit> {
        let mut out: Vec<Unit> = self.units.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.uid.cmp(&b.uid));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cot::{Contact, Detail, Group, Remarks, Track};

    fn position(uid: &str, lat: f64, callsign: &str) -> Event {
        let mut event = Event::new("a-f-G-U-C", uid, chrono::Duration::seconds(60));
        event.point.lat = lat;
        event.point.lon = 2.0;
        event.detail = Some(Detail {
            contact: Some(Contact {
                callsign: callsign.into(),
                endpoint: None,
            }),
            ..Default::default()
        });
        event
    }

    #[test]
    fn test_from_event_projection() {
        let mut event = position("A1", 48.0, "ALPHA");
        let detail = event.detail.as_mut().unwrap();
        detail.track = Some(Track {
            course: 270.0,
            speed: 3.5,
        });
        detail.group = Some(Group {
            name: "Cyan".into(),
            role: String::new(),
        });
        detail.remarks = Some(Remarks {
            text: "  on patrol ".into(),
            ..Default::default()
        });

        let unit = Unit::from_event(&event, MessageKind::Unit);
        assert_eq!(unit.uid, "A1");
        assert_eq!(unit.callsign, "ALPHA");
        assert_eq!(unit.lat, 48.0);
        assert_eq!(unit.course, Some(270.0));
        assert_eq!(unit.team.as_deref(), Some("Cyan"));
        assert!(unit.role.is_none());
        assert_eq!(unit.remarks.as_deref(), Some("on patrol"));
        assert_eq!(unit.stale, event.stale);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let reg = UnitRegistry::new();

        let first = Unit::from_event(&position("A1", 10.0, "ALPHA"), MessageKind::Unit);
        let second = Unit::from_event(&position("A1", 20.0, "ALPHA-2"), MessageKind::Unit);

        assert!(reg.upsert("A1", first).await.is_none());
        let previous = reg.upsert("A1", second.clone()).await.unwrap();
        assert_eq!(previous.lat, 10.0);

        assert_eq!(reg.len().await, 1);
        assert_eq!(reg.get("A1").await, Some(second));
    }

    #[tokio::test]
    async fn test_remove() {
        let reg = UnitRegistry::new();
        reg.upsert("A1", Unit::from_event(&position("A1", 1.0, "A"), MessageKind::Unit))
            .await;

        assert!(reg.remove("A1").await.is_some());
        assert!(reg.remove("A1").await.is_none());
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_sorted() {
        let reg = UnitRegistry::new();
        for uid in ["C", "A", "B"] {
            reg.upsert(uid, Unit::from_event(&position(uid, 0.0, uid), MessageKind::Point))
                .await;
        }
        let uids: Vec<_> = reg.snapshot().await.into_iter().map(|u| u.uid).collect();
        assert_eq!(uids, vec!["A", "B", "C"]);
    }
}
