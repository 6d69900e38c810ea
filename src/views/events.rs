//! Event lookup for the node and pod detail panes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use kube::ResourceExt;

use crate::views::types::EventView;

/// Ordering timestamp: lastTimestamp, falling back to eventTime when unset.
fn event_time(event: &Event) -> Option<DateTime<Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
}

fn to_view(event: &Event) -> EventView {
    EventView {
        name: event.name_any(),
        namespace: event.namespace().unwrap_or_default(),
        event_type: event.type_.clone().unwrap_or_default(),
        reason: event.reason.clone().unwrap_or_default(),
        message: event.message.clone().unwrap_or_default(),
        involved_kind: event.involved_object.kind.clone().unwrap_or_default(),
        involved_name: event.involved_object.name.clone().unwrap_or_default(),
        count: event.count.unwrap_or(0),
        last_seen: event_time(event),
    }
}

/// Events involving one object, newest first; ties break on event name so
/// repeated renders are stable.
fn involving(events: &[Arc<Event>], kind: &str, namespace: Option<&str>, name: &str) -> Vec<EventView> {
    let mut views: Vec<EventView> = events
        .iter()
        .filter(|e| {
            e.involved_object.kind.as_deref() == Some(kind)
                && e.involved_object.name.as_deref() == Some(name)
                && namespace
                    .map(|ns| e.namespace().as_deref() == Some(ns))
                    .unwrap_or(true)
        })
        .map(|e| to_view(e))
        .collect();
    views.sort_by(|a, b| {
        b.last_seen
            .cmp(&a.last_seen)
            .then_with(|| a.name.cmp(&b.name))
    });
    views
}

pub fn events_for_node(events: &[Arc<Event>], node: &str) -> Vec<EventView> {
    involving(events, "Node", None, node)
}

pub fn events_for_pod(events: &[Arc<Event>], namespace: &str, pod: &str) -> Vec<EventView> {
    involving(events, "Pod", Some(namespace), pod)
}
