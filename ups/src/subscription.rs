//! Subscriptions to workitem events:
//! per-workitem or global, with suspension, event filters
//! and deletion locks.

use crate::events::{EventType, UpsEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscription of one application entity to workitem events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// The identifier of this subscription.
    pub subscriber_id: Uuid,
    /// The AE title of the subscriber.
    pub ae_title: String,
    /// The workitem the subscription targets;
    /// `None` subscribes to all workitems.
    pub workitem_uid: Option<String>,
    /// While a non-suspended subscription with this flag exists,
    /// its workitem cannot be deleted.
    pub deletion_lock: bool,
    /// Suspended subscriptions receive no events.
    pub suspended: bool,
    /// When set, only the listed event types are delivered.
    pub event_filter: Option<Vec<EventType>>,
}

impl Subscription {
    /// Whether this subscription wants the given event.
    pub fn matches(&self, event: &UpsEvent) -> bool {
        if self.suspended {
            return false;
        }
        if let Some(uid) = &self.workitem_uid {
            if uid != &event.workitem_uid {
                return false;
            }
        }
        match &self.event_filter {
            Some(filter) => filter.contains(&event.event_type),
            None => true,
        }
    }
}

/// The internally synchronized store of subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    entries: RwLock<Vec<Subscription>>,
}

impl SubscriptionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the subscription of the given AE title
    /// for the given scope, returning its identifier.
    pub fn subscribe(
        &self,
        ae_title: impl Into<String>,
        workitem_uid: Option<String>,
        deletion_lock: bool,
        event_filter: Option<Vec<EventType>>,
    ) -> Uuid {
        let ae_title = ae_title.into();
        let mut entries = self.entries.write();
        // one subscription per (AE title, scope); renewals replace it
        entries.retain(|s| !(s.ae_title == ae_title && s.workitem_uid == workitem_uid));
        let subscription = Subscription {
            subscriber_id: Uuid::new_v4(),
            ae_title,
            workitem_uid,
            deletion_lock,
            suspended: false,
            event_filter,
        };
        let id = subscription.subscriber_id;
        entries.push(subscription);
        id
    }

    /// Remove the subscription of the given AE title for the given scope.
    ///
    /// Removing a subscription which does not exist is not an error.
    pub fn unsubscribe(&self, ae_title: &str, workitem_uid: Option<&str>) {
        let mut entries = self.entries.write();
        entries.retain(|s| {
            !(s.ae_title == ae_title && s.workitem_uid.as_deref() == workitem_uid)
        });
    }

    /// Suspend the subscription of the given AE title for the given scope,
    /// keeping it in place but stopping event delivery.
    /// Reports whether a subscription was found.
    pub fn suspend(&self, ae_title: &str, workitem_uid: Option<&str>) -> bool {
        let mut entries = self.entries.write();
        let mut found = false;
        for s in entries.iter_mut() {
            if s.ae_title == ae_title && s.workitem_uid.as_deref() == workitem_uid {
                s.suspended = true;
                found = true;
            }
        }
        found
    }

    /// The subscriptions interested in the given event.
    pub fn interested(&self, event: &UpsEvent) -> Vec<Subscription> {
        self.entries
            .read()
            .iter()
            .filter(|s| s.matches(event))
            .cloned()
            .collect()
    }

    /// Whether any live (non-suspended) subscription
    /// holds a deletion lock over the given workitem.
    pub fn has_deletion_lock(&self, workitem_uid: &str) -> bool {
        self.entries.read().iter().any(|s| {
            s.deletion_lock
                && !s.suspended
                && s.workitem_uid.as_deref().map(|u| u == workitem_uid).unwrap_or(true)
        })
    }

    /// All current subscriptions.
    pub fn all(&self) -> Vec<Subscription> {
        self.entries.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_for(uid: &str) -> UpsEvent {
        UpsEvent::state_report(uid, crate::model::ProcedureStepState::Completed, None)
    }

    #[test]
    fn global_and_scoped_matching() {
        let store = SubscriptionStore::new();
        store.subscribe("VIEWER", Some("1.2.3".to_string()), false, None);
        store.subscribe("ARCHIVE", None, false, None);

        let interested = store.interested(&event_for("1.2.3"));
        assert_eq!(interested.len(), 2);
        let interested = store.interested(&event_for("9.9.9"));
        assert_eq!(interested.len(), 1);
        assert_eq!(interested[0].ae_title, "ARCHIVE");
    }

    #[test]
    fn suspended_subscriptions_receive_nothing() {
        let store = SubscriptionStore::new();
        store.subscribe("VIEWER", None, false, None);
        assert!(store.suspend("VIEWER", None));
        assert!(store.interested(&event_for("1.2.3")).is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = SubscriptionStore::new();
        store.subscribe("VIEWER", None, false, None);
        store.unsubscribe("VIEWER", None);
        // a second removal has no effect and raises no error
        store.unsubscribe("VIEWER", None);
        assert!(store.all().is_empty());
    }

    #[test]
    fn deletion_lock_tracking() {
        let store = SubscriptionStore::new();
        store.subscribe("VIEWER", Some("1.2.3".to_string()), true, None);
        assert!(store.has_deletion_lock("1.2.3"));
        assert!(!store.has_deletion_lock("9.9.9"));

        // a suspended lock no longer protects the workitem
        store.suspend("VIEWER", Some("1.2.3"));
        assert!(!store.has_deletion_lock("1.2.3"));
    }

    #[test]
    fn event_filter_is_honored() {
        let store = SubscriptionStore::new();
        store.subscribe(
            "VIEWER",
            None,
            false,
            Some(vec![EventType::CancelRequested]),
        );
        assert!(store.interested(&event_for("1.2.3")).is_empty());
        let cancel = UpsEvent::with_payload(
            EventType::CancelRequested,
            "1.2.3",
            None,
            serde_json::json!({}),
        );
        assert_eq!(store.interested(&cancel).len(), 1);
    }
}
