//! This crate implements the Unified Procedure Step worklist subsystem:
//! the workitem model and its state machine, an internally synchronized
//! workitem store with atomic state changes, subscriptions with deletion
//! locks, asynchronous event dispatch, the DICOM-JSON codec,
//! and a client for the UPS-RS HTTP binding.

pub mod client;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod json;
pub mod model;
pub mod store;
pub mod subscription;

pub use crate::client::UpsRsClient;
pub use crate::dispatch::{DeliveryService, DispatchConfig, EventDispatcher};
pub use crate::engine::UpsEngine;
pub use crate::error::Error;
pub use crate::events::{EventType, UpsEvent};
pub use crate::model::{ProcedureStepState, UpsPriority, Workitem};
pub use crate::store::{InMemoryWorkitemStore, WorkitemPatch, WorkitemQuery, WorkitemStore};
pub use crate::subscription::{Subscription, SubscriptionStore};
