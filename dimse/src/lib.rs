//! This crate implements the DICOM Message Service Element:
//! the command set codec, the status taxonomy,
//! SCU services (C-ECHO, C-STORE, C-FIND, C-MOVE, C-GET),
//! an SCP dispatcher routing SOP classes to handlers,
//! and the server pool with retry and circuit breaking.

pub mod breaker;
pub mod command;
pub mod pool;
pub mod retry;
pub mod scp;
pub mod scu;
pub mod status;

pub use crate::breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use crate::command::{Message, Priority, SubOperationCounts};
pub use crate::pool::{SelectionStrategy, ServerEntry, ServerPool};
pub use crate::retry::RetryPolicy;
pub use crate::status::{Status, StatusKind};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A signal which network operations poll at their suspension points.
///
/// Cancelling a C-FIND, C-MOVE or C-GET issues a C-CANCEL-RQ
/// with the original message id; the service then runs until the
/// final (Cancel) response arrives from the provider.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a new, untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the cancellation was triggered.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
