//! The UPS domain error taxonomy.

use crate::model::ProcedureStepState;
use snafu::{Backtrace, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("workitem {} does not exist", uid))]
    WorkitemNotFound { uid: String, backtrace: Backtrace },

    #[snafu(display("workitem {} already exists", uid))]
    AlreadyExists { uid: String, backtrace: Backtrace },

    #[snafu(display(
        "state transition {} -> {} is not allowed for workitem {}",
        from,
        to,
        uid
    ))]
    InvalidStateTransition {
        uid: String,
        from: ProcedureStepState,
        to: ProcedureStepState,
        backtrace: Backtrace,
    },

    #[snafu(display("a transaction UID is required to claim workitem {}", uid))]
    TransactionUidRequired { uid: String, backtrace: Backtrace },

    #[snafu(display("transaction UID does not match the one recorded for workitem {}", uid))]
    TransactionUidMismatch { uid: String, backtrace: Backtrace },

    #[snafu(display("workitem {} is in the terminal state {}", uid, state))]
    TerminalState {
        uid: String,
        state: ProcedureStepState,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "workitem {} is protected by a deletion lock and cannot be deleted",
        uid
    ))]
    DeletionLocked { uid: String, backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
