use crate::batch::{BatchId, MutationKind};
use crate::event::KeyInput;
use crate::timer::TimerKey;
use crate::types::{RawNotification, ViewerContext};

#[derive(Debug, Clone)]
pub enum Action {
    Key(KeyInput),

    // Loading
    Refresh,
    FetchCompleted {
        notifications: Vec<RawNotification>,
        viewer: ViewerContext,
        load_id: u64,
    },
    FetchFailed {
        message: String,
        load_id: u64,
    },

    // Timers
    TimerFired {
        key: TimerKey,
        generation: u64,
    },

    // Remote mutations
    BatchSettled {
        batch: BatchId,
        kind: MutationKind,
        error: Option<String>,
    },
    ApproveSettled {
        id: String,
        error: Option<String>,
    },

    None,
}
