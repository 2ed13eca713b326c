//! User confirmation before a sync touches the tree.

use async_trait::async_trait;

use crate::session::SyncPlan;

/// Answer to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Go ahead.
    Proceed,
    /// The user said no.
    Decline,
    /// No answer arrived in time. Treated like a decline.
    TimedOut,
}

impl Confirmation {
    /// Whether the sync may proceed.
    pub fn is_proceed(self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Asks whether a planned sync should run.
///
/// Implemented by the CLI prompt and by test doubles.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, plan: &SyncPlan) -> Confirmation;
}

/// Always proceeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _plan: &SyncPlan) -> Confirmation {
        Confirmation::Proceed
    }
}
