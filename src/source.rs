use async_trait::async_trait;

use crate::batch::MutationKind;
use crate::error::Result;
use crate::types::{RawNotification, ViewerContext};

/// Where notifications come from and where mutations go.
#[async_trait]
pub trait NotificationSource: Send + Sync + std::fmt::Debug {
    /// One full snapshot of the inbox plus who is looking at it
    async fn fetch(&self) -> Result<(Vec<RawNotification>, ViewerContext)>;

    /// One remote call covering every id of a flushed batch.
    /// Thread ids, or subject ids for kinds that target the subject.
    async fn mutate(&self, kind: MutationKind, ids: &[String]) -> Result<()>;

    /// Submit an approving review on a pull request
    async fn approve(&self, subject_id: &str) -> Result<()>;
}
