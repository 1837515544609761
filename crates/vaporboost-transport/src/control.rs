//! Manager operations exposed to observers.

use std::sync::Arc;

use async_trait::async_trait;
use vaporboost_core::{
    AccountId, ActivitySlots, ManagerSnapshot, SessionFeed, SessionSnapshot,
    traits::ConnectionFactory,
};
use vaporboost_session::{ManagerError, SessionManager};

/// What a transport may ask of the session manager.
#[async_trait]
pub trait SessionControl: Send + Sync {
    fn report(&self) -> ManagerSnapshot;

    fn feed(&self) -> Arc<SessionFeed>;

    async fn stop_account(&self, id: &AccountId) -> Result<SessionSnapshot, ManagerError>;

    async fn set_activity_slots(
        &self,
        id: &AccountId,
        slots: ActivitySlots,
    ) -> Result<bool, ManagerError>;
}

#[async_trait]
impl<F: ConnectionFactory + 'static> SessionControl for SessionManager<F> {
    fn report(&self) -> ManagerSnapshot {
        Self::report(self)
    }

    fn feed(&self) -> Arc<SessionFeed> {
        Self::feed(self)
    }

    async fn stop_account(&self, id: &AccountId) -> Result<SessionSnapshot, ManagerError> {
        Self::stop_account(self, id).await
    }

    async fn set_activity_slots(
        &self,
        id: &AccountId,
        slots: ActivitySlots,
    ) -> Result<bool, ManagerError> {
        Self::set_activity_slots(self, id, slots).await
    }
}
