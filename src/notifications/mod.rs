pub mod models;
pub mod routes;

use uuid::Uuid;

use crate::notifications::models::Notification;
use crate::store::{self, Store};

pub async fn notify(
    store: &dyn Store,
    user_id: Uuid,
    title: &str,
    message: &str,
) -> store::Result<Notification> {
    store.create_notification(user_id, title, message).await
}

/// Like [`notify`], but a failure is only logged. For side effects that
/// follow an already committed change.
pub async fn notify_best_effort(store: &dyn Store, user_id: Uuid, title: &str, message: &str) {
    if let Err(e) = notify(store, user_id, title, message).await {
        tracing::warn!(%user_id, "Failed to create notification: {e}");
    }
}
