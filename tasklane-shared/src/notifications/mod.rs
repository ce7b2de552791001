//! Notification delivery
//!
//! [`notify`] stores a notification and pushes it to the recipient's room on
//! the [`NotificationHub`] unless the recipient turned push notifications off.

pub mod hub;

pub use hub::{organization_room, user_room, HubMessage, NotificationHub};

use sqlx::PgPool;

use crate::models::notification::{CreateNotification, Notification};
use crate::models::settings::Settings;

/// Persists a notification and publishes it to the user's room.
///
/// Delivery is best effort; a missing subscriber or a settings lookup
/// failure never fails the call once the row is stored.
#[tracing::instrument(skip(pool, hub, data), fields(user_id = %data.user_id, kind = data.kind.as_str()))]
pub async fn notify(
    pool: &PgPool,
    hub: &NotificationHub,
    data: CreateNotification,
) -> Result<Notification, sqlx::Error> {
    let notification = Notification::create(pool, data).await?;

    let push = match Settings::push_enabled(pool, notification.user_id).await {
        Ok(enabled) => enabled,
        Err(e) => {
            tracing::warn!(error = %e, "could not read push preference");
            true
        }
    };

    if push {
        let delivered = hub
            .publish(
                &user_room(notification.user_id),
                &HubMessage::Notification {
                    data: notification.clone(),
                },
            )
            .await;
        tracing::debug!(delivered, "notification published");
    }

    Ok(notification)
}
