//! Desktop notifications over the org.freedesktop.Notifications interface.

use std::collections::HashMap;

use tracing::{debug, warn};
use zbus::zvariant::Value;
use zbus::Connection;

use crate::error::Result;

const NOTIFICATIONS_SERVICE: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";

/// Sends desktop notifications on the session bus.
///
/// Delivery failures are logged and swallowed; a broken notification daemon
/// must never affect scrobbling.
pub struct Notifier {
    connection: Connection,
}

impl Notifier {
    pub async fn connect() -> Result<Self> {
        let connection = Connection::session().await?;
        Ok(Self { connection })
    }

    pub async fn send(&self, summary: &str, body: &str) {
        debug!(summary, body, "sending desktop notification");

        let result = self
            .connection
            .call_method(
                Some(NOTIFICATIONS_SERVICE),
                NOTIFICATIONS_PATH,
                Some(NOTIFICATIONS_SERVICE),
                "Notify",
                &(
                    "scrobbled",                     // app name
                    0_u32,                           // replaces id
                    "",                              // icon
                    summary,
                    body,
                    Vec::<String>::new(),            // actions
                    HashMap::<&str, Value>::new(),   // hints
                    -1_i32,                          // expire timeout
                ),
            )
            .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to send desktop notification");
        }
    }
}
