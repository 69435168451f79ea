//! Per-connection server-sent event stream for a room.

/// SSE event name telling a client to re-fetch its room.
pub const REFRESH_CELL_EVENT: &str = "refresh-cell";

/// Path of a room's event stream.
pub fn subscribe_path(room_id: &str) -> String {
    format!("/rooms/{}/subscribe", room_id)
}

#[cfg(feature = "ssr")]
pub use self::server::*;

#[cfg(feature = "ssr")]
mod server {
    use axum::extract::{Extension, Path};
    use axum::http::StatusCode;
    use axum::response::sse::{Event, KeepAlive, Sse};
    use futures::{Stream, StreamExt};
    use leptos::logging::{error, log};
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::REFRESH_CELL_EVENT;
    use crate::app::DbPool;
    use crate::error::{HandlerError, SyncError};
    use crate::notifier::{ChangeNotifier, Subscription};
    use crate::room_exists;

    /// A "cell refresh requested" message for one connected client.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RefreshCell {
        pub cell_id: String,
    }

    impl RefreshCell {
        pub fn into_event(self) -> Event {
            Event::default().event(REFRESH_CELL_EVENT).data(self.cell_id)
        }
    }

    /// One open event stream. Holds the notifier subscription for as long as it is alive;
    /// dropping the stream, which axum does when the client goes away, unsubscribes.
    pub struct RoomEventStream {
        room_id: String,
        // Declared first so the handler is removed before the channel closes.
        subscription: Option<Subscription>,
        receiver: UnboundedReceiver<String>,
    }

    impl RoomEventStream {
        pub fn open(notifier: &ChangeNotifier, room_id: &str) -> Self {
            let (sender, receiver) = mpsc::unbounded_channel();
            let subscription = notifier.subscribe_room(room_id, move |change| {
                sender
                    .send(change.cell_id.clone())
                    .map_err(|_| HandlerError::Disconnected)
            });
            log!("Opened event stream {} for room {}", subscription.id(), room_id);
            RoomEventStream {
                room_id: room_id.to_string(),
                subscription: Some(subscription),
                receiver,
            }
        }

        pub fn room_id(&self) -> &str {
            &self.room_id
        }

        /// Stops listening. Refreshes already queued are still yielded.
        pub fn close(&mut self) {
            if let Some(subscription) = self.subscription.take() {
                log!("Closed event stream {} for room {}", subscription.id(), self.room_id);
            }
        }
    }

    impl Drop for RoomEventStream {
        fn drop(&mut self) {
            self.close();
        }
    }

    impl Stream for RoomEventStream {
        type Item = RefreshCell;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.receiver
                .poll_recv(cx)
                .map(|cell_id| cell_id.map(|cell_id| RefreshCell { cell_id }))
        }
    }

    /// `GET /rooms/{room_id}/subscribe`
    pub async fn subscribe_to_room(
        Path(room_id): Path<String>,
        Extension(pool): Extension<DbPool>,
        Extension(notifier): Extension<ChangeNotifier>,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
        let lookup_id = room_id.clone();
        let exists = tokio::task::spawn_blocking(move || -> Result<bool, SyncError> {
            let mut conn = pool.get()?;
            room_exists(&mut conn, &lookup_id)
        })
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            error!("Could not look up room {}: {}", room_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
        if !exists {
            return Err((StatusCode::NOT_FOUND, format!("Room {} does not exist", room_id)));
        }

        let stream = RoomEventStream::open(&notifier, &room_id)
            .map(|refresh| Ok::<_, Infallible>(refresh.into_event()));
        Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
    }
}
