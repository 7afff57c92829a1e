use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::{controller::AppState, domain::StudyId, notification::StudyNotification};

pub fn routes() -> Router<AppState> {
    Router::new().route("/studies/:study_id/notifications", get(subscribe))
}

/// Server-sent `study.update` events of one study; the headers become the
/// event data.
pub async fn subscribe(
    State(st): State<AppState>,
    Path(study_id): Path<StudyId>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = st.notifications.subscribe();
    Sse::new(study_events(rx, study_id)).keep_alive(KeepAlive::default())
}

fn study_events(
    rx: broadcast::Receiver<StudyNotification>,
    study_id: StudyId,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) if notification.study_uuid == study_id => {
                    let event = Event::default()
                        .event("study.update")
                        .json_data(notification.headers())
                        .unwrap_or_else(|_| Event::default().event("study.update"));
                    return Some((Ok(event), rx));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(study_id = %study_id, skipped, "notification subscriber lagging");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
