use std::sync::Arc;

use aptsync_dl::types::{Progress, Resource};
use aptsync_events::{EventSinkHandle, SyncEvent};

/// Creates a fetch progress callback that forwards to the event sink.
///
/// The returned closure is passed to
/// [`aptsync_dl::fetcher::Fetcher::download_resources`].
pub fn create_progress_bridge(events: EventSinkHandle) -> Arc<dyn Fn(&Resource, Progress) + Send + Sync> {
    Arc::new(move |resource: &Resource, progress: Progress| {
        let resource = resource.name.clone();
        let event = match progress {
            Progress::Starting {
                total,
            } => {
                SyncEvent::FetchStarting {
                    resource,
                    total,
                }
            }
            Progress::Chunk {
                current,
                total,
            } => {
                SyncEvent::FetchProgress {
                    resource,
                    current,
                    total,
                }
            }
            Progress::Complete {
                total,
            } => {
                SyncEvent::FetchComplete {
                    resource,
                    total,
                }
            }
        };
        events.emit(event);
    })
}
