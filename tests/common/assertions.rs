//! Event collection helpers

use connect_dl::Event;
use tokio::sync::broadcast::Receiver;

/// Drain every event already sent on `events`
pub fn drain(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Event type tags of `events` in order, e.g. `["job_started", "resolved"]`
pub fn event_types(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            serde_json::to_value(event).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

/// Events belonging to job `index`
pub fn for_job(events: &[Event], index: usize) -> Vec<Event> {
    events
        .iter()
        .filter(|event| job_of(event) == index)
        .cloned()
        .collect()
}

fn job_of(event: &Event) -> usize {
    match event {
        Event::JobStarted { job, .. }
        | Event::Resolved { job, .. }
        | Event::Downloading { job, .. }
        | Event::Extracted { job, .. }
        | Event::Encoding { job, .. }
        | Event::EncoderFallback { job, .. }
        | Event::JobComplete { job, .. }
        | Event::JobFailed { job, .. } => *job,
    }
}
