use crate::{
    channel::{Response, handle_response},
    server::ServerError,
};
use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

/// A timing event recorded in the server queue.
///
/// The event is stamped when the server reaches it, so the time between two events covers every
/// task enqueued between them.
#[derive(Debug)]
pub struct Event {
    response: Response<Result<Instant, ServerError>>,
    stamp: OnceLock<Result<Instant, ServerError>>,
}

impl Event {
    pub(crate) fn new(response: Response<Result<Instant, ServerError>>) -> Self {
        Self {
            response,
            stamp: OnceLock::new(),
        }
    }

    /// Blocks until the server reached the event, returning the time it did.
    ///
    /// Errors raised by the tasks enqueued before the event are reported here.
    pub fn synchronize(&self) -> Result<Instant, ServerError> {
        self.stamp
            .get_or_init(|| handle_response(self.response.recv_blocking()))
            .clone()
    }

    /// Whether the server already reached the event.
    pub fn is_complete(&self) -> bool {
        self.stamp.get().is_some() || !self.response.is_empty()
    }

    /// Elapsed time between an earlier event and this one, both are synchronized.
    pub fn elapsed_since(&self, start: &Event) -> Result<Duration, ServerError> {
        let start = start.synchronize()?;
        let end = self.synchronize()?;

        Ok(end.saturating_duration_since(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn elapsed_between_stamps() {
        let (start_tx, start_rx) = async_channel::bounded(1);
        let (end_tx, end_rx) = async_channel::bounded(1);
        let now = Instant::now();

        start_tx.send_blocking(Ok(now)).unwrap();
        end_tx
            .send_blocking(Ok(now + Duration::from_millis(5)))
            .unwrap();

        let start = Event::new(start_rx);
        let end = Event::new(end_rx);

        assert!(end.is_complete());
        assert_eq!(end.elapsed_since(&start), Ok(Duration::from_millis(5)));
        // Stamps are cached once received.
        assert_eq!(start.synchronize(), Ok(now));
    }

    #[test_log::test]
    fn dropped_server_disconnects() {
        let (tx, rx) = async_channel::bounded::<Result<Instant, ServerError>>(1);
        drop(tx);

        assert_eq!(Event::new(rx).synchronize(), Err(ServerError::Disconnected));
    }
}
