use crate::request::ReceivedRequest;
use std::sync::RwLock;
use std::time::SystemTime;

/// Append-only record of every request received by one endpoint, in arrival order.
///
/// Appends are serialised behind a lock; readers get a snapshot and never block appends for
/// longer than it takes to clone the current entries.
#[derive(Debug, Default)]
pub(crate) struct RequestLog {
    entries: RwLock<Vec<ReceivedRequest>>,
}

impl RequestLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `request`, stamping it with its position in the log and the time it was logged.
    pub(crate) fn append(&self, mut request: ReceivedRequest) -> u64 {
        let mut entries = self.entries.write().expect("Poisoned lock!");
        let sequence = entries.len() as u64;
        request.sequence = sequence;
        request.received_at = SystemTime::now();
        entries.push(request);
        sequence
    }

    pub(crate) fn snapshot(&self) -> Vec<ReceivedRequest> {
        self.entries.read().expect("Poisoned lock!").clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().expect("Poisoned lock!").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;
    use http::Method;
    use std::sync::Arc;
    use std::time::UNIX_EPOCH;

    #[test]
    fn entries_keep_arrival_order_and_sequence_numbers() {
        let log = RequestLog::new();

        log.append(test_request(Method::GET, "/first", b""));
        log.append(test_request(Method::POST, "/second", b"body"));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].uri, "/first");
        assert_eq!(snapshot[0].sequence, 0);
        assert_eq!(snapshot[1].uri, "/second");
        assert_eq!(snapshot[1].sequence, 1);
    }

    #[test]
    fn timestamps_are_taken_when_the_request_is_logged() {
        let log = RequestLog::new();
        let mut request = test_request(Method::GET, "/stale", b"");
        request.received_at = UNIX_EPOCH;

        let before = SystemTime::now();
        log.append(request);

        assert!(log.snapshot()[0].received_at >= before);
    }

    #[test]
    fn a_snapshot_is_not_affected_by_later_appends() {
        let log = RequestLog::new();
        log.append(test_request(Method::GET, "/a", b""));

        let snapshot = log.snapshot();
        log.append(test_request(Method::GET, "/b", b""));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn concurrent_appends_are_all_recorded_once() {
        let log = Arc::new(RequestLog::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        log.append(test_request(Method::GET, &format!("/{}/{}", i, j), b""));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 400);
        assert!(snapshot
            .iter()
            .enumerate()
            .all(|(i, r)| r.sequence == i as u64));
        assert!(snapshot
            .windows(2)
            .all(|pair| pair[0].received_at <= pair[1].received_at));
    }
}
