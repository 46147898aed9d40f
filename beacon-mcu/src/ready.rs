//! One-shot readiness signal from the radio stack
//!
//! BLE stacks report "host ready" from their own task. The callback only
//! gets a `ReadyNotifier`; the controller blocks on the `ReadyWaiter` before
//! it advertises. Neither side touches the retained block.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

/// Stack error code, as reported by the radio's ready callback
pub type StackError = i32;

pub fn ready_channel() -> (ReadyNotifier, ReadyWaiter) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ReadyNotifier(tx), ReadyWaiter(rx))
}

/// Sending half, handed to the transport. Consumed on use.
#[derive(Debug)]
pub struct ReadyNotifier(SyncSender<Result<(), StackError>>);

impl ReadyNotifier {
    pub fn notify(self, result: Result<(), StackError>) {
        // The waiter may have timed out and gone away; nobody left to tell.
        let _ = self.0.try_send(result);
    }

    pub fn ready(self) {
        self.notify(Ok(()))
    }

    pub fn failed(self, code: StackError) {
        self.notify(Err(code))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadyError {
    #[error("radio stack failed to initialize (err {0})")]
    Failed(StackError),
    #[error("radio stack not ready after {0:?}")]
    Timeout(Duration),
    #[error("radio stack dropped its ready callback")]
    Dropped,
}

#[derive(Debug)]
pub struct ReadyWaiter(Receiver<Result<(), StackError>>);

impl ReadyWaiter {
    pub fn wait(self, timeout: Duration) -> Result<(), ReadyError> {
        match self.0.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(code)) => Err(ReadyError::Failed(code)),
            Err(RecvTimeoutError::Timeout) => Err(ReadyError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ReadyError::Dropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_from_another_thread() {
        let (notifier, waiter) = ready_channel();
        let handle = std::thread::spawn(move || notifier.ready());
        assert_eq!(waiter.wait(Duration::from_secs(5)), Ok(()));
        handle.join().unwrap();
    }

    #[test]
    fn failure_code_is_forwarded() {
        let (notifier, waiter) = ready_channel();
        notifier.failed(-5);
        assert_eq!(waiter.wait(Duration::from_millis(10)), Err(ReadyError::Failed(-5)));
    }

    #[test]
    fn silent_stack_times_out() {
        let (notifier, waiter) = ready_channel();
        let timeout = Duration::from_millis(20);
        assert_eq!(waiter.wait(timeout), Err(ReadyError::Timeout(timeout)));
        drop(notifier);
    }

    #[test]
    fn dropped_notifier_is_reported() {
        let (notifier, waiter) = ready_channel();
        drop(notifier);
        assert_eq!(waiter.wait(Duration::from_secs(1)), Err(ReadyError::Dropped));
    }
}
