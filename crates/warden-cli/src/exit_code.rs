//! Process exit codes (§6) and the channel the rest of the daemon uses to
//! request a shutdown and say why. `main` maps the daemon's fatal-error
//! taxonomy (§7) onto these via [`ShutdownReason::exit_code`].

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Normal = 0,
    Fatal = 1,
    ServiceFailure = 10,
    CheckFailure = 11,
    SocketRestart = 42,
}

/// Why the daemon is winding down. `Signal` is the ordinary path; the
/// other two are the watchdog's fatal findings (§6 exit codes 10/11);
/// `SocketRestart` is a failed/lost API listener, a hint to whatever
/// supervises this process (systemd, an init script) to restart it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal,
    ServiceFailure,
    CheckFailure,
    SocketRestart,
}

impl ShutdownReason {
    pub fn exit_code(self) -> ExitCode {
        match self {
            ShutdownReason::Signal => ExitCode::Normal,
            ShutdownReason::ServiceFailure => ExitCode::ServiceFailure,
            ShutdownReason::CheckFailure => ExitCode::CheckFailure,
            ShutdownReason::SocketRestart => ExitCode::SocketRestart,
        }
    }
}

/// A single-shot "please shut down, and here's why" request: whichever of
/// the signal funnel or the watchdog gets there first wins, and later
/// callers are no-ops (`send_if_modified` only commits the first `Some`).
#[derive(Clone)]
pub struct ShutdownRequest {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownRequest {
    pub fn new() -> (Self, watch::Receiver<Option<ShutdownReason>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    pub fn request(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_the_documented_table() {
        assert_eq!(ShutdownReason::Signal.exit_code() as i32, 0);
        assert_eq!(ExitCode::Fatal as i32, 1);
        assert_eq!(ShutdownReason::ServiceFailure.exit_code() as i32, 10);
        assert_eq!(ShutdownReason::CheckFailure.exit_code() as i32, 11);
        assert_eq!(ShutdownReason::SocketRestart.exit_code() as i32, 42);
    }

    #[test]
    fn first_request_wins() {
        let (request, rx) = ShutdownRequest::new();
        request.request(ShutdownReason::ServiceFailure);
        request.request(ShutdownReason::CheckFailure);
        assert_eq!(*rx.borrow(), Some(ShutdownReason::ServiceFailure));
    }
}
