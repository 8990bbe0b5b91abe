//! Self-pipe used to interrupt a blocking wait, plus the readiness poll
//! every POSIX backend blocks in.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe2;
use tracing::trace;

use crate::Waker;

pub struct WakePipe {
    reader: File,
    writer: Arc<File>,
}

impl WakePipe {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;
        Ok(Self {
            reader: File::from(reader),
            writer: Arc::new(File::from(writer)),
        })
    }

    pub fn read_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }

    /// Empties the pipe after it polled readable.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        while let Ok(n) = (&self.reader).read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    }

    pub fn waker(&self) -> Arc<dyn Waker> {
        Arc::new(PipeWaker(Arc::clone(&self.writer)))
    }
}

struct PipeWaker(Arc<File>);

impl Waker for PipeWaker {
    fn wake(&self) {
        // a full pipe already guarantees a wake
        if let Err(err) = (&*self.0).write(&[0]) {
            if err.kind() != io::ErrorKind::WouldBlock {
                trace!(%err, "wake pipe write failed");
            }
        }
    }
}

fn poll_timeout(timeout: Option<Duration>) -> PollTimeout {
    match timeout {
        None => PollTimeout::NONE,
        Some(duration) => {
            let millis = duration.as_nanos().div_ceil(1_000_000);
            i32::try_from(millis)
                .ok()
                .and_then(|ms| PollTimeout::try_from(ms).ok())
                .unwrap_or(PollTimeout::MAX)
        }
    }
}

/// Blocks until one of `fds` is readable or the timeout passes. Returns the
/// readiness of each descriptor; an interrupted wait reports none ready.
pub fn wait_readable(fds: &[BorrowedFd<'_>], timeout: Option<Duration>) -> io::Result<Vec<bool>> {
    let mut poll_fds: Vec<PollFd<'_>> =
        fds.iter().map(|fd| PollFd::new(*fd, PollFlags::POLLIN)).collect();
    let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
    match poll(&mut poll_fds, poll_timeout(timeout)) {
        Ok(_) => Ok(poll_fds
            .iter()
            .map(|fd| fd.revents().is_some_and(|r| r.intersects(ready)))
            .collect()),
        Err(Errno::EINTR) => Ok(vec![false; fds.len()]),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_makes_pipe_readable() {
        let pipe = WakePipe::new().unwrap();
        let ready = wait_readable(&[pipe.read_fd()], Some(Duration::ZERO)).unwrap();
        assert_eq!(ready, vec![false]);

        pipe.waker().wake();
        let ready = wait_readable(&[pipe.read_fd()], Some(Duration::from_millis(100))).unwrap();
        assert_eq!(ready, vec![true]);

        pipe.drain();
        let ready = wait_readable(&[pipe.read_fd()], Some(Duration::ZERO)).unwrap();
        assert_eq!(ready, vec![false]);
    }

    #[test]
    fn test_waker_crosses_threads() {
        let pipe = WakePipe::new().unwrap();
        let waker = pipe.waker();
        std::thread::spawn(move || waker.wake()).join().unwrap();
        let ready = wait_readable(&[pipe.read_fd()], Some(Duration::from_secs(1))).unwrap();
        assert_eq!(ready, vec![true]);
    }

    #[test]
    fn test_timeout_rounds_up() {
        let one_ms = PollTimeout::try_from(1i32).unwrap();
        assert_eq!(poll_timeout(Some(Duration::from_micros(1))), one_ms);
        assert_eq!(poll_timeout(None), PollTimeout::NONE);
    }
}
