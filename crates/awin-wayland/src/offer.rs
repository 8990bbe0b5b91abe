//! Clipboard transfers over the pipes `wl_data_offer.receive` and
//! `wl_data_source.send` hand out.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;

use tracing::debug;

pub const TEXT_MIME: &str = "text/plain;charset=utf-8";

/// Text types in order of preference.
pub const TEXT_MIMES: [&str; 5] = [TEXT_MIME, "UTF8_STRING", "text/plain", "STRING", "TEXT"];

pub fn is_text_mime(mime: &str) -> bool {
    TEXT_MIMES.contains(&mime)
}

pub fn best_text_mime(offered: &[String]) -> Option<&'static str> {
    TEXT_MIMES
        .iter()
        .copied()
        .find(|wanted| offered.iter().any(|mime| mime == wanted))
}

/// Reads until the writer closes its end. Interrupted reads are retried.
pub fn read_to_end(fd: OwnedFd) -> io::Result<Vec<u8>> {
    let mut file = File::from(fd);
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match file.read(&mut chunk) {
            Ok(0) => return Ok(data),
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                debug!("clipboard read interrupted, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn write_all(fd: OwnedFd, mut data: &[u8]) -> io::Result<()> {
    let mut file = File::from(fd);
    while !data.is_empty() {
        match file.write(data) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nix::fcntl::OFlag;
    use nix::unistd::pipe2;

    use super::*;

    #[test]
    fn test_prefers_utf8_text() {
        let offered = vec!["text/html".to_owned(), "STRING".to_owned(), TEXT_MIME.to_owned()];
        assert_eq!(best_text_mime(&offered), Some(TEXT_MIME));
        assert_eq!(best_text_mime(&offered[..2]), Some("STRING"));
        assert_eq!(best_text_mime(&["image/png".to_owned()]), None);
        assert!(is_text_mime("UTF8_STRING"));
    }

    #[test]
    fn test_pipe_transfer_to_eof() {
        let (reader, writer) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let text = "x".repeat(100_000);
        let payload = text.clone();
        let sender = std::thread::spawn(move || write_all(writer, payload.as_bytes()));
        let received = read_to_end(reader).unwrap();
        sender.join().unwrap().unwrap();
        assert_eq!(received, text.as_bytes());
    }

    #[test]
    fn test_empty_transfer() {
        let (reader, writer) = pipe2(OFlag::O_CLOEXEC).unwrap();
        drop(writer);
        assert!(read_to_end(reader).unwrap().is_empty());
    }
}
