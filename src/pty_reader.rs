use anyhow::{Context, Result};
use std::io::{ErrorKind, Read};
use std::sync::mpsc::{Receiver, channel};
use std::thread;
use tracing::trace;

/// Upper bound on a single read from the PTY master.
pub const CHUNK_SIZE: usize = 4096;

/// Spawns a background thread that pumps the PTY master into a channel.
///
/// The channel disconnects once the master reports EOF or an error (Linux
/// returns `EIO` after the last slave handle closes), which is how callers
/// observe that the stream is gone.
pub fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Result<Receiver<Vec<u8>>> {
    let (tx, rx) = channel();

    thread::Builder::new()
        .name("pty-reader".into())
        .spawn(move || {
            let mut buffer = [0u8; CHUNK_SIZE];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break; // drain side went away
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        trace!(error = %e, "pty reader stopped");
                        break;
                    }
                }
            }
        })
        .context("Failed to start PTY reader thread")?;

    Ok(rx)
}
