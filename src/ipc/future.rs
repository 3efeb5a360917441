// src/ipc/future.rs
//! One-shot interprocess future/promise
//!
//! The producing process writes exactly one frame (a tag byte followed by a
//! bincode payload) and closes the channel; closing is part of producer
//! cleanup and is what lets the consumer read to end-of-stream. The promise
//! is consumed by `set_value`/`set_error`, so the one-legal-transition rule
//! is enforced by the type system rather than a runtime state machine.
//!
//! Producers are synchronous (they run inside agent processes with no async
//! runtime); the consumer side is async and lives in the requesting process.

use crate::rma::world::GroupWorld;
use crate::utils::errors::{CohortError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::os::fd::{FromRawFd, RawFd};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tracing::debug;

const TAG_VALUE: u8 = 0x56;
const TAG_ERROR: u8 = 0x45;

enum ReplySink {
    Pipe(File),
    Tcp(std::net::TcpStream),
}

/// Producer half: writes a single value or failure frame, then closes
pub struct InterprocessPromise<T> {
    sink: ReplySink,
    _marker: PhantomData<fn(T)>,
}

impl<T: Serialize> InterprocessPromise<T> {
    /// Bind the promise to a connected socket on the requesting process
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        debug!("connecting result channel to {}", addr);
        let stream = std::net::TcpStream::connect(addr)?;
        Ok(Self {
            sink: ReplySink::Tcp(stream),
            _marker: PhantomData,
        })
    }

    /// Bind the promise to an open pipe write end
    pub fn from_pipe(file: File) -> Self {
        Self {
            sink: ReplySink::Pipe(file),
            _marker: PhantomData,
        }
    }

    /// Reconstruct the promise from a pipe file descriptor inherited across
    /// exec.
    ///
    /// # Safety
    ///
    /// `fd` must be the open write end of a pipe this process inherited and
    /// exclusively owns; the returned promise takes ownership and closes it.
    pub unsafe fn from_inherited_fd(fd: RawFd) -> Self {
        Self::from_pipe(File::from_raw_fd(fd))
    }

    /// Resolve the paired future with a value
    pub fn set_value(self, value: &T) -> Result<()> {
        let payload = bincode::serialize(value)?;
        self.write_frame(TAG_VALUE, &payload)
    }

    /// Resolve the paired future with a failure
    pub fn set_error(self, message: &str) -> Result<()> {
        let payload = bincode::serialize(message)?;
        self.write_frame(TAG_ERROR, &payload)
    }

    fn write_frame(self, tag: u8, payload: &[u8]) -> Result<()> {
        let mut sink: Box<dyn Write> = match self.sink {
            ReplySink::Pipe(file) => Box::new(file),
            ReplySink::Tcp(stream) => Box::new(stream),
        };
        sink.write_all(&[tag])?;
        sink.write_all(payload)?;
        sink.flush()?;
        // dropping the sink closes the channel: end-of-data for the reader
        Ok(())
    }
}

enum ReplySource {
    Pipe(File),
    Listener(TcpListener),
}

/// Consumer half: blocks in `get` until the single frame arrives
pub struct InterprocessFuture<T> {
    source: ReplySource,
    // keeps the group's world file alive until the result has been read
    _world: Option<GroupWorld>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Send + 'static> InterprocessFuture<T> {
    /// Future bound to an open pipe read end
    pub fn from_pipe(file: File) -> Self {
        Self {
            source: ReplySource::Pipe(file),
            _world: None,
            _marker: PhantomData,
        }
    }

    /// Future bound to a listening socket the producing agent will connect to
    pub fn from_listener(listener: TcpListener, world: GroupWorld) -> Self {
        Self {
            source: ReplySource::Listener(listener),
            _world: Some(world),
            _marker: PhantomData,
        }
    }

    /// Wait for the frame and decode it.
    ///
    /// Returns the value, the producer's failure as an error, or
    /// [`CohortError::ChannelClosed`] if the channel closed before a complete
    /// frame arrived.
    pub async fn get(self) -> Result<T> {
        let bytes = match self.source {
            ReplySource::Pipe(file) => {
                tokio::task::spawn_blocking(move || {
                    let mut file = file;
                    let mut buf = Vec::new();
                    file.read_to_end(&mut buf)?;
                    Ok::<_, std::io::Error>(buf)
                })
                .await
                .map_err(|e| CohortError::Runtime(format!("reader task failed: {}", e)))??
            }
            ReplySource::Listener(listener) => {
                let (mut stream, peer) = listener.accept().await?;
                debug!("result channel accepted from {}", peer);
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await?;
                buf
            }
        };

        decode_frame(&bytes)
    }
}

fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    match bytes.split_first() {
        Some((&TAG_VALUE, payload)) => Ok(bincode::deserialize(payload)?),
        Some((&TAG_ERROR, payload)) => {
            let message: String = bincode::deserialize(payload)?;
            Err(CohortError::AgentFailed(message))
        }
        _ => Err(CohortError::ChannelClosed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pipe_pair<T: Serialize + DeserializeOwned + Send + 'static>(
    ) -> (InterprocessFuture<T>, InterprocessPromise<T>) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (
            InterprocessFuture::from_pipe(unsafe { File::from_raw_fd(read_end) }),
            InterprocessPromise::from_pipe(unsafe { File::from_raw_fd(write_end) }),
        )
    }

    #[tokio::test]
    async fn test_pipe_delivers_value() {
        let (future, promise) = pipe_pair::<Vec<u32>>();

        let producer = thread::spawn(move || {
            promise.set_value(&vec![1, 2, 3]).unwrap();
        });

        assert_eq!(future.get().await.unwrap(), vec![1, 2, 3]);
        producer.join().unwrap();
    }

    #[tokio::test]
    async fn test_pipe_delivers_failure() {
        let (future, promise) = pipe_pair::<u32>();

        let producer = thread::spawn(move || {
            promise.set_error("an agent failed").unwrap();
        });

        let err = future.get().await.unwrap_err();
        assert!(matches!(err, CohortError::AgentFailed(_)));
        producer.join().unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_without_frame() {
        let (future, promise) = pipe_pair::<u32>();
        // producer goes away without resolving
        drop(promise);

        let err = future.get().await.unwrap_err();
        assert!(matches!(err, CohortError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_tcp_delivery() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = crate::utils::config::CohortConfig {
            world_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let world = GroupWorld::create(&config, 1).unwrap();
        let future = InterprocessFuture::<u64>::from_listener(listener, world);

        let producer = thread::spawn(move || {
            let promise = InterprocessPromise::<u64>::connect(addr).unwrap();
            promise.set_value(&7).unwrap();
        });

        assert_eq!(future.get().await.unwrap(), 7);
        producer.join().unwrap();
    }
}
