//! IPC transport over a Unix-domain socket
//!
//! Nodes expose their IPC endpoint as a socket file (`geth.ipc`). Frames are
//! newline-delimited JSON documents.
#![cfg(unix)]

use super::{close_signal, until_closed, CloseFlag, FrameStream, Transport};
use async_trait::async_trait;
use async_web3_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{oneshot, Mutex};

/// JSON-RPC over a Unix-domain socket
pub struct IpcTransport {
    path: PathBuf,
    writer: Mutex<Option<OwnedWriteHalf>>,
    write_side: CloseFlag,
    inbound: Mutex<Option<(Lines<BufReader<OwnedReadHalf>>, oneshot::Receiver<()>)>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl IpcTransport {
    /// Create a transport for the socket at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(None),
            write_side: CloseFlag::new(),
            inbound: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    /// Socket path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&self, line: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::NotConnected)?;
        writer.write_all(line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn release(&self) -> Option<OwnedWriteHalf> {
        // Fail blocked writes first so the writer lock frees up.
        self.write_side.close();
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        self.inbound.lock().await.take();
        self.writer.lock().await.take()
    }
}

#[async_trait]
impl Transport for IpcTransport {
    async fn connect(&self) -> Result<()> {
        if let Some(mut stale) = self.release().await {
            let _ = stale.shutdown().await;
        }

        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", self.path.display(), e)))?;
        let (read, write) = stream.into_split();
        let (shutdown_tx, shutdown_rx) = close_signal();

        *self.writer.lock().await = Some(write);
        *self.inbound.lock().await = Some((BufReader::new(read).lines(), shutdown_rx));
        *self.shutdown.lock().await = Some(shutdown_tx);
        self.write_side.open();

        tracing::debug!(path = %self.path.display(), "IPC socket connected");
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        let mut line = frame.into_bytes();
        line.push(b'\n');

        tokio::select! {
            written = self.write_line(&line) => written,
            _ = self.write_side.closed() => Err(Error::NotConnected),
        }
    }

    async fn receive(&self) -> Result<FrameStream> {
        let (lines, closed) = self.inbound.lock().await.take().ok_or(Error::NotConnected)?;

        let frames = futures::stream::unfold(Some(lines), |state| async move {
            let mut lines = state?;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => return Some((Ok(line), Some(lines))),
                    Ok(None) => return None,
                    Err(e) => return Some((Err(Error::Connection(e.to_string())), None)),
                }
            }
        });

        Ok(until_closed(frames, closed))
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.release().await {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "IPC socket shutdown failed");
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "ipc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_newline_framing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.ipc");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let received = lines.next_line().await.unwrap().unwrap();
            write.write_all(b"{\"a\":1}\n\n{\"b\":2}\n").await.unwrap();
            received
        });

        let transport = IpcTransport::new(&path);
        transport.connect().await.unwrap();
        transport.send("{\"ping\":true}".to_string()).await.unwrap();

        let mut frames = transport.receive().await.unwrap();
        assert_eq!(frames.next().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(frames.next().await.unwrap().unwrap(), "{\"b\":2}");
        assert_eq!(server.await.unwrap(), "{\"ping\":true}");

        // Server task dropped its socket: graceful end.
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let transport = IpcTransport::new(dir.path().join("absent.ipc"));
        assert!(transport.connect().await.unwrap_err().is_connection_error());
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.ipc");
        let listener = UnixListener::bind(&path).unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Hold the socket open without ever writing.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let transport = IpcTransport::new(&path);
        transport.connect().await.unwrap();
        let mut frames = transport.receive().await.unwrap();

        transport.close().await.unwrap();
        assert!(frames.next().await.is_none());
        assert!(matches!(
            transport.send("{}".to_string()).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_close_unblocks_stalled_send() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stalled.ipc");
        let listener = UnixListener::bind(&path).unwrap();
        // Accepts, then never reads.
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let transport = Arc::new(IpcTransport::new(&path));
        transport.connect().await.unwrap();
        let mut frames = transport.receive().await.unwrap();

        let send = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move { transport.send("x".repeat(64 * 1024 * 1024)).await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!send.is_finished());

        tokio::time::timeout(Duration::from_secs(3), transport.close())
            .await
            .expect("close waited on a stalled write")
            .unwrap();

        let sent = tokio::time::timeout(Duration::from_secs(3), send)
            .await
            .expect("stalled send never failed")
            .unwrap();
        assert!(matches!(sent, Err(Error::NotConnected)));
        assert!(frames.next().await.is_none());
    }
}
