//! The single duplex connection shared by the dispatch loop and subscribe callers
//!
//! Reads and writes are serialized by two distinct locks, so a subscribe command
//! never waits behind the dispatch loop's pending read.

use crate::connection::{Connector, FrameReader, FrameWriter};
use crate::error::ConnectionError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct Transport {
    connector: Arc<dyn Connector>,
    writer: Mutex<Option<Box<dyn FrameWriter>>>,
    reader: Mutex<Option<Box<dyn FrameReader>>>,
    connected: AtomicBool,
}

impl Transport {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Open a fresh connection, replacing any previous one
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let (writer, reader) = self.connector.connect().await?;

        let previous = self.writer.lock().await.replace(writer);
        if let Some(mut previous) = previous {
            previous.close().await;
        }
        *self.reader.lock().await = Some(reader);

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Read the next text frame. Only the dispatch loop calls this.
    pub async fn read(&self) -> Result<String, ConnectionError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

        match reader.read_frame().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                *guard = None;
                Err(e)
            }
        }
    }

    /// Write one text frame
    pub async fn write(&self, text: String) -> Result<(), ConnectionError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        writer.write_frame(text).await
    }

    /// Close the write half. The read half is released by the next failing read.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("connected", &self.is_connected())
            .finish()
    }
}
