use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

#[cfg(feature = "emitter")]
use crate::EventEmitter;

use super::{RenderEvent, RenderSink, SinkError};

/// Sink forwarding events over a std mpsc channel to the render thread.
pub struct ChannelSink {
    sender: Mutex<Sender<RenderEvent>>,
}

impl ChannelSink {
    pub fn new(sender: Sender<RenderEvent>) -> Self {
        ChannelSink {
            sender: Mutex::new(sender),
        }
    }

    /// Create a sink together with the receiver the render surface reads from.
    pub fn channel() -> (Self, Receiver<RenderEvent>) {
        let (tx, rx) = channel();
        (Self::new(tx), rx)
    }
}

impl RenderSink for ChannelSink {
    fn send(&self, event: RenderEvent) -> Result<(), SinkError> {
        let sender = self.sender.lock().map_err(|_| SinkError::BufferPoisoned)?;
        sender.send(event).map_err(|_| SinkError::Disconnected)
    }
}

/// Sink that logs one line per event through `tracing`, or into a buffer.
pub struct LogSink {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        LogSink { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogSink {
            buffer: Some(buffer),
        }
    }
}

impl RenderSink for LogSink {
    fn send(&self, event: RenderEvent) -> Result<(), SinkError> {
        let payload =
            serde_json::to_string(&event).map_err(|e| SinkError::Encode(e.to_string()))?;
        let line = format!("[RENDER] {} {}", event.name(), payload);
        if let Some(buffer) = &self.buffer {
            let mut buffer = buffer.lock().map_err(|_| SinkError::BufferPoisoned)?;
            buffer.push(line);
        } else {
            tracing::info!(target: "synced_rust::render", "{}", line);
        }
        Ok(())
    }
}

/// Sink emitting events via an `EventEmitter` for in-process listeners.
///
/// Listeners subscribe by event name (`"ModelUpdated"`, `"ItemSet"`, ...) and
/// receive the JSON-encoded event as a `String`.
#[cfg(feature = "emitter")]
pub struct EmitterSink {
    emitter: Mutex<EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterSink {
    pub fn new(emitter: EventEmitter) -> Self {
        EmitterSink {
            emitter: Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
impl RenderSink for EmitterSink {
    fn send(&self, event: RenderEvent) -> Result<(), SinkError> {
        let payload =
            serde_json::to_string(&event).map_err(|e| SinkError::Encode(e.to_string()))?;
        let mut emitter = self.emitter.lock().map_err(|_| SinkError::BufferPoisoned)?;
        emitter.emit(event.name(), payload);
        Ok(())
    }
}
