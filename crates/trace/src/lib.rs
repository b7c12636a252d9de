//! Binary tracing of kernel events with pluggable backends.
//!
//! The kernel reports scheduler and thread lifecycle events as small binary
//! *records*. Each record is framed HDLC-style (sequence number, record id,
//! optional timestamp, payload, checksum, flag byte) so that a host tool can
//! resynchronise on a lossy serial link.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use thiserror::Error;

pub mod records;

/// Maximum payload length for a single record (excluding header/checksum).
const DEFAULT_MAX_RECORD_LEN: usize = 64;

const FLAG: u8 = 0x7E;
const ESC: u8 = 0x7D;
const ESC_XOR: u8 = 0x20;

/// Configuration for the tracer.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub max_record_len: usize,
    pub include_timestamp: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            include_timestamp: true,
        }
    }
}

/// A single trace record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub seq: u8,
    pub record_type: u8,
    pub timestamp: Option<Duration>,
    pub payload: Vec<u8>,
}

/// Errors that can occur while emitting or decoding trace data.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("backend error: {0}")]
    Backend(#[from] io::Error),
}

/// Backend trait that consumes framed bytes.
pub trait TraceBackend: Send + Sync {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TraceError>;
}

/// Backend that keeps every frame in memory; cloning shares the storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every frame written so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().expect("trace buffer poisoned").clone()
    }
}

impl TraceBackend for MemoryBackend {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TraceError> {
        self.frames
            .lock()
            .expect("trace buffer poisoned")
            .push(frame.to_vec());
        Ok(())
    }
}

/// Frame encoder.
#[derive(Debug)]
pub struct Tracer<B: TraceBackend> {
    backend: B,
    cfg: TraceConfig,
    seq: u8,
    epoch: SystemTime,
}

#[derive(Clone)]
pub struct TracerHandle<B: TraceBackend> {
    inner: Arc<Mutex<Tracer<B>>>,
}

impl<B: TraceBackend> Tracer<B> {
    pub fn new(cfg: TraceConfig, backend: B) -> Self {
        Self {
            backend,
            cfg,
            seq: 0,
            epoch: SystemTime::now(),
        }
    }

    pub fn into_handle(self) -> TracerHandle<B> {
        TracerHandle {
            inner: Arc::new(Mutex::new(self)),
        }
    }

    pub fn record(
        &mut self,
        record_type: u8,
        payload: &[u8],
        with_timestamp: bool,
    ) -> Result<TraceRecord, TraceError> {
        if payload.len() > self.cfg.max_record_len {
            return Err(TraceError::PayloadTooLarge(payload.len()));
        }

        let timestamp = if self.cfg.include_timestamp && with_timestamp {
            Some(self.epoch.elapsed().unwrap_or_default())
        } else {
            None
        };

        self.seq = self.seq.wrapping_add(1);
        let record = TraceRecord {
            seq: self.seq,
            record_type,
            timestamp,
            payload: payload.to_vec(),
        };

        let frame = encode_frame(&record);
        self.backend.write_frame(&frame)?;
        Ok(record)
    }
}

/// Encodes a record into an escaped frame terminated by the flag byte.
pub fn encode_frame(record: &TraceRecord) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(record.payload.len() + 8);
    let mut checksum: u8 = 0;

    let push_literal = |dest: &mut Vec<u8>, byte: u8| {
        if byte == FLAG || byte == ESC {
            dest.push(ESC);
            dest.push(byte ^ ESC_XOR);
        } else {
            dest.push(byte);
        }
    };
    let push_escaped = |dest: &mut Vec<u8>, sum: &mut u8, byte: u8| {
        *sum = sum.wrapping_add(byte);
        push_literal(dest, byte);
    };

    push_escaped(&mut bytes, &mut checksum, record.seq);
    push_escaped(&mut bytes, &mut checksum, record.record_type);

    if let Some(ts) = record.timestamp {
        for byte in (ts.as_micros() as u32).to_le_bytes() {
            push_escaped(&mut bytes, &mut checksum, byte);
        }
    }

    for &byte in &record.payload {
        push_escaped(&mut bytes, &mut checksum, byte);
    }

    push_literal(&mut bytes, !checksum);
    bytes.push(FLAG);
    bytes
}

/// Decodes one frame produced by [`encode_frame`].
///
/// The caller states whether the stream carries timestamps; the frame itself
/// does not say.
pub fn decode_frame(frame: &[u8], with_timestamp: bool) -> Result<TraceRecord, TraceError> {
    let body = match frame.split_last() {
        Some((&FLAG, body)) => body,
        _ => return Err(TraceError::Malformed("missing flag byte")),
    };

    let mut raw = Vec::with_capacity(body.len());
    let mut escaped = false;
    for &byte in body {
        if escaped {
            raw.push(byte ^ ESC_XOR);
            escaped = false;
        } else if byte == ESC {
            escaped = true;
        } else {
            raw.push(byte);
        }
    }
    if escaped {
        return Err(TraceError::Malformed("dangling escape"));
    }

    let header_len = if with_timestamp { 6 } else { 2 };
    if raw.len() < header_len + 1 {
        return Err(TraceError::Malformed("frame too short"));
    }

    let (content, checksum) = raw.split_at(raw.len() - 1);
    let sum = content.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if !sum != checksum[0] {
        return Err(TraceError::Malformed("checksum mismatch"));
    }

    let timestamp = with_timestamp.then(|| {
        let micros = u32::from_le_bytes([content[2], content[3], content[4], content[5]]);
        Duration::from_micros(u64::from(micros))
    });

    Ok(TraceRecord {
        seq: content[0],
        record_type: content[1],
        timestamp,
        payload: content[header_len..].to_vec(),
    })
}

impl<B: TraceBackend + 'static> TracerHandle<B> {
    pub fn hook(&self) -> TraceHook {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |record_type, payload, with_timestamp| {
            let mut guard = inner.lock().expect("tracer poisoned");
            guard
                .record(record_type, payload, with_timestamp)
                .map(|_| ())
        })
    }
}

pub type TraceHook = Arc<dyn Fn(u8, &[u8], bool) -> Result<(), TraceError> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip_through_escaping() {
        let backend = MemoryBackend::new();
        let mut tracer = Tracer::new(
            TraceConfig {
                include_timestamp: false,
                ..TraceConfig::default()
            },
            backend.clone(),
        );

        let sent = tracer
            .record(records::sched::NEXT, &[FLAG, ESC, 1, 2], false)
            .expect("record");

        let frames = backend.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].iter().filter(|b| **b == FLAG).count(), 1);

        let decoded = decode_frame(&frames[0], false).expect("decode");
        assert_eq!(decoded, sent);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut tracer = Tracer::new(TraceConfig::default(), MemoryBackend::new());
        let payload = vec![0u8; DEFAULT_MAX_RECORD_LEN + 1];
        assert!(matches!(
            tracer.record(1, &payload, false),
            Err(TraceError::PayloadTooLarge(65))
        ));
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let record = TraceRecord {
            seq: 1,
            record_type: records::thread::CREATE,
            timestamp: None,
            payload: vec![1, 0, 0, 0],
        };
        let mut frame = encode_frame(&record);
        frame[2] ^= 0x01;
        assert!(matches!(
            decode_frame(&frame, false),
            Err(TraceError::Malformed("checksum mismatch"))
        ));
    }

    #[test]
    fn hook_sequences_records() {
        let backend = MemoryBackend::new();
        let handle = Tracer::new(TraceConfig::default(), backend.clone()).into_handle();
        let hook = handle.hook();

        hook(records::thread::CREATE, &records::words(&[1, 0]), true).expect("first");
        hook(records::thread::FINISH, &records::words(&[1, 0]), true).expect("second");

        let decoded: Vec<_> = backend
            .frames()
            .iter()
            .map(|f| decode_frame(f, true).expect("decode"))
            .collect();
        assert_eq!(decoded[0].seq, 1);
        assert_eq!(decoded[1].seq, 2);
        assert_eq!(decoded[1].record_type, records::thread::FINISH);
        assert!(decoded[0].timestamp.is_some());
    }
}
