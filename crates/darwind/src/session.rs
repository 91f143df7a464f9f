//! Per-connection session loop — reads exactly one packet at a time, hands
//! it to the worker pool, writes the response, then reads the next packet
//! on the same connection, per §4.6.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use zerocopy::FromBytes;

use darwin_core::wire::{DecodeLimits, Packet, PacketHeader, ResponseKind};
use darwin_services::{run_task, Classifier, TaskContext};

use crate::acceptor::Stream;

const READ_CHUNK: usize = 4096;

pub struct Session {
    stream: Stream,
    classifier: Arc<dyn Classifier>,
    ctx: Arc<TaskContext>,
    pool: Arc<Semaphore>,
    limits: DecodeLimits,
}

impl Session {
    pub fn new(stream: Stream, classifier: Arc<dyn Classifier>, ctx: Arc<TaskContext>, pool: Arc<Semaphore>, limits: DecodeLimits) -> Self {
        Self { stream, classifier, ctx, pool, limits }
    }

    /// Runs until the peer closes the connection, a malformed packet is
    /// seen, or a write fails. Packets on this connection are processed
    /// strictly in arrival order: the response for one is written before
    /// the next is read, matching the session's serial contract.
    pub async fn run(mut self) {
        let mut buf = Vec::new();
        let mut scratch = [0u8; READ_CHUNK];

        loop {
            match declared_total_len(&buf, &self.limits) {
                Ok(Some(total)) if buf.len() >= total => {
                    match Packet::decode(&buf, &self.limits) {
                        Ok((packet, consumed)) => {
                            buf.drain(..consumed);
                            if !self.handle(packet).await {
                                return;
                            }
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "session: closing on malformed packet");
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(()) => {
                    tracing::warn!("session: closing, declared packet size exceeds configured limits");
                    return;
                }
            }

            match self.stream.read(&mut scratch).await {
                Ok(0) => return,
                Ok(n) => buf.extend_from_slice(&scratch[..n]),
                Err(e) => {
                    tracing::warn!(error = %e, "session: read error");
                    return;
                }
            }
        }
    }

    /// Runs one packet through the worker pool and writes its response.
    /// Returns `false` if the write failed and the connection should close.
    async fn handle(&mut self, packet: Packet) -> bool {
        let response_kind = ResponseKind::try_from(packet.response_kind).unwrap_or(ResponseKind::None);

        let result = {
            let _permit = self.pool.acquire().await.expect("worker pool semaphore never closes");
            run_task(self.classifier.as_ref(), &self.ctx, packet).await
        };

        if matches!(response_kind, ResponseKind::Back | ResponseKind::Both) {
            let bytes = result.encode();
            if let Err(e) = self.stream.write_all(&bytes).await {
                tracing::warn!(error = %e, "session: failed to write response");
                return false;
            }
        }
        true
    }
}

/// Reads just the fixed header to learn how many bytes the full packet
/// needs, without running the enum validation `Packet::decode` performs —
/// that only happens once the whole packet has arrived. Returns `Err(())`
/// if the declared sizes already exceed the configured limits, so a hostile
/// header is rejected before its payload is read off the wire.
fn declared_total_len(buf: &[u8], limits: &DecodeLimits) -> Result<Option<usize>, ()> {
    if buf.len() < PacketHeader::SIZE {
        return Ok(None);
    }
    let header = PacketHeader::read_from_prefix(buf).ok_or(())?;
    if header.body_size > limits.max_body_size || header.certitude_count > limits.max_certitude_count {
        return Err(());
    }
    Ok(Some(PacketHeader::SIZE + header.certitude_count as usize * 4 + header.body_size as usize))
}
