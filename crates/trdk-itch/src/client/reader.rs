//! Reader task: socket bytes → frames → [`DataHandler`](crate::handler::DataHandler) callbacks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tracing::{debug, info};
use trdk_core::latency::LatencyWindow;
use trdk_core::time_util::{monotonic_us, now_us};

use super::Notifier;
use super::buffer::FrameBuffer;
use crate::codec::request;
use crate::codec::sequenced::{SequencedMessage, SequencedType};
use crate::codec::session::{SEQUENCED_HEADER_LEN, SessionMessage, SessionType};
use crate::codec::{CodecError, CodecResult, DELIMITER, type_name};

/// Outcome of one read pass.
#[derive(Debug, PartialEq, Eq)]
enum Pass {
    Continue,
    SessionEnded,
}

pub(super) struct Reader {
    label: String,
    read: OwnedReadHalf,
    buffer: FrameBuffer,
    dispatcher: Dispatcher,
    latency: LatencyWindow,
    latency_interval: Option<Duration>,
    last_latency_print: Instant,
}

impl Reader {
    pub(super) fn new(
        label: String,
        read: OwnedReadHalf,
        buffer: FrameBuffer,
        notifier: Arc<Notifier>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        latency_interval: Option<Duration>,
    ) -> Self {
        Self {
            label,
            read,
            buffer,
            dispatcher: Dispatcher { notifier, outbound, ping: request::heartbeat() },
            latency: LatencyWindow::new(),
            latency_interval,
            last_latency_print: Instant::now(),
        }
    }

    /// Run until the connection ends. `pending` bytes were loaded into the
    /// buffer before the task started and are processed first.
    pub(super) async fn run(mut self, pending: usize) {
        let mut received = pending;
        loop {
            if received > 0 {
                match self.on_data(received) {
                    Ok(Pass::Continue) => {}
                    Ok(Pass::SessionEnded) => {
                        self.dispatcher.notifier.close("End of Session", false);
                        return;
                    }
                    Err(e) => {
                        self.dispatcher
                            .notifier
                            .close(&format!("Failed to process incoming data: {e}"), true);
                        return;
                    }
                }
            }

            received = match self.read.read(self.buffer.spare_mut()).await {
                Ok(0) => {
                    self.dispatcher.notifier.close("Connection was gracefully closed", false);
                    return;
                }
                Ok(n) => n,
                Err(e) => {
                    self.dispatcher
                        .notifier
                        .close(&format!("Connection to server closed by error: \"{e}\""), true);
                    return;
                }
            };
        }
    }

    fn on_data(&mut self, received: usize) -> CodecResult<Pass> {
        let started = monotonic_us();
        let now = now_us();
        let handler = self.dispatcher.notifier.handler();

        let Some(end) = self.buffer.commit(received) else {
            if self.buffer.is_full() {
                let partial = self.buffer.filled();
                let (old, new) = self.buffer.grow();
                handler.on_debug(&format!(
                    "Received a large message ({:.02} kilobytes). \
                     Increasing buffer: {:.02} -> {:.02} kilobytes...",
                    kilobytes(partial),
                    kilobytes(old),
                    kilobytes(new),
                ));
            }
            return Ok(Pass::Continue);
        };

        let filled_up = self.buffer.is_full();
        let pass = self.dispatcher.process(&self.buffer.data()[..end], now)?;
        handler.flush(now);
        self.buffer.consume(end);

        if filled_up && pass == Pass::Continue {
            let (old, new) = self.buffer.grow();
            handler.on_debug(&format!(
                "Growing connection buffer: {:.02} -> {:.02} kilobytes...",
                kilobytes(old),
                kilobytes(new),
            ));
        }

        self.latency.record(monotonic_us().saturating_sub(started));
        self.maybe_print_latency();
        Ok(pass)
    }

    fn maybe_print_latency(&mut self) {
        let Some(interval) = self.latency_interval else {
            return;
        };
        if self.last_latency_print.elapsed() < interval {
            return;
        }
        self.last_latency_print = Instant::now();
        if let Some(summary) = self.latency.take() {
            info!("[{}] read pass latency: {summary}", self.label);
        }
    }
}

fn kilobytes(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}

/// Decodes terminated frames and forwards them.
struct Dispatcher {
    notifier: Arc<Notifier>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    ping: Vec<u8>,
}

impl Dispatcher {
    /// Dispatch every record of `data`, which ends with a delimiter.
    fn process(&self, data: &[u8], now: u64) -> CodecResult<Pass> {
        let mut pos = 0;
        while pos < data.len() {
            let abstract_type = data[pos];

            if abstract_type == SessionType::SequencedData as u8 {
                if data.get(pos + 1) == Some(&DELIMITER) {
                    return Ok(Pass::SessionEnded);
                }
                let begin = pos + SEQUENCED_HEADER_LEN;
                let end = data
                    .get(begin..)
                    .and_then(|rest| rest.iter().position(|&b| b == DELIMITER))
                    .map(|p| begin + p + 1)
                    .ok_or_else(|| CodecError::format("Failed to find message end"))?;
                self.on_sequenced(now, SequencedMessage::parse(&data[begin..end])?)?;
                pos = end;
                continue;
            }

            let kind = SessionType::from_byte(abstract_type)?;
            let end = pos + kind.size();
            let bytes = data
                .get(pos..end)
                .ok_or_else(|| CodecError::format("Wrong session message: wrong size"))?;
            let message = SessionMessage::parse(bytes)?;
            match message.kind() {
                SessionType::Heartbeat => self.on_heartbeat(),
                SessionType::ErrorNotification => {
                    self.notifier.handler().on_error_from_server(message.error_text()?);
                }
                other => {
                    return Err(CodecError::UnknownMessage(format!(
                        "Wrong message: unexpected type ({})",
                        type_name(other as u8)
                    )));
                }
            }
            pos = end;
        }
        Ok(Pass::Continue)
    }

    fn on_sequenced(&self, now: u64, message: SequencedMessage<'_>) -> CodecResult<()> {
        let handler = self.notifier.handler();
        match message.kind() {
            SequencedType::NewOrder => {
                let o = message.new_order()?;
                handler.on_new_order(now, o.is_buy, o.pair, o.order_id, o.price, o.qty);
            }
            SequencedType::ModifyOrder => {
                let m = message.order_modify()?;
                handler.on_order_modify(now, m.pair, m.order_id, m.qty);
            }
            SequencedType::CancelOrder => {
                let c = message.order_cancel()?;
                handler.on_order_cancel(now, c.pair, c.order_id);
            }
            SequencedType::MarketSnapshot => {
                for o in message.snapshot_orders()? {
                    handler.on_new_order(now, o.is_buy, o.pair, o.order_id, o.price, o.qty);
                }
            }
        }
        Ok(())
    }

    fn on_heartbeat(&self) {
        if self.outbound.send(self.ping.clone()).is_err() {
            debug!("heartbeat reply dropped: writer is gone");
        }
    }
}
