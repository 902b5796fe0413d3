//! Feed supervisor.
//!
//! A [`Stream`] owns the current [`Client`], the tracked instruments and the
//! reconnect logic:
//!
//! ```text
//! Disconnected ──connect──► Streaming ──closed──► Disconnected ──backoff──► connect ...
//!                                 │
//!                                stop ──► Stopped
//! ```
//!
//! Every connection gets a fresh id. Callbacks carry the id of the connection
//! that produced them and are ignored once that connection is no longer the
//! current one, so a late close report cannot tear down its successor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use ahash::AHashMap;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trdk_core::{BookSnapshot, OrderId};

use crate::MdModule;
use crate::client::{Client, ClientError};
use crate::config::ItchConfig;
use crate::handler::DataHandler;
use crate::security::{OrderUpdate, Security};
use crate::sink::BookSink;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to server: {0}")]
    Connect(#[source] ClientError),

    #[error("not connected")]
    NotConnected,

    #[error("failed to send request: {0}")]
    Send(#[source] ClientError),
}

#[derive(Default)]
struct Books {
    securities: AHashMap<String, Security>,
    /// Any book changed since the last flush.
    has_new_data: bool,
}

struct StreamInner {
    config: ItchConfig,
    sink: Arc<dyn BookSink>,
    client: Mutex<Option<Client>>,
    books: Mutex<Books>,
    last_attempt: Mutex<Option<Instant>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    /// Id of the current connection; `0` when there is none.
    connection_id: AtomicU64,
    next_connection_id: AtomicU64,
    shutdown: AtomicBool,
}

/// ITCH market data module.
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    /// Tracks every symbol of `config`. Nothing connects until
    /// [`Stream::connect`] or [`MdModule::start`].
    pub fn new(config: ItchConfig, sink: Arc<dyn BookSink>) -> Self {
        let symbols = config.symbols.clone();
        let stream = Self {
            inner: Arc::new(StreamInner {
                config,
                sink,
                client: Mutex::new(None),
                books: Mutex::new(Books::default()),
                last_attempt: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                connection_id: AtomicU64::new(0),
                next_connection_id: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        };
        for symbol in symbols {
            stream.add_security(&symbol);
        }
        stream
    }

    pub fn add_security(&self, symbol: &str) {
        let mut books = self.inner.books.lock();
        if books.securities.contains_key(symbol) {
            return;
        }
        let security = Security::new(symbol, self.inner.config.book_levels);
        books.securities.insert(symbol.to_string(), security);
    }

    /// Last published book of `symbol`.
    pub fn book(&self, symbol: &str) -> Option<Arc<BookSnapshot>> {
        self.inner.books.lock().securities.get(symbol)?.last_snapshot().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.client.lock().is_some()
    }

    /// Connect and log in; no-op when already connected.
    pub async fn connect(&self) -> Result<(), StreamError> {
        self.inner.connect().await
    }

    /// Clear every book and subscribe to its symbol again.
    pub fn subscribe_to_securities(&self) -> Result<(), StreamError> {
        self.inner.subscribe_to_securities()
    }

    /// Stop reconnecting, close the connection and release the books.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }
}

impl StreamInner {
    async fn connect(self: &Arc<Self>) -> Result<(), StreamError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(StreamError::NotConnected);
        }
        if self.client.lock().is_some() {
            return Ok(());
        }

        *self.last_attempt.lock() = Some(Instant::now());
        let id = self.next_connection_id.fetch_add(1, Ordering::AcqRel) + 1;
        self.connection_id.store(id, Ordering::Release);

        let handler = Arc::new(ConnectionHandler { inner: Arc::downgrade(self), conn_id: id });
        let client = match Client::connect(&self.config.client, handler).await {
            Ok(client) => client,
            Err(e) => {
                error!("[{}] failed to connect to server: {e}", self.config.name);
                let _ = self.connection_id.compare_exchange(
                    id,
                    0,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                return Err(StreamError::Connect(e));
            }
        };

        {
            let mut slot = self.client.lock();
            if !self.shutdown.load(Ordering::Acquire)
                && self.connection_id.load(Ordering::Acquire) == id
            {
                *slot = Some(client);
                info!("[{}] connected (connection {id})", self.config.name);
                return Ok(());
            }
        }

        // Closed (or stopped) before the client could be stored.
        client.shutdown().await;
        Err(StreamError::NotConnected)
    }

    fn subscribe_to_securities(&self) -> Result<(), StreamError> {
        let slot = self.client.lock();
        let client = slot.as_ref().ok_or(StreamError::NotConnected)?;
        let mut books = self.books.lock();
        info!(
            "[{}] sending market data requests for {} security(ies)...",
            self.config.name,
            books.securities.len()
        );
        for (symbol, security) in books.securities.iter_mut() {
            security.clear_book();
            info!("[{}] sending market data request for {symbol}...", self.config.name);
            client.send_market_data_subscribe_request(symbol).map_err(StreamError::Send)?;
            if self.config.snapshot_on_subscribe {
                client.send_market_snapshot_request(symbol).map_err(StreamError::Send)?;
            }
        }
        books.has_new_data = true;
        Ok(())
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        let mut slot = self.reconnect_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("[{}] reconnect already scheduled", self.config.name);
            return;
        }

        let since_last = self.last_attempt.lock().map(|t| t.elapsed());
        let delay = self.config.reconnect.delay_for(since_last);
        info!("[{}] reconnecting in {delay:?}...", self.config.name);

        let inner = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            // The slot holds this task until the attempt is over; `stop`
            // aborts a login in progress through it.
            let result = match inner.connect().await {
                Ok(()) => inner.subscribe_to_securities(),
                Err(e) => Err(e),
            };
            inner.reconnect_task.lock().take();
            if let Err(e) = result {
                warn!("[{}] reconnect failed: {e}", inner.config.name);
            }
            // A close reported while the attempt ran found the slot taken.
            if inner.client.lock().is_none() {
                inner.schedule_reconnect();
            }
        }));
    }

    async fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);

        let task = self.reconnect_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        let client = {
            let mut slot = self.client.lock();
            self.connection_id.store(0, Ordering::Release);
            slot.take()
        };
        if let Some(client) = client {
            client.shutdown().await;
        }

        self.books.lock().securities.clear();
        info!("[{}] stopped", self.config.name);
    }

    // -- events of the current connection --

    fn on_new_order(&self, time: u64, is_buy: bool, pair: &str, id: OrderId, price: f64, qty: f64) {
        let mut guard = self.books.lock();
        let books = &mut *guard;
        let Some(security) = self.find(&mut books.securities, pair) else {
            return;
        };
        if let Err(e) = security.on_new_order(time, is_buy, id, price, qty) {
            error!("[{}] {e}: book is disabled until resubscribe", self.config.name);
            return;
        }
        books.has_new_data = true;
    }

    fn on_order_modify(&self, time: u64, pair: &str, id: OrderId, qty: f64) {
        let mut guard = self.books.lock();
        let books = &mut *guard;
        let Some(security) = self.find(&mut books.securities, pair) else {
            return;
        };
        if security.on_order_modify(time, id, qty) == OrderUpdate::Applied {
            books.has_new_data = true;
        }
    }

    fn on_order_cancel(&self, time: u64, pair: &str, id: OrderId) {
        let mut guard = self.books.lock();
        let books = &mut *guard;
        let Some(security) = self.find(&mut books.securities, pair) else {
            return;
        };
        if security.on_order_cancel(time, id) == OrderUpdate::Applied {
            books.has_new_data = true;
        }
    }

    /// Tracked, healthy security of `pair`.
    fn find<'a>(
        &self,
        securities: &'a mut AHashMap<String, Security>,
        pair: &str,
    ) -> Option<&'a mut Security> {
        match securities.get_mut(pair) {
            Some(security) if security.is_failed() => None,
            Some(security) => Some(security),
            None => {
                warn!("[{}] event for unknown symbol \"{pair}\" dropped", self.config.name);
                None
            }
        }
    }

    fn flush(&self, time: u64) {
        let mut guard = self.books.lock();
        let books = &mut *guard;
        if !books.has_new_data {
            return;
        }
        books.has_new_data = false;
        for (symbol, security) in books.securities.iter_mut() {
            if let Some(book) = security.flush(time) {
                self.sink.on_book(symbol, book);
            }
        }
    }

    fn on_connection_closed(self: &Arc<Self>, conn_id: u64, reason: &str, is_error: bool) {
        let client = {
            let mut slot = self.client.lock();
            if self.connection_id.load(Ordering::Acquire) != conn_id {
                return;
            }
            self.connection_id.store(0, Ordering::Release);
            slot.take()
        };
        if is_error {
            error!("[{}] connection with server closed: \"{reason}\"", self.config.name);
        } else {
            info!("[{}] connection with server closed: \"{reason}\"", self.config.name);
        }
        drop(client);
        self.schedule_reconnect();
    }
}

/// [`DataHandler`] of one connection.
struct ConnectionHandler {
    inner: Weak<StreamInner>,
    conn_id: u64,
}

impl ConnectionHandler {
    fn current(&self) -> Option<Arc<StreamInner>> {
        let inner = self.inner.upgrade()?;
        (inner.connection_id.load(Ordering::Acquire) == self.conn_id).then_some(inner)
    }
}

impl DataHandler for ConnectionHandler {
    fn on_new_order(&self, time: u64, is_buy: bool, pair: &str, id: OrderId, price: f64, qty: f64) {
        if let Some(inner) = self.current() {
            inner.on_new_order(time, is_buy, pair, id, price, qty);
        }
    }

    fn on_order_modify(&self, time: u64, pair: &str, id: OrderId, qty: f64) {
        if let Some(inner) = self.current() {
            inner.on_order_modify(time, pair, id, qty);
        }
    }

    fn on_order_cancel(&self, time: u64, pair: &str, id: OrderId) {
        if let Some(inner) = self.current() {
            inner.on_order_cancel(time, pair, id);
        }
    }

    fn flush(&self, time: u64) {
        if let Some(inner) = self.current() {
            inner.flush(time);
        }
    }

    fn on_debug(&self, message: &str) {
        if let Some(inner) = self.inner.upgrade() {
            debug!("[{}] {message}", inner.config.name);
        }
    }

    fn on_error_from_server(&self, text: &str) {
        if let Some(inner) = self.inner.upgrade() {
            error!("[{}] server notifies about error: \"{text}\"", inner.config.name);
        }
    }

    fn on_connection_closed(&self, reason: &str, is_error: bool) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_connection_closed(self.conn_id, reason, is_error);
        }
    }
}

#[async_trait]
impl MdModule for Stream {
    fn name(&self) -> &str {
        &self.inner.config.name
    }

    async fn start(&mut self) -> Result<()> {
        self.connect().await?;
        self.subscribe_to_securities()?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        Stream::stop(self).await;
        Ok(())
    }
}
