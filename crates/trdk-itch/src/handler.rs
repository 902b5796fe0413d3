//! Upward interface of the connection client.
//!
//! A [`Client`](crate::client::Client) decodes the byte stream and calls one
//! `DataHandler` from its reader task. `time` is wall-clock microseconds
//! since the Unix epoch, taken once per read pass.

use trdk_core::OrderId;

pub trait DataHandler: Send + Sync {
    fn on_new_order(
        &self,
        time: u64,
        is_buy: bool,
        pair: &str,
        order_id: OrderId,
        price: f64,
        qty: f64,
    );

    fn on_order_modify(&self, time: u64, pair: &str, order_id: OrderId, qty: f64);

    fn on_order_cancel(&self, time: u64, pair: &str, order_id: OrderId);

    /// End of a read pass: every event of the pass has been delivered.
    fn flush(&self, time: u64);

    fn on_debug(&self, message: &str);

    fn on_error_from_server(&self, text: &str);

    /// The connection is finished. Called at most once per connection.
    fn on_connection_closed(&self, reason: &str, is_error: bool);
}
