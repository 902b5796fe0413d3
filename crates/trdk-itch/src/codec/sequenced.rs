//! Sequenced messages — order events embedded in sequenced-data records.
//!
//! | Type | Message          | Length (with delimiter) |
//! |------|------------------|-------------------------|
//! | `N`  | new order        | 83                      |
//! | `M`  | modify order     | 72                      |
//! | `X`  | cancel order     | 24                      |
//! | `S`  | market snapshot  | variable                |

use trdk_core::OrderId;

use super::{CodecError, CodecResult, Message, type_name};

const PAIR_SIZE: usize = 7;
const ORDER_ID_SIZE: usize = 15;
const PRICE_SIZE: usize = 10;
const AMOUNT_SIZE: usize = 16;
const COUNT_SIZE: usize = 4;

/// Minimum quantity and lot size of a snapshot order; not used by the book.
const SNAPSHOT_ORDER_SKIP: usize = AMOUNT_SIZE * 2;
/// First pair entry of a market snapshot.
const SNAPSHOT_PAIRS_OFFSET: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SequencedType {
    NewOrder = b'N',
    ModifyOrder = b'M',
    CancelOrder = b'X',
    MarketSnapshot = b'S',
}

impl SequencedType {
    pub fn from_byte(byte: u8) -> CodecResult<Self> {
        match byte {
            b'N' => Ok(Self::NewOrder),
            b'M' => Ok(Self::ModifyOrder),
            b'X' => Ok(Self::CancelOrder),
            b'S' => Ok(Self::MarketSnapshot),
            other => Err(CodecError::UnknownMessage(format!(
                "Wrong sequenced message: unknown type ({})",
                type_name(other)
            ))),
        }
    }

    /// Full record length in bytes, or `0` for variable-length records.
    pub const fn size(self) -> usize {
        match self {
            Self::NewOrder => 66 + 16 + 1,
            Self::ModifyOrder => 55 + 16 + 1,
            Self::CancelOrder => 8 + 15 + 1,
            Self::MarketSnapshot => 0,
        }
    }
}

/// An order added to one side of a pair's book.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewOrder<'a> {
    pub is_buy: bool,
    pub pair: &'a str,
    pub order_id: OrderId,
    pub price: f64,
    pub qty: f64,
}

/// New remaining quantity of a resting order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderModify<'a> {
    pub pair: &'a str,
    pub order_id: OrderId,
    pub qty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderCancel<'a> {
    pub pair: &'a str,
    pub order_id: OrderId,
}

/// A sequenced message whose size matches its type (unless variable).
#[derive(Debug, Clone, Copy)]
pub struct SequencedMessage<'a> {
    message: Message<'a>,
    kind: SequencedType,
}

impl<'a> SequencedMessage<'a> {
    pub fn parse(bytes: &'a [u8]) -> CodecResult<Self> {
        let message = Message::new(bytes)?;
        let kind = SequencedType::from_byte(message.abstract_type())?;
        let expected = kind.size();
        if expected != 0 && expected != message.len() {
            return Err(CodecError::format("Wrong sequenced message: wrong size"));
        }
        Ok(Self { message, kind })
    }

    pub fn kind(&self) -> SequencedType {
        self.kind
    }

    /// Side `(1)`, pair `(2,7)`, order id `(9,15)`, price `(24,10)`, amount `(34,16)`.
    pub fn new_order(&self) -> CodecResult<NewOrder<'a>> {
        let m = &self.message;
        let is_buy = match m.parse_char(1)? {
            b'B' => true,
            b'S' => false,
            _ => return Err(CodecError::format("Failed to parse field with type Buy-or-Sell")),
        };
        Ok(NewOrder {
            is_buy,
            pair: m.parse_token(2, PAIR_SIZE)?,
            order_id: m.parse_order_id(9, ORDER_ID_SIZE)?,
            price: m.parse_f64(24, PRICE_SIZE)?,
            qty: m.parse_f64(34, AMOUNT_SIZE)?,
        })
    }

    /// Pair `(1,7)`, order id `(8,15)`, amount `(23,16)`.
    pub fn order_modify(&self) -> CodecResult<OrderModify<'a>> {
        let m = &self.message;
        Ok(OrderModify {
            pair: m.parse_token(1, PAIR_SIZE)?,
            order_id: m.parse_order_id(8, ORDER_ID_SIZE)?,
            qty: m.parse_f64(23, AMOUNT_SIZE)?,
        })
    }

    /// Pair `(1,7)`, order id `(8,15)`.
    pub fn order_cancel(&self) -> CodecResult<OrderCancel<'a>> {
        let m = &self.message;
        Ok(OrderCancel {
            pair: m.parse_token(1, PAIR_SIZE)?,
            order_id: m.parse_order_id(8, ORDER_ID_SIZE)?,
        })
    }

    /// Decode every order of a market snapshot.
    ///
    /// The pair count sits at `(7,4)`. Starting at offset 11 each pair entry
    /// is the pair token followed by the bid side, then the ask side. A side
    /// is a price count followed by price levels; a level is a price, an order
    /// count and the orders. Every order comes back as a [`NewOrder`].
    pub fn snapshot_orders(&self) -> CodecResult<Vec<NewOrder<'a>>> {
        let m = &self.message;
        let pairs = m.parse_i32(7, COUNT_SIZE)?;
        let mut orders = Vec::new();
        let mut offset = SNAPSHOT_PAIRS_OFFSET;
        for _ in 0..pairs.max(0) {
            let pair = m.parse_token(offset, PAIR_SIZE)?;
            offset += PAIR_SIZE;
            offset = self.snapshot_side(offset, pair, true, &mut orders)?;
            offset = self.snapshot_side(offset, pair, false, &mut orders)?;
        }
        Ok(orders)
    }

    fn snapshot_side(
        &self,
        mut offset: usize,
        pair: &'a str,
        is_buy: bool,
        orders: &mut Vec<NewOrder<'a>>,
    ) -> CodecResult<usize> {
        let m = &self.message;
        let prices = m.parse_i32(offset, COUNT_SIZE)?;
        offset += COUNT_SIZE;
        for _ in 0..prices.max(0) {
            let price = m.parse_f64(offset, PRICE_SIZE)?;
            offset += PRICE_SIZE;
            let count = m.parse_i32(offset, COUNT_SIZE)?;
            offset += COUNT_SIZE;
            for _ in 0..count.max(0) {
                let qty = m.parse_f64(offset, AMOUNT_SIZE)?;
                offset += AMOUNT_SIZE + SNAPSHOT_ORDER_SKIP;
                let order_id = m.parse_order_id(offset, ORDER_ID_SIZE)?;
                offset += ORDER_ID_SIZE;
                orders.push(NewOrder { is_buy, pair, order_id, price, qty });
            }
        }
        Ok(offset)
    }
}
