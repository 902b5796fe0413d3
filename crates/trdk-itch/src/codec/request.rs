//! Client messages — outbound control records.
//!
//! | Type | Message                  | Length (with delimiter) |
//! |------|--------------------------|-------------------------|
//! | `L`  | login request            | 92                      |
//! | `R`  | heartbeat                | 2                       |
//! | `A`  | market data subscribe    | 9                       |
//! | `M`  | market snapshot request  | 9                       |

use super::{CodecResult, MessageBuilder};

/// Outbound control record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientType {
    LoginRequest = b'L',
    Heartbeat = b'R',
    MarketDataSubscribeRequest = b'A',
    MarketSnapshotRequest = b'M',
}

impl ClientType {
    /// Full record length in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::LoginRequest => 91 + 1,
            Self::Heartbeat => 1 + 1,
            Self::MarketDataSubscribeRequest | Self::MarketSnapshotRequest => 8 + 1,
        }
    }

    fn builder(self) -> MessageBuilder {
        MessageBuilder::new(self as u8, self.size())
    }
}

/// Login request: login `(1,40)`, password `(41,40)`, market data
/// unsubscribe flag `(81)`, reserved `(82,9)`.
pub fn login_request(login: &str, password: &str) -> CodecResult<Vec<u8>> {
    let mut message = ClientType::LoginRequest.builder();
    message
        .set_str(1, 40, login)?
        .set_str(41, 40, password)?
        .set_bool(81, true)?
        .set_i32(82, 9, 0)?;
    Ok(message.into_bytes())
}

/// Reply to a server heartbeat.
pub fn heartbeat() -> Vec<u8> {
    ClientType::Heartbeat.builder().into_bytes()
}

/// Subscribe to incremental order events of `pair`.
pub fn market_data_subscribe_request(pair: &str) -> CodecResult<Vec<u8>> {
    pair_request(ClientType::MarketDataSubscribeRequest, pair)
}

/// Ask for a full snapshot of `pair`.
pub fn market_snapshot_request(pair: &str) -> CodecResult<Vec<u8>> {
    pair_request(ClientType::MarketSnapshotRequest, pair)
}

fn pair_request(kind: ClientType, pair: &str) -> CodecResult<Vec<u8>> {
    let mut message = kind.builder();
    message.set_str(1, 7, pair)?;
    Ok(message.into_bytes())
}
