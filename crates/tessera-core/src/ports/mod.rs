//! Ports - 抽象化レイヤー
//!
//! Scheduler の外側にいるもの（operation, transport, host の background
//! 判断, 時刻, ID 生成）へのインターフェース。実装は `impls` に置く。

pub mod background;
pub mod clock;
pub mod id_generator;
pub mod network;
pub mod operation;
pub mod owner;

// 主要な trait を再エクスポート
pub use self::background::{AllowBackground, BackgroundPolicy};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::network::{HttpMethod, HttpRequest, HttpResponse, NetworkSession, TransportError};
pub use self::operation::{Operation, OperationContext, OperationFactory};
pub use self::owner::Owner;
