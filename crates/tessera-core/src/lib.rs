//! tessera-core
//!
//! Task graph scheduler for the asset distribution pipeline.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, descriptor, state, outcome, task）
//! - **ports**: 抽象化レイヤー（Operation, OperationFactory, BackgroundPolicy, NetworkSession, Clock, IdGenerator, Owner）
//! - **graph**: 依存グラフと実行待ちキュー（dedup registry, wiring, background gate, SharedGraph）
//! - **app**: 公開 API（SchedulerBuilder, TaskScheduler, TaskRequest）
//! - **impls**: ports の実装（reqwest ベースの NetworkSession）
//! - runtime: operation factory の登録と実行
//! - worker: ワーカーループ
//! - config / error / observability
//!
//! # 使用例
//! ```ignore
//! let scheduler = SchedulerBuilder::new()
//!     .register("fetch", fetch_factory)?
//!     .build()?;
//! let fetch = scheduler.queue_task("fetch:fonts@3".parse()?)?;
//! let output = fetch.wait().await?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod runtime;
pub mod worker;

#[cfg(test)]
pub(crate) mod testkit;

pub use app::{SchedulerBuilder, TaskRequest, TaskScheduler};
pub use config::SchedulerConfig;
pub use domain::{Task, TaskDescriptor, TaskError, TaskId, TaskKind, TaskOutput, TaskStatus};
pub use error::SchedulerError;
