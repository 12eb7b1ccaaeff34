//! App - 公開 API
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築とワイヤリング（fail-fast 検証）
//! - **TaskScheduler**: get-or-create / 依存の追加 / suspend・resume / drain
//! - **TaskRequest**: 親・依存・入力をまとめたリクエスト

pub mod builder;
pub mod scheduler;

pub use self::builder::SchedulerBuilder;
pub use self::scheduler::{TaskRequest, TaskScheduler};
