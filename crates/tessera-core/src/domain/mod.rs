//! Domain model (ids, descriptors, status, outcomes, the task handle).
//!
//! - descriptor: TaskKind + TaskDescriptor（dedup のキー）
//! - state: TaskStatus の状態遷移
//! - outcome: TaskOutput / TaskError
//! - task: 共有ハンドル `Task`

pub mod descriptor;
pub mod ids;
pub mod outcome;
pub mod state;
pub mod task;

pub use descriptor::{TaskDescriptor, TaskKind};
pub use ids::TaskId;
pub use outcome::{TaskError, TaskOutput};
pub use state::TaskStatus;
pub use task::{Task, TaskSnapshot};
