//! Background policy port
//!
//! ホストが foreground を失っている間、network-bound な operation を開始して
//! よいかを判断する。構築時に一度だけ注入され、未指定なら常に許可。

use crate::domain::Task;

pub trait BackgroundPolicy: Send + Sync {
    fn should_execute_in_background(&self, task: &Task) -> bool;
}

impl<F> BackgroundPolicy for F
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    fn should_execute_in_background(&self, task: &Task) -> bool {
        self(task)
    }
}

/// Default policy: background execution is always allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowBackground;

impl BackgroundPolicy for AllowBackground {
    fn should_execute_in_background(&self, _task: &Task) -> bool {
        true
    }
}
