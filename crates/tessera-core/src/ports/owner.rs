//! Owner port
//!
//! The scheduler keeps a `Weak<dyn Owner>` to whatever owns it (a bundle
//! repository, typically) purely to label its logs. It never assumes the owner
//! outlives it.

pub trait Owner: Send + Sync {
    fn label(&self) -> String;
}
