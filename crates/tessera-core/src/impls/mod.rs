//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ReqwestSession**: reqwest ベースの NetworkSession

pub mod reqwest_session;

pub use self::reqwest_session::ReqwestSession;
