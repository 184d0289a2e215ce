#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
pub use error::*;

mod common;
pub use common::{
    Algorithm, Capacity, ClientKey, Decision, KeyPrefix, RatePerSecond, RequestLimit,
    WindowSizeMs,
};

pub mod algorithms;
pub use algorithms::{QuotaPolicy, QuotaState, ScriptReply};

mod quota_store;
pub use quota_store::*;

pub mod local;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;

mod config;
pub use config::*;

mod admission_controller;
pub use admission_controller::*;

pub mod http;

mod runtime;

#[cfg(test)]
mod tests;
