//! Review AI-generated funding strategies for public goods projects and
//! donate to them on-chain in a single batched transaction.

pub mod amount;
pub mod chain;
pub mod config;
pub mod donation;
pub mod gui;
pub mod ledger_lock;
pub mod operation_log;
pub mod run;
pub mod session;
pub mod share;
pub mod strategy;
pub mod tokens;
pub mod user_settings;
pub mod view;
pub mod wallet;
