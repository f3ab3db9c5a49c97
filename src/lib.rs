// src/lib.rs

//! Kumoh cafeteria menu bot library.
//!
//! Scrapes the weekly menus, asks a language model which dishes are safe to
//! eat, caches verdicts per day keyed on the menu fingerprint, and serves
//! them over Telegram.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
