//! Сетевой слой: доставка снимков подписчикам по TCP.
//!
//! ## Подмодули
//!
//! - `tcp`: транспорт подписчика, одна строка JSON на сообщение.
//! - `server`: приём соединений и подписка каждого на брокер.

pub mod server;
pub mod tcp;

pub use server::{run, ServerConfig};
pub use tcp::*;
