//! Широковещательная рассылка последнего снимка (pub/sub).
//!
//! - `broker`: реестр подписчиков, кэш последнего сообщения, публикация
//!   без блокировок на подписчиках и вытеснение медленных.
//! - `latest`: однослотовый кэш с явным признаком пустоты.
//! - `subscriber`: идентификаторы, жизненный цикл и цикл доставки
//!   одного подписчика.
//! - `transport`: трейт транспорта и причины закрытия.

pub mod broker;
pub mod latest;
pub mod subscriber;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::*;
pub use latest::*;
pub use subscriber::{SubscriberId, SubscriberState, Subscription};
pub use transport::*;
