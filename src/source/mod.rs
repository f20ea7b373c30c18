//! Источники снимков положения машин.
//!
//! - `bustime`: HTTP-клиент BusTime API;
//! - `file`: чтение того же документа из локального файла.

pub mod bustime;
pub mod file;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use busfeed_error::FetchError;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

pub use bustime::*;
pub use file::*;

/// Источник полных снимков для цикла опроса.
#[async_trait]
pub trait DataSource<M>: Send + Sync {
    async fn load(&self) -> Result<M, FetchError>;
}

/// Полный снимок положения машин.
///
/// Каждая машина хранится как исходный JSON и не разбирается: сервис
/// только пересылает снимок подписчикам. Клонирование дешёвое (`Arc`),
/// при сериализации получается JSON-массив.
#[derive(Clone)]
pub struct VehicleSnapshot {
    vehicles: Arc<[Box<RawValue>]>,
}

impl VehicleSnapshot {
    pub fn new(vehicles: Vec<Box<RawValue>>) -> Self {
        Self {
            vehicles: vehicles.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawValue> {
        self.vehicles.iter().map(|v| &**v)
    }
}

impl Default for VehicleSnapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Serialize for VehicleSnapshot {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.vehicles.iter())
    }
}

impl PartialEq for VehicleSnapshot {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.get() == b.get())
    }
}

impl fmt::Debug for VehicleSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("VehicleSnapshot")
            .field("vehicles", &self.vehicles.len())
            .finish()
    }
}
