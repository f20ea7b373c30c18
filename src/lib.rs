/// Service configuration: defaults, environment, command line.
pub mod config;
/// Startup errors and re-exports of the runtime error types.
pub mod error;
/// Logging (formatting, filters, sinks).
pub mod logging;
/// TCP transport and the subscriber accept loop.
pub mod network;
/// Interval fetch that feeds the broker.
pub mod poller;
/// Broadcast broker: registry, latest-value cache, delivery loops.
pub mod pubsub;
/// Snapshot sources: BusTime API and local file.
pub mod source;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Configuration.
pub use config::{Cli, Settings, SourceKind};
/// Errors.
pub use error::{Cancelled, DeliveryError, FetchError, SettingsError};
/// Network server and transport.
pub use network::{ServerConfig, TcpTransport};
/// Poller API.
pub use poller::{Poller, PollerConfig, PollerStats, Publisher};
/// Pub/Sub API.
pub use pubsub::{
    Broker, BrokerConfig, BrokerStats, CloseReason, Latest, SubscriberId, SubscriberState,
    Subscription, Transport,
};
/// Sources.
pub use source::{BustimeClient, BustimeConfig, DataSource, FileSource, VehicleSnapshot};
