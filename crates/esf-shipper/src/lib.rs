//! Outputs for forwarded events
//!
//! Only Elasticsearch is supported. Events are buffered per output and
//! shipped with the `_bulk` API; rejected events go to a replay handler.

pub mod bulk;
pub mod composite;
pub mod elasticsearch;
pub mod error;
pub mod factory;
pub mod replay;
pub mod shipper;

pub use bulk::{cloud_id_to_url, BulkClient, BulkItemFailure, HttpBulkClient};
pub use composite::CompositeShipper;
pub use elasticsearch::ElasticsearchShipper;
pub use error::{Result, ShipperError};
pub use factory::ShipperFactory;
pub use replay::{ReplayHandler, ReplayMessage};
pub use shipper::Shipper;
