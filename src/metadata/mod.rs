pub mod context;
pub mod extractor;
pub mod gateway;
pub mod location;
pub mod location_history;
pub mod timeline;

pub use context::ImageRecord;
pub use extractor::ExifTool;
pub use gateway::{GatewayError, InMemoryGateway, MetadataGateway};
pub use location_history::{LocationHistory, LocationPoint};
pub use timeline::{ParseWarning, VisitAnchor};
