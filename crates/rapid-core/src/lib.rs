//! Data model, wire-stable hashing, error taxonomy, and tuning settings
//! shared by every other `rapid-*` crate.

pub mod alert;
pub mod configuration;
pub mod endpoint;
pub mod error;
pub mod metadata;
pub mod node_id;
pub mod ring;
pub mod settings;

pub use alert::{Alert, EdgeStatus};
pub use configuration::{configuration_id, Configuration};
pub use endpoint::Endpoint;
pub use error::{
    JoinError, JoinStatusCode, MembershipViewError, RapidError, Result, StateError,
    TransportError, ValidityError,
};
pub use metadata::Metadata;
pub use node_id::NodeId;
pub use ring::{h64, ring_hash, SortableSet};
pub use settings::{RapidSettings, K_MIN};
