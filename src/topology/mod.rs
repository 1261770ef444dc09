//! Topology domain model: Topic -> Groups -> Partitions, plus Connectors.

pub mod acl;
pub mod connector;
pub mod driver;
pub mod filtering;
pub mod group;
pub mod partition;
pub mod state;
pub mod topic;

pub use acl::{AccessControlList, AccessRule};
pub use connector::Connector;
pub use driver::{ConnectorDriver, GroupDriver, LinkReport, PartitionDriver, Properties};
pub use filtering::{GroupRoute, RouteFilterResults, RouteRequirements};
pub use group::{Direction, Group};
pub use partition::{Partition, PartitionKey};
pub use state::{ConnectorState, PartitionState, Transition};
pub use topic::Topic;
