//! Delegating factories and the specifications they accept.
//!
//! - `specification`: canonical specifications
//! - `adaptors`: versioned wire bodies -> specifications
//! - `modifications`: audit log returned by `modify`
//! - `*_factory`: create / modify / remove

pub mod adaptors;
pub mod connector_factory;
pub mod group_factory;
pub mod modifications;
pub mod specification;
pub mod topic_factory;

pub use adaptors::{
    specification_chains, AdaptorChain, SpecificationAdaptor, SpecificationChains, CURRENT_VERSION, LEGACY_VERSION,
};
pub use connector_factory::{ConnectorFactory, ConnectorFactoryDelegate};
pub use group_factory::{GroupFactory, GroupFactoryDelegate};
pub use modifications::{Modification, Modifications};
pub use specification::{
    check_id, CommonSpec, ConnectorSpecification, GroupSpecification, Specification, TopicSpecification,
};
pub use topic_factory::{TopicFactory, DEFAULT_CONNECTOR, DEFAULT_CONSUMER_GROUP, DEFAULT_PRODUCER_GROUP};
