pub mod topic_registry;

pub use topic_registry::TopicRegistry;
