//! Knowledge Store + Flow Manager (C7): append-only, content-addressable
//! entries accumulated from task outcomes, fanned out to subscribed agents.

pub mod error;
pub mod flow;
pub mod store;

pub use error::KnowledgeError;
pub use flow::{FlowMetrics, KnowledgeFlow, RequestFlowResult};
pub use store::{KnowledgeQuery, KnowledgeStore};
