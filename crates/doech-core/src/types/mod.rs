mod ids;
mod request;
mod summary;

pub use ids::{GroupId, RequestId, TabId, TabInstance};
pub use request::{Observation, RequestKind, RequestRecord, ResourceType, SecurityInfo};
pub use summary::{Scope, Summary, SummaryPair};
