pub mod containers;
pub mod events;
pub mod nodes;
pub mod pods;
pub mod sort;
pub mod summary;
pub mod types;

pub use containers::build_container_views;
pub use events::{events_for_node, events_for_pod};
pub use nodes::build_node_views;
pub use pods::build_pod_views;
pub use sort::{sort_pod_views, PodSortColumn};
pub use summary::{build_cluster_summary, summarize, SummaryInputs};
#[allow(unused_imports)]
pub use types::*;
