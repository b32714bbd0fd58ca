pub mod environment;
pub mod kg;
pub mod logging;
pub mod matcher;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod similarity;
pub mod table;
pub mod targets;

pub const TARGET_KG_REQUEST: &str = "kg_request";
pub const TARGET_PIPELINE: &str = "pipeline";
pub const TARGET_STATS: &str = "stats";
