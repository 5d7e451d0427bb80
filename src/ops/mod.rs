pub mod normalize_ops;
pub mod phone_ops;
pub mod classify_ops;
pub mod similarity_ops;
pub mod cluster_ops;
pub mod merge_ops;
pub mod pipeline_ops;
