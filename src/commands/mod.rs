// Plan and apply against the local backend
pub mod apply;

// Cluster spec defaulting
pub mod defaults;
