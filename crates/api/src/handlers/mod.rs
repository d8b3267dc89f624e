//! Route handlers, grouped by resource.

pub mod workflows;
pub mod nodes;
pub mod executions;
