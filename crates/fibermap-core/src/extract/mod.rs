pub mod aggregate;
pub mod classify;
pub mod pipeline;
pub mod rows;
pub mod sheet;
