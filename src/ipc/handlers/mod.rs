pub mod core;
pub mod records;
pub mod search;
pub mod session;
pub mod view;
