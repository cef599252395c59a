pub mod commands;
pub mod draft;
pub mod events;
pub mod funnel;
pub mod step;
pub mod validation;
pub mod vehicle;
