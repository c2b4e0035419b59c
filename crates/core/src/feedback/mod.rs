pub mod dispatcher;
pub mod domain;
pub mod infrastructure;
