pub mod agents;
pub mod audit;
pub mod credentials;
pub mod git;
pub mod inventories;
pub mod jobs;
pub mod nb2cmk;
pub mod rbac;
pub mod settings;
pub mod users;
