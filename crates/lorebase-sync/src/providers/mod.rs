//! Built-in provider implementations.

pub mod azure_devops;
pub mod box_drive;
pub mod confluence;
pub mod github;
pub mod google_drive;
pub mod jira;
pub mod sharepoint;
