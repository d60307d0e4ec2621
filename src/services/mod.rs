//! Provisioning logic, separated from HTTP and from the system tools

pub mod connectivity;
pub mod credentials;
pub mod next_stage;
pub mod shutdown;
