mod bearer;
mod broker;

pub use bearer::Bearer;
pub use broker::CredentialBroker;
