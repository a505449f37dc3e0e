// Concrete implementations of the domain ports.

pub mod collaboratemd;
pub mod salesforce;
pub mod state;

pub use collaboratemd::CollaborateMdClient;
pub use salesforce::SalesforceClient;
