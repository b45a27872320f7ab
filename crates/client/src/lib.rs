pub mod memory;
pub mod rest;
pub mod session;

pub use memory::{InMemoryConnector, InMemoryOrg, RemoteCall};
pub use rest::RestConnector;
pub use session::{Connector, CrmError, CrmSession, LoginInfo, QueryResult, SaveResult};
