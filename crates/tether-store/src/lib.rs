pub mod ledger;
pub mod registry;
pub mod store;

pub use ledger::MessageLedger;
pub use registry::SessionRegistry;
pub use store::ChatStore;
