mod ledger;
mod page;
mod transaction;
mod validation;

pub use ledger::*;
pub use page::*;
pub use transaction::*;
pub use validation::*;
