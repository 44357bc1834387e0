mod block_status;
pub use block_status::BlockStatus;

mod store;
pub use store::{LedgerReadTxn, LedgerWriteTxn, SavedBlock};

mod ledger;
pub use ledger::{Ledger, NullLedgerBuilder};
