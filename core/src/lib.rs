#[macro_use]
mod u256_struct;

mod account_info;
pub use account_info::AccountInfo;

mod amount;
pub use amount::Amount;

mod block_hash;
pub use block_hash::{BlockHash, BlockHashBuilder};

mod blocks;
pub use blocks::*;

mod pending;
pub use pending::{PendingInfo, PendingKey};

u256_struct!(Account);
u256_struct!(HashOrAccount);

impl From<HashOrAccount> for Account {
    fn from(source: HashOrAccount) -> Self {
        Account::from_bytes(*source.as_bytes())
    }
}

impl From<HashOrAccount> for BlockHash {
    fn from(source: HashOrAccount) -> Self {
        BlockHash::from_bytes(*source.as_bytes())
    }
}

impl From<Account> for HashOrAccount {
    fn from(account: Account) -> Self {
        HashOrAccount::from_bytes(*account.as_bytes())
    }
}

impl From<BlockHash> for HashOrAccount {
    fn from(hash: BlockHash) -> Self {
        HashOrAccount::from_bytes(*hash.as_bytes())
    }
}

pub fn write_hex_bytes(bytes: &[u8], f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
    for &byte in bytes {
        write!(f, "{:02X}", byte)?;
    }
    Ok(())
}
