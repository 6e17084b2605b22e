mod currency;
mod daily_limit;
mod ledger;
mod money;
mod rate;
mod transaction;
mod wallet;

pub use currency::*;
pub use daily_limit::*;
pub use ledger::*;
pub use money::*;
pub use rate::*;
pub use transaction::*;
pub use wallet::*;
