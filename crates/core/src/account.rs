//! Account service contract: the external token ledger.

use async_trait::async_trait;

use crate::error::AccountError;

#[async_trait]
pub trait AccountService: Send + Sync {
    fn name(&self) -> &str;

    /// Tokens the user may still spend.
    async fn remaining_tokens(&self, user_id: &str) -> Result<u64, AccountError>;
}
