use async_trait::async_trait;

use crate::error::Result;
use crate::types::HashPath;

/// Read access to the data tree.
#[async_trait]
pub trait WorldState: Send + Sync {
    async fn get_hash_path(&self, leaf_index: u64) -> Result<HashPath>;
}
