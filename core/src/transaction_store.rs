use crate::model::Transaction;

/// Durable record of successful on-chain transactions, one per anchoring
/// cycle that made it to the chain.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, transaction: Transaction) -> anyhow::Result<()>;
}
