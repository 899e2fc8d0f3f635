//! Wallet balance, history and withdrawals.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{with_retry, Context};
use crate::domain::aggregates::{TransactionKind, Wallet, WalletTransaction};
use crate::domain::value_objects::Money;
use crate::store::Changeset;
use crate::{MarketplaceError, Result};

#[derive(Clone)]
pub struct WalletService { ctx: Context }

impl WalletService {
    pub(crate) fn new(ctx: Context) -> Self { Self { ctx } }

    /// The owner's wallet, opened with a zero balance on first access.
    pub async fn wallet(&self, owner_id: Uuid) -> Result<Wallet> {
        with_retry("open_wallet", || ensure_wallet(&self.ctx, owner_id)).await
    }

    /// Ledger lines, newest first.
    pub async fn transactions(&self, owner_id: Uuid) -> Result<Vec<WalletTransaction>> {
        match self.ctx.store.wallet_for_owner(owner_id).await? {
            Some(wallet) => Ok(self.ctx.store.wallet_transactions(wallet.id()).await?),
            None => Ok(vec![]),
        }
    }

    /// Pays out part of the balance. Fails without a trace when the balance
    /// is short.
    pub async fn withdraw(&self, owner_id: Uuid, amount: Decimal) -> Result<WalletTransaction> {
        with_retry("withdraw", || async move {
            let mut wallet = self.ctx.store.wallet_for_owner(owner_id).await?.ok_or(MarketplaceError::NotFound("wallet"))?;
            let amount = Money::new(amount, wallet.currency());
            let change = wallet.debit(&amount)?;
            let entry = WalletTransaction::completed(wallet.id(), TransactionKind::Withdrawal, amount, change, None, "Withdrawal");
            self.ctx.commit(Changeset { wallets: vec![wallet], transactions: vec![entry.clone()], ..Changeset::new() }).await?;
            tracing::info!(%owner_id, transaction_id = %entry.id(), amount = %entry.amount(), "wallet withdrawal");
            Ok(entry)
        })
        .await
    }
}

/// The stored wallet, or a fresh unsaved one. Committing the fresh wallet
/// inserts it; a concurrent insert surfaces as a duplicate and is retried.
pub(crate) async fn load_or_open(ctx: &Context, owner_id: Uuid) -> Result<Wallet> {
    Ok(match ctx.store.wallet_for_owner(owner_id).await? {
        Some(wallet) => wallet,
        None => Wallet::open(owner_id, &ctx.settings.currency),
    })
}

/// The stored wallet, saving a fresh one first if needed.
pub(crate) async fn ensure_wallet(ctx: &Context, owner_id: Uuid) -> Result<Wallet> {
    if let Some(wallet) = ctx.store.wallet_for_owner(owner_id).await? {
        return Ok(wallet);
    }
    ctx.commit(Changeset { wallets: vec![Wallet::open(owner_id, &ctx.settings.currency)], ..Changeset::new() }).await?;
    tracing::info!(%owner_id, "wallet opened");
    ctx.store.wallet_for_owner(owner_id).await?.ok_or(MarketplaceError::NotFound("wallet"))
}
