//! Paying for checkout sessions and topping up wallets.
//!
//! A wallet payment settles synchronously. A VNPay payment is recorded as a
//! pending [`Payment`] whose id is the gateway transaction reference; the
//! browser return and the server-to-server IPN both resolve it, in either
//! order and any number of times.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::checkout::CheckoutSession;
use super::wallet::{ensure_wallet, load_or_open};
use super::{with_retry, CheckoutService, Context};
use crate::domain::aggregates::{
    FulfillmentStatus, GatewayReceipt, Order, OrderGroup, Payment, PaymentMethod, PaymentPurpose, PaymentState,
    PaymentStatus, TransactionKind, WalletTransaction,
};
use crate::domain::value_objects::Money;
use crate::payments::{IpnResponse, PaymentRequest, VnPayCallback, VnPayClient, VnPayError};
use crate::store::Changeset;
use crate::{MarketplaceError, Result};

/// Where to send the buyer to complete a gateway payment.
#[derive(Clone, Debug, Serialize)]
pub struct PaymentRedirect {
    pub payment_id: Uuid,
    pub payment_url: String,
}

/// What a gateway callback did.
#[derive(Clone, Debug, Serialize)]
pub struct CallbackOutcome {
    pub payment_id: Uuid,
    pub purpose: PaymentPurpose,
    pub status: PaymentState,
    pub response_code: String,
    /// The payment had already been resolved by an earlier callback.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    ctx: Context,
    vnpay: Option<VnPayClient>,
}

impl PaymentService {
    pub(crate) fn new(ctx: Context, vnpay: Option<VnPayClient>) -> Self { Self { ctx, vnpay } }

    fn gateway(&self) -> Result<&VnPayClient> { self.vnpay.as_ref().ok_or(MarketplaceError::GatewayUnavailable) }

    /// Pays every open order of the session from the buyer's wallet.
    pub async fn pay_with_wallet(&self, buyer_id: Uuid, group_id: Uuid) -> Result<CheckoutSession> {
        with_retry("pay_with_wallet", || async move {
            let (mut group, mut orders) = self.payable_session(buyer_id, group_id).await?;
            let amount = amount_due(&group, &orders)?;

            let mut wallet = load_or_open(&self.ctx, buyer_id).await?;
            let change = wallet.debit(&amount)?;
            let mut payment = Payment::initiate(buyer_id, PaymentPurpose::OrderGroup { group_id }, PaymentMethod::Wallet, amount.clone());
            payment.succeed(GatewayReceipt::default())?;
            let entry = WalletTransaction::completed(
                wallet.id(), TransactionKind::Payment, amount.clone(), change, Some(payment.id()),
                format!("Payment for checkout {}", group_id.simple()),
            );
            mark_session_paid(&mut group, &mut orders, PaymentMethod::Wallet, Utc::now())?;

            let session = CheckoutSession { group: group.clone(), orders: orders.clone() };
            let debited = amount.clone();
            self.ctx
                .commit(Changeset {
                    groups: vec![group],
                    orders,
                    wallets: vec![wallet],
                    payments: vec![payment],
                    transactions: vec![entry],
                    ..Changeset::new()
                })
                .await?;
            tracing::info!(%group_id, %buyer_id, amount = %debited, "checkout paid from wallet");
            Ok(session)
        })
        .await
    }

    /// Opens a VNPay attempt for the session's open orders.
    pub async fn start_vnpay_checkout(&self, buyer_id: Uuid, group_id: Uuid, ip_addr: &str) -> Result<PaymentRedirect> {
        let gateway = self.gateway()?;
        let (group, orders) = self.payable_session(buyer_id, group_id).await?;
        let amount = amount_due(&group, &orders)?;

        let payment = Payment::initiate(buyer_id, PaymentPurpose::OrderGroup { group_id }, PaymentMethod::VnPay, amount);
        let order_info = format!("Thanh toan don hang {}", group_id.simple());
        let redirect = self.redirect(gateway, &payment, order_info, ip_addr, Some(group.expires_at()))?;
        self.ctx.commit(Changeset { payments: vec![payment], ..Changeset::new() }).await?;
        tracing::info!(%group_id, payment_id = %redirect.payment_id, "vnpay checkout started");
        Ok(redirect)
    }

    /// Opens a VNPay attempt that credits the user's wallet when it succeeds.
    pub async fn start_wallet_deposit(&self, user_id: Uuid, amount: Decimal, ip_addr: &str) -> Result<PaymentRedirect> {
        let gateway = self.gateway()?;
        let wallet = with_retry("open_wallet", || ensure_wallet(&self.ctx, user_id)).await?;
        let amount = Money::new(amount, wallet.currency());
        if !amount.is_positive() {
            return Err(MarketplaceError::Validation("deposit amount must be positive".into()));
        }

        let entry = WalletTransaction::pending(wallet.id(), TransactionKind::Deposit, amount.clone(), None, "Deposit via VNPay");
        let payment = Payment::initiate(
            user_id,
            PaymentPurpose::WalletDeposit { wallet_id: wallet.id(), transaction_id: entry.id() },
            PaymentMethod::VnPay,
            amount,
        );
        let entry = entry.with_reference(payment.id());
        let redirect = self.redirect(gateway, &payment, format!("Nap tien vao vi {}", wallet.id().simple()), ip_addr, None)?;
        self.ctx.commit(Changeset { payments: vec![payment], transactions: vec![entry], ..Changeset::new() }).await?;
        tracing::info!(%user_id, payment_id = %redirect.payment_id, "vnpay wallet deposit started");
        Ok(redirect)
    }

    fn redirect(&self, gateway: &VnPayClient, payment: &Payment, order_info: String, ip_addr: &str, deadline: Option<DateTime<Utc>>) -> Result<PaymentRedirect> {
        let payment_url = gateway.create_payment_url(&PaymentRequest {
            txn_ref: payment.id().simple().to_string(),
            amount: payment.amount().amount(),
            order_info,
            ip_addr: ip_addr.to_string(),
            created_at: Utc::now(),
            deadline,
        })?;
        Ok(PaymentRedirect { payment_id: payment.id(), payment_url })
    }

    /// Browser return from VNPay.
    pub async fn handle_vnpay_return(&self, params: &HashMap<String, String>) -> Result<CallbackOutcome> {
        self.apply_callback(params).await
    }

    /// Server-to-server notification from VNPay. Never fails: every outcome
    /// maps to a response code the gateway understands.
    pub async fn handle_vnpay_ipn(&self, params: &HashMap<String, String>) -> IpnResponse {
        match self.apply_callback(params).await {
            Ok(outcome) if outcome.replayed => IpnResponse::AlreadyConfirmed,
            Ok(_) => IpnResponse::Confirmed,
            Err(MarketplaceError::Gateway(VnPayError::InvalidSignature)) => IpnResponse::InvalidSignature,
            Err(MarketplaceError::NotFound(_)) => IpnResponse::OrderNotFound,
            Err(MarketplaceError::AmountMismatch { .. }) => IpnResponse::InvalidAmount,
            Err(e) => {
                tracing::error!(error = %e, "vnpay ipn failed");
                IpnResponse::UnknownError
            }
        }
    }

    async fn apply_callback(&self, params: &HashMap<String, String>) -> Result<CallbackOutcome> {
        let callback = match self.gateway()?.verify(params) {
            Ok(callback) => callback,
            Err(e) => {
                tracing::warn!(error = %e, "rejected vnpay callback");
                return Err(e.into());
            }
        };
        let payment_id = Uuid::parse_str(&callback.txn_ref).map_err(|_| MarketplaceError::NotFound("payment"))?;
        with_retry("vnpay_callback", || self.resolve(payment_id, &callback)).await
    }

    async fn resolve(&self, payment_id: Uuid, callback: &VnPayCallback) -> Result<CallbackOutcome> {
        let mut payment = self.ctx.store.payment(payment_id).await?.ok_or(MarketplaceError::NotFound("payment"))?;
        if payment.amount().amount() != callback.amount {
            tracing::warn!(%payment_id, expected = %payment.amount(), received = %callback.amount, "vnpay amount mismatch");
            return Err(MarketplaceError::AmountMismatch { expected: payment.amount().amount(), received: callback.amount });
        }
        let mut outcome = CallbackOutcome {
            payment_id,
            purpose: payment.purpose(),
            status: payment.status(),
            response_code: callback.response_code.clone(),
            replayed: !payment.is_pending(),
        };
        if outcome.replayed {
            tracing::debug!(%payment_id, status = ?payment.status(), "vnpay callback replayed");
            return Ok(outcome);
        }

        let receipt = GatewayReceipt {
            transaction_no: callback.transaction_no.clone(),
            response_code: Some(callback.response_code.clone()),
            bank_code: callback.bank_code.clone(),
        };
        let changes = if callback.is_success() {
            payment.succeed(receipt)?;
            match payment.purpose() {
                PaymentPurpose::OrderGroup { group_id } => self.apply_order_payment(&payment, group_id, callback).await?,
                PaymentPurpose::WalletDeposit { transaction_id, .. } => self.apply_deposit(&payment, transaction_id).await?,
            }
        } else {
            payment.fail(receipt)?;
            let mut changes = Changeset::new();
            if let PaymentPurpose::WalletDeposit { transaction_id, .. } = payment.purpose() {
                let mut entry = self.deposit_entry(transaction_id).await?;
                entry.fail();
                changes.transactions.push(entry);
            }
            tracing::info!(%payment_id, response_code = %callback.response_code, "vnpay payment failed");
            changes
        };

        outcome.status = payment.status();
        self.ctx.commit(Changeset { payments: vec![payment], ..changes }).await?;
        Ok(outcome)
    }

    /// Marks the session paid. Money that arrives for a session that can no
    /// longer be paid, or that no longer matches what is due, is returned to
    /// the buyer's wallet.
    async fn apply_order_payment(&self, payment: &Payment, group_id: Uuid, callback: &VnPayCallback) -> Result<Changeset> {
        let mut group = self.ctx.store.order_group(group_id).await?.ok_or(MarketplaceError::NotFound("checkout session"))?;
        let mut orders = self.ctx.store.orders(group.order_ids()).await?;
        let paid_at = callback.pay_date.unwrap_or_else(Utc::now);
        let due = open_total(&group, &orders)?;

        if group.ensure_payable(paid_at).is_ok() && &due == payment.amount() {
            mark_session_paid(&mut group, &mut orders, PaymentMethod::VnPay, paid_at)?;
            tracing::info!(%group_id, payment_id = %payment.id(), "checkout paid via vnpay");
            return Ok(Changeset { groups: vec![group], orders, ..Changeset::new() });
        }

        let mut wallet = load_or_open(&self.ctx, payment.user_id()).await?;
        let change = wallet.credit(payment.amount())?;
        let entry = WalletTransaction::completed(
            wallet.id(), TransactionKind::Refund, payment.amount().clone(), change, Some(payment.id()),
            format!("Refund of late payment for checkout {}", group_id.simple()),
        );
        tracing::warn!(%group_id, payment_id = %payment.id(), status = ?group.status(), "late vnpay payment refunded to wallet");
        Ok(Changeset { wallets: vec![wallet], transactions: vec![entry], ..Changeset::new() })
    }

    async fn apply_deposit(&self, payment: &Payment, transaction_id: Uuid) -> Result<Changeset> {
        let mut entry = self.deposit_entry(transaction_id).await?;
        let mut wallet = self.ctx.store.wallet_for_owner(payment.user_id()).await?.ok_or(MarketplaceError::NotFound("wallet"))?;
        let change = wallet.credit(payment.amount())?;
        entry.succeed(change);
        tracing::info!(wallet_id = %wallet.id(), payment_id = %payment.id(), amount = %payment.amount(), "wallet deposit completed");
        Ok(Changeset { wallets: vec![wallet], transactions: vec![entry], ..Changeset::new() })
    }

    async fn deposit_entry(&self, id: Uuid) -> Result<WalletTransaction> {
        self.ctx.store.wallet_transaction(id).await?.ok_or(MarketplaceError::NotFound("wallet transaction"))
    }

    async fn payable_session(&self, buyer_id: Uuid, group_id: Uuid) -> Result<(OrderGroup, Vec<Order>)> {
        let CheckoutSession { group, orders } = CheckoutService::new(self.ctx.clone()).session(buyer_id, group_id).await?;
        group.ensure_payable(Utc::now())?;
        Ok((group, orders))
    }
}

fn is_open(order: &Order) -> bool {
    order.payment_status() == PaymentStatus::Pending && order.fulfillment_status() == FulfillmentStatus::Pending
}

fn open_total(group: &OrderGroup, orders: &[Order]) -> Result<Money> {
    let zero = Money::zero(group.total().currency());
    Ok(orders.iter().filter(|o| is_open(o)).try_fold(zero, |acc, o| acc.add(o.total()))?)
}

fn amount_due(group: &OrderGroup, orders: &[Order]) -> Result<Money> {
    let due = open_total(group, orders)?;
    if !due.is_positive() {
        return Err(MarketplaceError::Validation("checkout session has nothing left to pay".into()));
    }
    Ok(due)
}

fn mark_session_paid(group: &mut OrderGroup, orders: &mut [Order], method: PaymentMethod, at: DateTime<Utc>) -> Result<()> {
    for order in orders.iter_mut().filter(|o| is_open(o)) {
        order.mark_paid(method)?;
    }
    group.mark_paid(at)?;
    Ok(())
}
