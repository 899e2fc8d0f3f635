//! Seller payouts for delivered orders.

use rust_decimal::Decimal;

use crate::domain::aggregates::{Order, TransactionKind, Wallet, WalletTransaction};
use crate::Result;

/// Splits a delivered order between the seller and the platform.
///
/// Commission is taken on the goods subtotal only; the seller keeps the
/// shipping fee.
#[derive(Clone, Copy, Debug)]
pub struct SettlementService { commission_rate: Decimal }

impl SettlementService {
    pub fn new(commission_rate: Decimal) -> Self { Self { commission_rate } }

    /// Records the settlement on `order` and credits `seller_wallet`.
    /// Both must then be committed together with the returned ledger line.
    pub fn settle(&self, order: &mut Order, seller_wallet: &mut Wallet) -> Result<WalletTransaction> {
        let commission = order.subtotal().percent(self.commission_rate);
        let payout = order.total().subtract(&commission)?;
        // order first: a second settlement must fail before money moves
        order.record_settlement(payout.clone(), commission.clone())?;
        let change = seller_wallet.credit(&payout)?;
        tracing::info!(
            order_id = %order.id(), seller_id = %order.seller_id(), %payout, %commission, "order settled"
        );
        Ok(WalletTransaction::completed(
            seller_wallet.id(),
            TransactionKind::Settlement,
            payout,
            change,
            Some(order.id()),
            format!("Settlement for order {}", order.code()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, LineItem, OrderError, PaymentMethod};
    use crate::domain::value_objects::Money;
    use crate::MarketplaceError;
    use uuid::Uuid;

    fn delivered(subtotal: i64, shipping: i64) -> Order {
        let unit_price = Money::vnd(Decimal::new(subtotal, 0));
        let line = LineItem { material_id: Uuid::new_v4(), name: "Hemp canvas".into(), quantity: 1, total: unit_price.clone(), unit_price };
        let mut order = Order::create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), vec![line], Money::vnd(Decimal::new(shipping, 0)), Address::default()).unwrap();
        order.mark_paid(PaymentMethod::Wallet).unwrap();
        order.start_processing().unwrap();
        order.ship(None).unwrap();
        order.deliver().unwrap();
        order
    }

    #[test]
    fn commission_on_subtotal_payout_includes_shipping() {
        let mut order = delivered(200_000, 30_000);
        let mut wallet = Wallet::open(order.seller_id(), "VND");
        let entry = SettlementService::new(Decimal::new(10, 2)).settle(&mut order, &mut wallet).unwrap();

        assert_eq!(entry.amount().amount(), Decimal::new(210_000, 0));
        assert_eq!(entry.kind(), TransactionKind::Settlement);
        assert_eq!(entry.reference(), Some(order.id()));
        assert_eq!(wallet.balance().amount(), Decimal::new(210_000, 0));
        let settlement = order.settlement().unwrap();
        assert_eq!(settlement.commission.amount(), Decimal::new(20_000, 0));
    }

    #[test]
    fn settles_once() {
        let mut order = delivered(100_000, 0);
        let mut wallet = Wallet::open(order.seller_id(), "VND");
        let service = SettlementService::new(Decimal::new(5, 2));
        service.settle(&mut order, &mut wallet).unwrap();
        let err = service.settle(&mut order, &mut wallet).unwrap_err();
        assert!(matches!(err, MarketplaceError::Order(OrderError::AlreadySettled)));
        assert_eq!(wallet.balance().amount(), Decimal::new(95_000, 0));
    }
}
