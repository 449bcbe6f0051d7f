//! Receipt value object handed from the cart/transaction layer to the
//! printer device. Pure data — layout and byte encoding happen in the
//! printer.

use serde::{Deserialize, Serialize};

use crate::cart::{PaymentMethod, Transaction};

/// One printed item line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItem {
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,
}

/// Everything the printer needs to render one receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptData {
    /// Store name / address block, printed centered and bold-first-line.
    pub header_lines: Vec<String>,
    pub items: Vec<ReceiptItem>,
    pub subtotal: f64,
    #[serde(default)]
    pub discount_total: f64,
    pub tax_total: f64,
    pub total: f64,
    /// "CASH" / "CARD" — omitted when payment hasn't been collected yet.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Thank-you / return-policy block, printed centered at the bottom.
    pub footer_lines: Vec<String>,
}

impl ReceiptData {
    /// Project a transaction into printable receipt data.
    ///
    /// `header_lines`/`footer_lines` come from branch configuration
    /// (out of scope here); item lines show the discounted line total.
    pub fn from_transaction(
        tx: &Transaction,
        header_lines: Vec<String>,
        footer_lines: Vec<String>,
        payment_method: Option<PaymentMethod>,
    ) -> Self {
        let items = tx
            .items
            .iter()
            .map(|line| ReceiptItem {
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.total,
            })
            .collect();

        let payment_method = payment_method.map(|m| {
            match m {
                PaymentMethod::Cash => "CASH",
                PaymentMethod::Card => "CARD",
                PaymentMethod::Mobile => "MOBILE",
                PaymentMethod::Other => "OTHER",
            }
            .to_string()
        });

        Self {
            header_lines,
            items,
            subtotal: tx.totals.subtotal,
            discount_total: tx.totals.discount_total,
            tax_total: tx.totals.tax_total,
            total: tx.totals.total,
            payment_method,
            footer_lines,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{CartEngine, Product};

    fn sample_transaction() -> Transaction {
        let mut cart = CartEngine::new("op-1", "branch-1", 0.1);
        cart.add_item(
            &Product {
                id: "a".into(),
                name: "Americano".into(),
                sku: "AM-1".into(),
                price: 3.5,
                tax_rate: None,
            },
            2,
            None,
        );
        cart.create_transaction().unwrap()
    }

    #[test]
    fn test_from_transaction_totals() {
        let tx = sample_transaction();
        let receipt = ReceiptData::from_transaction(
            &tx,
            vec!["TILLPOINT".into()],
            vec!["Thank you!".into()],
            Some(PaymentMethod::Cash),
        );

        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].quantity, 2);
        assert_eq!(receipt.subtotal, tx.totals.subtotal);
        assert_eq!(receipt.total, tx.totals.total);
        assert_eq!(receipt.payment_method.as_deref(), Some("CASH"));
        assert_eq!(receipt.header_lines, vec!["TILLPOINT".to_string()]);
    }

    #[test]
    fn test_no_payment_method_stays_none() {
        let tx = sample_transaction();
        let receipt = ReceiptData::from_transaction(&tx, vec![], vec![], None);
        assert!(receipt.payment_method.is_none());
    }

    #[test]
    fn test_item_line_uses_discounted_total() {
        use crate::cart::Discount;
        let mut cart = CartEngine::new("op-1", "branch-1", 0.0);
        cart.add_item(
            &Product {
                id: "a".into(),
                name: "Americano".into(),
                sku: "AM-1".into(),
                price: 10.0,
                tax_rate: Some(0.0),
            },
            1,
            None,
        );
        cart.apply_item_discount("a", Discount::percentage(10.0).unwrap(), None);
        let tx = cart.create_transaction().unwrap();

        let receipt = ReceiptData::from_transaction(&tx, vec![], vec![], None);
        assert_eq!(receipt.items[0].line_total, 9.0);
    }
}
