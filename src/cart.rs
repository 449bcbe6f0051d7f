//! Cart/pricing engine — the POS state machine.
//!
//! Holds cart line items, per-item and cart-wide discounts, held-sale
//! snapshots, and the single authoritative recompute for all derived
//! totals.
//!
//! Key design goals:
//! - **Single recompute**: derived fields (`subtotal`, `discount_amount`,
//!   `tax`, `total` on lines; the aggregate totals) are written only inside
//!   `recalculate` — no mutation path can leave items and totals out of sync
//! - **Synchronous**: pure in-memory state transition, no I/O, no awaits
//! - **Recoverable errors**: failed operations return a [`CartError`] and
//!   park it in a last-error slot the UI reads; the engine never panics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CartError;

/// Round a monetary value to cents. Applied to every derived field so
/// aggregates compare cleanly across recomputes.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Inputs from the catalog/customer screens (UI-validated)
// ---------------------------------------------------------------------------

/// Catalog product as handed over by the product screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub price: f64,
    /// Fraction (0.1 = 10%). `None` falls back to the cart-wide default.
    #[serde(default)]
    pub tax_rate: Option<f64>,
}

/// Optional product variant (size, color). A variant price overrides the
/// product price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
}

/// Customer association — a reference, not owned data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Discounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A discount, cart-wide or per-line.
///
/// `amount` is derived: it is recomputed from `kind`/`value` against the
/// current base on every recalculation and must never be trusted as input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    #[serde(rename = "type")]
    pub kind: DiscountType,
    pub value: f64,
    #[serde(default)]
    pub amount: f64,
}

impl Discount {
    /// Percentage discount, 0–100.
    pub fn percentage(value: f64) -> Result<Self, CartError> {
        if !(0.0..=100.0).contains(&value) {
            return Err(CartError::InvalidDiscount(format!(
                "percentage must be 0-100, got {value}"
            )));
        }
        Ok(Self {
            kind: DiscountType::Percentage,
            value,
            amount: 0.0,
        })
    }

    /// Fixed money discount, >= 0.
    pub fn fixed(value: f64) -> Result<Self, CartError> {
        if value < 0.0 {
            return Err(CartError::InvalidDiscount(format!(
                "fixed amount must be >= 0, got {value}"
            )));
        }
        Ok(Self {
            kind: DiscountType::Fixed,
            value,
            amount: 0.0,
        })
    }

    /// Compute this discount's amount against a base subtotal. A fixed
    /// discount is flat — it never scales with the base or item count.
    fn amount_against(&self, base: f64) -> f64 {
        match self.kind {
            DiscountType::Percentage => round2(base * self.value / 100.0),
            DiscountType::Fixed => round2(self.value),
        }
    }
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// One product (optionally one variant) in the cart.
///
/// The `(product_id, variant_id)` pair is the line's identity: adding a
/// matching product merges into the existing line instead of duplicating.
/// `subtotal`, `discount_amount`, `tax` and `total` are derived and only
/// ever written by the engine's recompute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub name: String,
    pub sku: String,
    pub quantity: i64,
    pub unit_price: f64,
    /// Fraction, 0..=1.
    pub tax_rate: f64,
    pub discount: Option<Discount>,
    // Derived — written by recalculate() only.
    pub subtotal: f64,
    pub discount_amount: f64,
    pub tax: f64,
    pub total: f64,
}

impl CartLineItem {
    fn matches(&self, product_id: &str, variant_id: Option<&str>) -> bool {
        self.product_id == product_id && self.variant_id.as_deref() == variant_id
    }
}

// ---------------------------------------------------------------------------
// Aggregate totals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: f64,
    pub discount_total: f64,
    pub tax_total: f64,
    pub total: f64,
    pub item_count: i64,
}

// ---------------------------------------------------------------------------
// Transactions & held sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    OnHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub method: PaymentMethod,
    pub amount: f64,
}

/// Read-only projection of the cart, ready for submission to the remote
/// transaction API (the submission call itself is out of scope here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub items: Vec<CartLineItem>,
    pub customer: Option<Customer>,
    pub cart_discount: Option<Discount>,
    pub notes: String,
    pub totals: CartTotals,
    /// Empty at creation — payment collection happens downstream.
    pub payments: Vec<Payment>,
    pub status: TransactionStatus,
    pub source: String,
    pub operator_id: String,
    pub branch_id: String,
    pub created_at: DateTime<Utc>,
}

/// A named snapshot of an in-progress sale, parked out of the live cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldSale {
    pub id: Uuid,
    pub name: String,
    pub snapshot: Transaction,
    pub held_by: String,
    pub held_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The cart engine. One instance per terminal session.
///
/// Every mutation is followed by a synchronous recompute before it returns,
/// so callers never observe items and totals out of sync.
#[derive(Debug, Clone)]
pub struct CartEngine {
    operator_id: String,
    branch_id: String,
    default_tax_rate: f64,
    items: Vec<CartLineItem>,
    customer: Option<Customer>,
    cart_discount: Option<Discount>,
    notes: String,
    totals: CartTotals,
    held_sales: Vec<HeldSale>,
    last_error: Option<CartError>,
}

impl CartEngine {
    pub fn new(operator_id: &str, branch_id: &str, default_tax_rate: f64) -> Self {
        Self {
            operator_id: operator_id.to_string(),
            branch_id: branch_id.to_string(),
            default_tax_rate,
            items: Vec::new(),
            customer: None,
            cart_discount: None,
            notes: String::new(),
            totals: CartTotals::default(),
            held_sales: Vec::new(),
            last_error: None,
        }
    }

    // -- reads --------------------------------------------------------------

    pub fn items(&self) -> &[CartLineItem] {
        &self.items
    }

    pub fn totals(&self) -> CartTotals {
        self.totals
    }

    pub fn customer(&self) -> Option<&Customer> {
        self.customer.as_ref()
    }

    pub fn cart_discount(&self) -> Option<&Discount> {
        self.cart_discount.as_ref()
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn held_sales(&self) -> &[HeldSale] {
        &self.held_sales
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Last recoverable error, for the UI to surface. Overwritten by each
    /// failing operation; not a queue.
    pub fn last_error(&self) -> Option<&CartError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    fn fail<T>(&mut self, err: CartError) -> Result<T, CartError> {
        self.last_error = Some(err.clone());
        Err(err)
    }

    // -- item mutations -----------------------------------------------------

    /// Add a product (optionally a variant) to the cart.
    ///
    /// Merges into an existing `(product_id, variant_id)` line by bumping
    /// its quantity; otherwise appends a new line priced at
    /// `variant.price` falling back to `product.price`, taxed at
    /// `product.tax_rate` falling back to the cart default.
    ///
    /// Quantities below 1 are clamped to 1.
    pub fn add_item(&mut self, product: &Product, quantity: i64, variant: Option<&ProductVariant>) {
        let quantity = quantity.max(1);
        let variant_id = variant.map(|v| v.id.as_str());

        if let Some(line) = self
            .items
            .iter_mut()
            .find(|l| l.matches(&product.id, variant_id))
        {
            line.quantity += quantity;
            self.recalculate();
            return;
        }

        let unit_price = variant.and_then(|v| v.price).unwrap_or(product.price);
        let name = match variant {
            Some(v) => format!("{} ({})", product.name, v.name),
            None => product.name.clone(),
        };

        self.items.push(CartLineItem {
            product_id: product.id.clone(),
            variant_id: variant.map(|v| v.id.clone()),
            name,
            sku: product.sku.clone(),
            quantity,
            unit_price,
            tax_rate: product.tax_rate.unwrap_or(self.default_tax_rate),
            discount: None,
            subtotal: 0.0,
            discount_amount: 0.0,
            tax: 0.0,
            total: 0.0,
        });
        self.recalculate();
    }

    /// Remove a line if present. Idempotent — removing an absent line is a
    /// no-op.
    pub fn remove_item(&mut self, product_id: &str, variant_id: Option<&str>) {
        self.items.retain(|l| !l.matches(product_id, variant_id));
        self.recalculate();
    }

    /// Set a line's quantity. A quantity of zero or less removes the line.
    pub fn update_item_quantity(
        &mut self,
        product_id: &str,
        quantity: i64,
        variant_id: Option<&str>,
    ) {
        if quantity <= 0 {
            self.remove_item(product_id, variant_id);
            return;
        }
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|l| l.matches(product_id, variant_id))
        {
            line.quantity = quantity;
        }
        self.recalculate();
    }

    pub fn apply_item_discount(
        &mut self,
        product_id: &str,
        discount: Discount,
        variant_id: Option<&str>,
    ) {
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|l| l.matches(product_id, variant_id))
        {
            line.discount = Some(discount);
        }
        self.recalculate();
    }

    pub fn remove_item_discount(&mut self, product_id: &str, variant_id: Option<&str>) {
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|l| l.matches(product_id, variant_id))
        {
            line.discount = None;
        }
        self.recalculate();
    }

    // -- cart-level mutations -----------------------------------------------

    pub fn apply_cart_discount(&mut self, discount: Discount) {
        self.cart_discount = Some(discount);
        self.recalculate();
    }

    pub fn remove_cart_discount(&mut self) {
        self.cart_discount = None;
        self.recalculate();
    }

    /// Empty the live cart: items, customer, discount, notes, totals.
    /// Held sales are untouched.
    pub fn clear_cart(&mut self) {
        self.items.clear();
        self.customer = None;
        self.cart_discount = None;
        self.notes.clear();
        self.recalculate();
    }

    /// Customer doesn't affect totals — plain assignment, no recompute.
    pub fn select_customer(&mut self, customer: Option<Customer>) {
        self.customer = customer;
    }

    pub fn set_notes(&mut self, text: &str) {
        self.notes = text.to_string();
    }

    // -- recompute ----------------------------------------------------------

    /// The authoritative recompute. Every derived field on every line and
    /// the aggregate totals are rewritten from scratch.
    ///
    /// Tax is computed per line on that line's discounted subtotal using
    /// that line's own rate. The cart-wide discount reduces
    /// `discount_total` and `total` but NOT the per-line taxable base —
    /// source-observed behavior kept for compatibility; flagged as a
    /// product decision to confirm (most jurisdictions tax the
    /// post-discount amount).
    pub fn recalculate(&mut self) {
        let mut subtotal = 0.0;
        let mut item_count = 0i64;
        let mut item_discount_total = 0.0;
        let mut tax_total = 0.0;

        for line in &mut self.items {
            line.subtotal = round2(line.unit_price * line.quantity as f64);
            line.discount_amount = match line.discount.as_mut() {
                Some(d) => {
                    let amount = d.amount_against(line.subtotal);
                    d.amount = amount;
                    amount
                }
                None => 0.0,
            };
            let taxable = (line.subtotal - line.discount_amount).max(0.0);
            line.tax = round2(taxable * line.tax_rate);
            line.total = round2(line.subtotal - line.discount_amount + line.tax);

            subtotal += line.subtotal;
            item_count += line.quantity;
            item_discount_total += line.discount_amount;
            tax_total += line.tax;
        }

        let subtotal = round2(subtotal);
        let cart_discount_amount = match self.cart_discount.as_mut() {
            Some(d) => {
                d.amount = d.amount_against(subtotal);
                d.amount
            }
            None => 0.0,
        };

        self.totals = CartTotals {
            subtotal,
            discount_total: round2(item_discount_total + cart_discount_amount),
            tax_total: round2(tax_total),
            total: round2(subtotal - (item_discount_total + cart_discount_amount) + tax_total),
            item_count,
        };
    }

    // -- hold / retrieve ----------------------------------------------------

    /// Park the live cart as a named held sale, then clear the cart.
    /// Fails on an empty cart, leaving the cart untouched.
    pub fn hold_sale(&mut self, name: Option<&str>) -> Result<Uuid, CartError> {
        if self.items.is_empty() {
            return self.fail(CartError::EmptyCart);
        }

        let name = match name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => format!("Sale {}", self.held_sales.len() + 1),
        };

        let snapshot = self.build_transaction(TransactionStatus::OnHold);
        let held = HeldSale {
            id: Uuid::new_v4(),
            name,
            snapshot,
            held_by: self.operator_id.clone(),
            held_at: Utc::now(),
        };
        let id = held.id;
        self.held_sales.push(held);
        self.clear_cart();
        Ok(id)
    }

    /// Restore a held sale into the live cart and drop it from the held
    /// list. The previous live-cart contents are replaced wholesale.
    pub fn retrieve_sale(&mut self, sale_id: Uuid) -> Result<(), CartError> {
        let pos = match self.held_sales.iter().position(|h| h.id == sale_id) {
            Some(p) => p,
            None => return self.fail(CartError::HeldSaleNotFound(sale_id.to_string())),
        };
        let held = self.held_sales.remove(pos);

        self.items = held.snapshot.items;
        self.customer = held.snapshot.customer;
        self.cart_discount = held.snapshot.cart_discount;
        self.notes = held.snapshot.notes;
        self.recalculate();
        Ok(())
    }

    pub fn delete_held_sale(&mut self, sale_id: Uuid) -> Result<(), CartError> {
        let before = self.held_sales.len();
        self.held_sales.retain(|h| h.id != sale_id);
        if self.held_sales.len() == before {
            return self.fail(CartError::HeldSaleNotFound(sale_id.to_string()));
        }
        Ok(())
    }

    pub fn clear_held_sales(&mut self) {
        self.held_sales.clear();
    }

    // -- checkout -----------------------------------------------------------

    /// Build the pending transaction for the current cart. Fails on an
    /// empty cart. The cart itself is left untouched — the caller clears it
    /// after the downstream submission succeeds.
    pub fn create_transaction(&mut self) -> Result<Transaction, CartError> {
        if self.items.is_empty() {
            return self.fail(CartError::EmptyCart);
        }
        Ok(self.build_transaction(TransactionStatus::Pending))
    }

    fn build_transaction(&self, status: TransactionStatus) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            items: self.items.clone(),
            customer: self.customer.clone(),
            cart_discount: self.cart_discount.clone(),
            notes: self.notes.clone(),
            totals: self.totals,
            payments: Vec::new(),
            status,
            source: "pos".to_string(),
            operator_id: self.operator_id.clone(),
            branch_id: self.branch_id.clone(),
            created_at: Utc::now(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CartEngine {
        CartEngine::new("op-1", "branch-1", 0.0)
    }

    fn product(id: &str, price: f64, tax_rate: f64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {id}"),
            sku: format!("SKU-{id}"),
            price,
            tax_rate: Some(tax_rate),
        }
    }

    #[test]
    fn test_add_item_subtotal() {
        let mut cart = engine();
        cart.add_item(&product("a", 9.99, 0.0), 2, None);
        assert_eq!(cart.totals().subtotal, 19.98);
        assert_eq!(cart.totals().item_count, 2);
    }

    #[test]
    fn test_add_same_product_merges() {
        let mut cart = engine();
        let p = product("a", 10.0, 0.0);
        cart.add_item(&p, 2, None);
        cart.add_item(&p, 3, None);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
    }

    #[test]
    fn test_same_product_different_variant_gets_own_line() {
        let mut cart = engine();
        let p = product("a", 10.0, 0.0);
        let small = ProductVariant {
            id: "s".into(),
            name: "Small".into(),
            price: Some(8.0),
        };
        let large = ProductVariant {
            id: "l".into(),
            name: "Large".into(),
            price: None,
        };
        cart.add_item(&p, 1, Some(&small));
        cart.add_item(&p, 1, Some(&large));
        assert_eq!(cart.items().len(), 2);
        // Variant price overrides; missing variant price falls back
        assert_eq!(cart.items()[0].unit_price, 8.0);
        assert_eq!(cart.items()[1].unit_price, 10.0);
    }

    #[test]
    fn test_add_quantity_clamped_to_one() {
        let mut cart = engine();
        cart.add_item(&product("a", 5.0, 0.0), 0, None);
        assert_eq!(cart.items()[0].quantity, 1);
        cart.add_item(&product("b", 5.0, 0.0), -3, None);
        assert_eq!(cart.items()[1].quantity, 1);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cart = engine();
        cart.add_item(&product("a", 5.0, 0.0), 2, None);
        cart.update_item_quantity("a", 0, None);
        assert!(cart.is_empty());
        assert_eq!(cart.totals().subtotal, 0.0);
    }

    #[test]
    fn test_update_quantity_negative_removes() {
        let mut cart = engine();
        cart.add_item(&product("a", 5.0, 0.0), 2, None);
        cart.update_item_quantity("a", -5, None);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_absent_item_is_noop() {
        let mut cart = engine();
        cart.add_item(&product("a", 5.0, 0.0), 1, None);
        cart.remove_item("zzz", None);
        assert_eq!(cart.items().len(), 1);
        assert!(cart.last_error().is_none());
    }

    #[test]
    fn test_item_discount_reduces_tax_base() {
        let mut cart = engine();
        cart.add_item(&product("a", 100.0, 0.1), 1, None);
        cart.apply_item_discount("a", Discount::percentage(10.0).unwrap(), None);

        let line = &cart.items()[0];
        assert_eq!(line.discount_amount, 10.0);
        // Tax computed on 90, not 100
        assert_eq!(line.tax, 9.0);
        assert_eq!(cart.totals().total, 99.0);
    }

    #[test]
    fn test_fixed_cart_discount_is_flat() {
        let mut cart = engine();
        cart.add_item(&product("a", 10.0, 0.0), 3, None);
        cart.add_item(&product("b", 4.0, 0.0), 2, None);
        cart.add_item(&product("c", 1.0, 0.0), 7, None);
        cart.apply_cart_discount(Discount::fixed(5.0).unwrap());

        assert_eq!(cart.cart_discount().unwrap().amount, 5.0);
        assert_eq!(cart.totals().discount_total, 5.0);
        // 30 + 8 + 7 = 45; flat 5 off
        assert_eq!(cart.totals().total, 40.0);
    }

    #[test]
    fn test_cart_discount_does_not_reduce_tax_base() {
        // Documents the preserved source behavior: tax is computed as if
        // the cart-wide discount didn't exist.
        let mut cart = engine();
        cart.add_item(&product("a", 100.0, 0.1), 1, None);
        cart.apply_cart_discount(Discount::percentage(50.0).unwrap());

        assert_eq!(cart.totals().discount_total, 50.0);
        assert_eq!(cart.totals().tax_total, 10.0); // on 100, not 50
        assert_eq!(cart.totals().total, 60.0); // (100 - 50) + 10
    }

    #[test]
    fn test_spec_scenario_mixed_cart() {
        // item A: 10 × 2, 10% tax; item B: 5 × 1, 20% tax, 20% discount
        let mut cart = engine();
        cart.add_item(&product("a", 10.0, 0.1), 2, None);
        cart.add_item(&product("b", 5.0, 0.2), 1, None);
        cart.apply_item_discount("b", Discount::percentage(20.0).unwrap(), None);

        let totals = cart.totals();
        assert_eq!(totals.subtotal, 25.0);
        assert_eq!(cart.items()[1].discount_amount, 1.0);
        assert_eq!(totals.discount_total, 1.0);
        assert_eq!(totals.tax_total, 2.8); // (20 × 0.1) + (4 × 0.2)
        assert_eq!(totals.total, 26.8); // (25 − 1) + 2.8
    }

    #[test]
    fn test_remove_item_discount() {
        let mut cart = engine();
        cart.add_item(&product("a", 100.0, 0.0), 1, None);
        cart.apply_item_discount("a", Discount::fixed(25.0).unwrap(), None);
        assert_eq!(cart.totals().discount_total, 25.0);
        cart.remove_item_discount("a", None);
        assert_eq!(cart.totals().discount_total, 0.0);
        assert_eq!(cart.totals().total, 100.0);
    }

    #[test]
    fn test_default_tax_rate_fallback() {
        let mut cart = CartEngine::new("op-1", "branch-1", 0.24);
        let mut p = product("a", 10.0, 0.0);
        p.tax_rate = None;
        cart.add_item(&p, 1, None);
        assert_eq!(cart.items()[0].tax_rate, 0.24);
        assert_eq!(cart.totals().tax_total, 2.4);
    }

    #[test]
    fn test_invalid_discounts_rejected() {
        assert!(Discount::percentage(120.0).is_err());
        assert!(Discount::percentage(-1.0).is_err());
        assert!(Discount::fixed(-0.5).is_err());
        assert!(Discount::percentage(100.0).is_ok());
        assert!(Discount::fixed(0.0).is_ok());
    }

    #[test]
    fn test_clear_cart_keeps_held_sales() {
        let mut cart = engine();
        cart.add_item(&product("a", 5.0, 0.0), 1, None);
        cart.hold_sale(None).unwrap();
        cart.add_item(&product("b", 5.0, 0.0), 1, None);
        cart.set_notes("note");
        cart.clear_cart();

        assert!(cart.is_empty());
        assert_eq!(cart.notes(), "");
        assert_eq!(cart.held_sales().len(), 1);
    }

    #[test]
    fn test_hold_empty_cart_fails() {
        let mut cart = engine();
        let err = cart.hold_sale(None).unwrap_err();
        assert_eq!(err, CartError::EmptyCart);
        assert_eq!(cart.last_error(), Some(&CartError::EmptyCart));
        assert!(cart.held_sales().is_empty());
    }

    #[test]
    fn test_hold_snapshots_and_clears() {
        let mut cart = engine();
        cart.add_item(&product("a", 10.0, 0.1), 2, None);
        let pre_totals = cart.totals();

        let id = cart.hold_sale(None).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.held_sales().len(), 1);

        let held = &cart.held_sales()[0];
        assert_eq!(held.id, id);
        assert_eq!(held.name, "Sale 1");
        assert_eq!(held.held_by, "op-1");
        assert_eq!(held.snapshot.status, TransactionStatus::OnHold);
        assert_eq!(held.snapshot.totals, pre_totals);
    }

    #[test]
    fn test_hold_default_names_count_up() {
        let mut cart = engine();
        cart.add_item(&product("a", 1.0, 0.0), 1, None);
        cart.hold_sale(None).unwrap();
        cart.add_item(&product("b", 1.0, 0.0), 1, None);
        cart.hold_sale(None).unwrap();
        assert_eq!(cart.held_sales()[0].name, "Sale 1");
        assert_eq!(cart.held_sales()[1].name, "Sale 2");
    }

    #[test]
    fn test_retrieve_round_trips_totals() {
        let mut cart = engine();
        cart.add_item(&product("a", 10.0, 0.1), 2, None);
        cart.add_item(&product("b", 5.0, 0.2), 1, None);
        cart.apply_item_discount("b", Discount::percentage(20.0).unwrap(), None);
        cart.apply_cart_discount(Discount::fixed(2.0).unwrap());
        cart.set_notes("table 4");
        let pre = cart.totals();

        let id = cart.hold_sale(Some("Lunch")).unwrap();
        assert!(cart.is_empty());

        cart.retrieve_sale(id).unwrap();
        cart.recalculate();
        assert_eq!(cart.totals(), pre);
        assert_eq!(cart.notes(), "table 4");
        assert!(cart.held_sales().is_empty());
    }

    #[test]
    fn test_retrieve_unknown_fails() {
        let mut cart = engine();
        let missing = Uuid::new_v4();
        let err = cart.retrieve_sale(missing).unwrap_err();
        assert!(matches!(err, CartError::HeldSaleNotFound(_)));
        assert!(cart.last_error().is_some());
    }

    #[test]
    fn test_delete_held_sale() {
        let mut cart = engine();
        cart.add_item(&product("a", 1.0, 0.0), 1, None);
        let id = cart.hold_sale(None).unwrap();

        // Live cart untouched by held-sale deletes
        cart.add_item(&product("b", 2.0, 0.0), 1, None);
        cart.delete_held_sale(id).unwrap();
        assert!(cart.held_sales().is_empty());
        assert_eq!(cart.items().len(), 1);

        assert!(cart.delete_held_sale(id).is_err());
    }

    #[test]
    fn test_create_transaction_empty_cart_fails() {
        let mut cart = engine();
        assert_eq!(cart.create_transaction().unwrap_err(), CartError::EmptyCart);
    }

    #[test]
    fn test_create_transaction_shape() {
        let mut cart = engine();
        cart.add_item(&product("a", 10.0, 0.1), 1, None);
        cart.select_customer(Some(Customer {
            id: "c1".into(),
            name: "Alice".into(),
        }));

        let tx = cart.create_transaction().unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.payments.is_empty());
        assert_eq!(tx.source, "pos");
        assert_eq!(tx.operator_id, "op-1");
        assert_eq!(tx.branch_id, "branch-1");
        assert_eq!(tx.totals.total, cart.totals().total);
        assert_eq!(tx.customer.as_ref().unwrap().name, "Alice");

        // Creating a transaction leaves the cart intact
        assert_eq!(cart.items().len(), 1);
    }

    #[test]
    fn test_error_slot_overwrites() {
        let mut cart = engine();
        let _ = cart.hold_sale(None);
        assert_eq!(cart.last_error(), Some(&CartError::EmptyCart));
        let missing = Uuid::new_v4();
        let _ = cart.retrieve_sale(missing);
        assert!(matches!(
            cart.last_error(),
            Some(CartError::HeldSaleNotFound(_))
        ));
        cart.clear_error();
        assert!(cart.last_error().is_none());
    }

    #[test]
    fn test_subtotal_invariant_over_mutation_sequences() {
        let mut cart = engine();
        let a = product("a", 3.33, 0.0);
        let b = product("b", 7.5, 0.0);
        cart.add_item(&a, 2, None);
        cart.add_item(&b, 1, None);
        cart.update_item_quantity("a", 5, None);
        cart.remove_item("b", None);
        cart.add_item(&b, 4, None);

        let expected: f64 = cart
            .items()
            .iter()
            .map(|l| l.unit_price * l.quantity as f64)
            .sum();
        assert_eq!(cart.totals().subtotal, (expected * 100.0).round() / 100.0);
    }
}
