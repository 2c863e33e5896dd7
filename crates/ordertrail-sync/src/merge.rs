//! Reconciliation of parsed records into canonical orders.
//!
//! Each lifecycle stage owns a subset of the order's fields. A stage may
//! overwrite what it owns and only backfill the rest, so a late delivery
//! message never replaces the total a confirmation already supplied.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use ordertrail_core::{
    CanonicalOrder, LifecycleStage, ParsedProduct, ParsedRecord, RawMessage,
    DEFAULT_RETURN_WINDOW_DAYS,
};
use ordertrail_storage::{OrderRepository, ReturnPolicyLookup, StorageError};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Line item recorded when a message names an order but none of its items.
pub const UNKNOWN_PRODUCT: &str = "Unknown Product";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstainReason {
    MissingMerchant,
    MissingOrderId,
    NoOrderDate,
}

impl AbstainReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingMerchant => "record has no merchant name",
            Self::MissingOrderId => "record has no order id",
            Self::NoOrderDate => "no order, shipping or delivery date to date a new order",
        }
    }
}

impl fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(CanonicalOrder),
    Updated(CanonicalOrder),
    /// The message had already been applied to the matched order. Scalar
    /// fields were re-merged; line items were left alone.
    Reapplied(CanonicalOrder),
    Abstained(AbstainReason),
}

impl ReconcileOutcome {
    pub fn order(&self) -> Option<&CanonicalOrder> {
        match self {
            Self::Created(order) | Self::Updated(order) | Self::Reapplied(order) => Some(order),
            Self::Abstained(_) => None,
        }
    }
}

pub struct OrderMerger {
    repository: Box<dyn OrderRepository>,
    policies: Box<dyn ReturnPolicyLookup>,
    default_window_days: u32,
}

impl OrderMerger {
    pub fn new(
        repository: Box<dyn OrderRepository>,
        policies: Box<dyn ReturnPolicyLookup>,
    ) -> Self {
        Self {
            repository,
            policies,
            default_window_days: DEFAULT_RETURN_WINDOW_DAYS,
        }
    }

    pub fn with_default_window_days(mut self, days: u32) -> Self {
        self.default_window_days = days.max(1);
        self
    }

    pub fn repository(&self) -> &dyn OrderRepository {
        self.repository.as_ref()
    }

    pub fn reconcile(
        &mut self,
        user_id: &str,
        record: &ParsedRecord,
        message: &RawMessage,
    ) -> Result<ReconcileOutcome, StorageError> {
        self.reconcile_at(user_id, record, message, Utc::now())
    }

    pub fn reconcile_at(
        &mut self,
        user_id: &str,
        record: &ParsedRecord,
        message: &RawMessage,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, StorageError> {
        let Some(merchant) = non_blank(record.merchant_name.as_deref()) else {
            return Ok(ReconcileOutcome::Abstained(AbstainReason::MissingMerchant));
        };
        let Some(order_ref) = non_blank(record.order_id.as_deref()) else {
            return Ok(ReconcileOutcome::Abstained(AbstainReason::MissingOrderId));
        };

        if let Some(mut order) = self.repository.find_match(user_id, merchant, order_ref) {
            let reapplied = order.provenance.has_applied(&message.id);
            self.apply(&mut order, record, reapplied);
            order.provenance.record_source(&record.provenance.source);
            order.provenance.mark_applied(&message.id);
            order.updated_at = now;
            let saved = self.repository.save(order)?;
            info!(
                message_id = %message.id,
                merchant,
                order_id = %saved.order_id,
                stage = %record.stage,
                reapplied,
                "updated order"
            );
            return Ok(if reapplied {
                ReconcileOutcome::Reapplied(saved)
            } else {
                ReconcileOutcome::Updated(saved)
            });
        }

        let Some(order_date) = record.effective_order_date() else {
            return Ok(ReconcileOutcome::Abstained(AbstainReason::NoOrderDate));
        };
        let window = self.window_for(merchant, record);
        let mut order = CanonicalOrder::new(user_id, merchant, order_ref, order_date, window, now);
        order.source_message_id = Some(message.id.clone());
        order.set_delivery_date(record.effective_delivery_date());
        order.total = record.total.clone();
        if record.products.is_empty() {
            let price = record.total.as_ref().map_or(Decimal::ZERO, |m| m.amount);
            order.upsert_product(&ParsedProduct::new(UNKNOWN_PRODUCT, price));
        } else {
            for product in &record.products {
                order.upsert_product(product);
            }
        }
        order.provenance.tracking.merge_from(&record.shipping);
        order.provenance.record_source(&record.provenance.source);
        order.provenance.mark_applied(&message.id);
        order.raise_confidence(record.confidence);
        order.propagate_return_deadline();

        let saved = self.repository.save(order)?;
        info!(
            message_id = %message.id,
            merchant,
            order_id = %saved.order_id,
            stage = %record.stage,
            window_days = saved.return_window_days(),
            "created order"
        );
        Ok(ReconcileOutcome::Created(saved))
    }

    fn apply(&self, order: &mut CanonicalOrder, record: &ParsedRecord, reapplied: bool) {
        let deadline_before = order.return_deadline();
        match record.stage {
            LifecycleStage::Confirmation => {
                if let Some(total) = &record.total {
                    order.total = Some(total.clone());
                }
                if let Some(order_date) = record.order_date {
                    order.order_date = order_date;
                }
                if !reapplied {
                    merge_products(order, &record.products);
                }
                order.provenance.tracking.merge_from(&record.shipping);
            }
            LifecycleStage::Delivery => {
                if let Some(delivered) = record.effective_delivery_date() {
                    order.set_delivery_date(Some(delivered));
                }
                if let Some(window) = stated_window(record, order.delivery_date()) {
                    order.set_return_window_days(window);
                }
                if order.total.is_none() {
                    order.total = record.total.clone();
                }
                order.provenance.tracking.merge_from(&record.shipping);
                order.propagate_return_deadline();
            }
            LifecycleStage::Shipping => {
                order.provenance.tracking.merge_from(&record.shipping);
                if order.delivery_date().is_none() {
                    order.set_delivery_date(record.effective_delivery_date());
                }
            }
            LifecycleStage::Unknown => backfill(order, record),
        }

        if order.return_deadline() != deadline_before {
            let moved = order.propagate_return_deadline();
            debug!(order_id = %order.order_id, moved, "propagated return deadline");
        }
        order.raise_confidence(record.confidence);
    }

    /// Window for a new order: stated by the message, then the merchant's
    /// policy, then the configured default.
    fn window_for(&self, merchant: &str, record: &ParsedRecord) -> u32 {
        stated_window(record, None)
            .or_else(|| self.policies.default_window_days(merchant))
            .unwrap_or(self.default_window_days)
    }
}

/// Window stated by the message itself: an explicit day count, or a stated
/// deadline measured from the delivery date.
fn stated_window(record: &ParsedRecord, known_delivery: Option<NaiveDate>) -> Option<u32> {
    if let Some(days) = record.return_window_days.filter(|d| *d > 0) {
        return Some(days);
    }
    let deadline = record.return_deadline?;
    let delivered = record.effective_delivery_date().or(known_delivery)?;
    u32::try_from((deadline - delivered).num_days()).ok().filter(|d| *d > 0)
}

fn merge_products(order: &mut CanonicalOrder, products: &[ParsedProduct]) {
    if products.is_empty() {
        return;
    }
    // real items replace the stand-in line created from a product-less message
    if order.products.len() == 1 && order.products[0].name == UNKNOWN_PRODUCT {
        order.products.clear();
    }
    let inserted = order.merge_product_prices(products);
    debug!(order_id = %order.order_id, inserted, "merged confirmed items");
}

/// Fill only what the order does not know yet.
fn backfill(order: &mut CanonicalOrder, record: &ParsedRecord) {
    if order.delivery_date().is_none() {
        order.set_delivery_date(record.effective_delivery_date());
    }
    if order.total.is_none() {
        order.total = record.total.clone();
    }
    let tracking = &mut order.provenance.tracking;
    let incoming = &record.shipping;
    fill(&mut tracking.tracking_number, &incoming.tracking_number);
    fill(&mut tracking.tracking_url, &incoming.tracking_url);
    fill(&mut tracking.logistics_partner, &incoming.logistics_partner);
    fill(&mut tracking.shipping_date, &incoming.shipping_date);
    fill(&mut tracking.estimated_delivery, &incoming.estimated_delivery);
}

fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
