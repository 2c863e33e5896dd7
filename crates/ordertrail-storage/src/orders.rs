use std::collections::BTreeMap;

use ordertrail_core::CanonicalOrder;
use tracing::debug;
use uuid::Uuid;

use crate::StorageError;

/// Persistence seam for canonical orders. Orders are handed out by value;
/// changes take effect on `save`.
pub trait OrderRepository: Send + Sync {
    /// Order of `user_id` at `merchant` (case-insensitive) whose order id is
    /// `order_ref`, or whose recorded tracking number is `order_ref`.
    fn find_match(&self, user_id: &str, merchant: &str, order_ref: &str) -> Option<CanonicalOrder>;

    fn get(&self, id: Uuid) -> Option<CanonicalOrder>;

    /// Store `order`, recomputing its return deadline first. Returns the
    /// stored copy.
    fn save(&mut self, order: CanonicalOrder) -> Result<CanonicalOrder, StorageError>;

    fn list(&self, user_id: &str) -> Vec<CanonicalOrder>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: BTreeMap<Uuid, CanonicalOrder>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn same_owner<'a>(
        &'a self,
        user_id: &'a str,
        merchant: &'a str,
    ) -> impl Iterator<Item = &'a CanonicalOrder> + 'a {
        self.orders
            .values()
            .filter(move |o| o.user_id == user_id && o.merchant_name.eq_ignore_ascii_case(merchant))
    }
}

impl OrderRepository for InMemoryOrderStore {
    fn find_match(&self, user_id: &str, merchant: &str, order_ref: &str) -> Option<CanonicalOrder> {
        let order_ref = order_ref.trim();
        if order_ref.is_empty() {
            return None;
        }
        if let Some(order) = self.same_owner(user_id, merchant).find(|o| o.order_id == order_ref) {
            return Some(order.clone());
        }
        let by_tracking = self
            .same_owner(user_id, merchant)
            .find(|o| o.provenance.tracking.tracking_number.as_deref() == Some(order_ref));
        if let Some(order) = by_tracking {
            debug!(order_ref, order_id = %order.order_id, "matched by tracking number");
        }
        by_tracking.cloned()
    }

    fn get(&self, id: Uuid) -> Option<CanonicalOrder> {
        self.orders.get(&id).cloned()
    }

    fn save(&mut self, mut order: CanonicalOrder) -> Result<CanonicalOrder, StorageError> {
        if let Some(existing) = self
            .same_owner(&order.user_id, &order.merchant_name)
            .find(|o| o.id != order.id && o.order_id == order.order_id)
        {
            return Err(StorageError::DuplicateIdentity {
                user_id: order.user_id.clone(),
                merchant: order.merchant_name.clone(),
                order_id: order.order_id.clone(),
                existing: existing.id,
            });
        }
        order.recompute_return_deadline();
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    fn list(&self, user_id: &str) -> Vec<CanonicalOrder> {
        let mut orders: Vec<_> = self
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_id.cmp(&b.order_id))
        });
        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn order(user: &str, merchant: &str, order_id: &str) -> CanonicalOrder {
        CanonicalOrder::new(
            user,
            merchant,
            order_id,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            30,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn matches_by_order_id_case_insensitive_merchant() {
        let mut store = InMemoryOrderStore::new();
        let saved = store.save(order("u1", "Myntra", "1234567890123")).unwrap();

        assert_eq!(store.find_match("u1", "MYNTRA", "1234567890123").map(|o| o.id), Some(saved.id));
        assert!(store.find_match("u2", "Myntra", "1234567890123").is_none());
        assert!(store.find_match("u1", "H&M", "1234567890123").is_none());
    }

    #[test]
    fn matches_by_recorded_tracking_number_but_not_prefix() {
        let mut store = InMemoryOrderStore::new();
        let mut tracked = order("u1", "Myntra", "1234567890123");
        tracked.provenance.tracking.tracking_number = Some("TRK999".to_string());
        let saved = store.save(tracked).unwrap();

        assert_eq!(store.find_match("u1", "Myntra", "TRK999").map(|o| o.id), Some(saved.id));
        assert!(store.find_match("u1", "Myntra", "1234567890").is_none());
        assert!(store.find_match("u1", "Myntra", "").is_none());
    }

    #[test]
    fn save_recomputes_the_deadline() {
        let mut store = InMemoryOrderStore::new();
        let mut o = order("u1", "H&M", "60412345");
        o.set_delivery_date(NaiveDate::from_ymd_opt(2025, 1, 9));
        o.set_return_window_days(15);
        let saved = store.save(o).unwrap();
        assert_eq!(saved.return_deadline(), NaiveDate::from_ymd_opt(2025, 1, 24));
        assert_eq!(store.get(saved.id).unwrap().return_deadline(), saved.return_deadline());
    }

    #[test]
    fn second_order_with_same_identity_is_rejected() {
        let mut store = InMemoryOrderStore::new();
        let first = store.save(order("u1", "Myntra", "42")).unwrap();
        let err = store.save(order("u1", "myntra", "42")).unwrap_err();
        assert_eq!(
            err,
            StorageError::DuplicateIdentity {
                user_id: "u1".to_string(),
                merchant: "myntra".to_string(),
                order_id: "42".to_string(),
                existing: first.id,
            }
        );
        // re-saving the same order is an update
        assert!(store.save(first).is_ok());
        assert_eq!(store.len(), 1);
    }
}
