//! Credit card expiry sweep.

use std::sync::Arc;

use chrono::NaiveDate;

use catwatch_core::credit_card::expiring_threshold;
use catwatch_store::Store;

use super::Result;

/// Keeps `is_expiring` flags current.
#[derive(Clone)]
pub struct CreditCardService {
    store: Arc<dyn Store>,
}

impl CreditCardService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Flag every card expiring within the threshold as seen from `compare_date`.
    pub async fn mark_old_cards(&self, compare_date: NaiveDate) -> Result<u64> {
        let threshold = expiring_threshold(compare_date);
        let marked = self.store.mark_expiring_cards(threshold).await?;
        tracing::info!(marked, threshold = %threshold, "Marked expiring credit cards");
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catwatch_core::{CreditCard, CreditCardId, User, UserId};
    use catwatch_store::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_mark_old_cards() {
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::new();
        for (i, exp) in [date(2015, 7, 1), date(2016, 5, 1)].into_iter().enumerate() {
            let user = User::new(UserId::generate(), format!("user{i}@example.com"));
            let card = CreditCard {
                id: CreditCardId::generate(),
                user_id: user.id,
                brand: "Visa".into(),
                last4: "4242".into(),
                exp_date: exp,
                is_expiring: false,
            };
            store.replace_credit_card(&user, &card).await.unwrap();
            ids.push(user.id);
        }

        let service = CreditCardService::new(store.clone());
        let marked = service.mark_old_cards(date(2015, 5, 29)).await.unwrap();

        assert_eq!(marked, 1);
        assert!(store.get_credit_card(&ids[0]).await.unwrap().unwrap().is_expiring);
        assert!(!store.get_credit_card(&ids[1]).await.unwrap().unwrap().is_expiring);
    }
}
