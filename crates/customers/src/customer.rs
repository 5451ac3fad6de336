use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{CustomerId, DomainError, DomainResult, Entity};
use storefront_events::{Address, CustomerSnapshot};

/// Input for creating or replacing a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDraft {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
}

impl CustomerDraft {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(DomainError::validation("email cannot be empty"));
        }
        if !email.contains('@') {
            return Err(DomainError::validation("email must contain '@'"));
        }
        if self.phone.trim().is_empty() {
            return Err(DomainError::validation("phone cannot be empty"));
        }
        Ok(())
    }
}

/// A customer as persisted by the customer service.
///
/// `date_created`/`last_updated` are owned by the service's store and are not
/// part of the published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    email: String,
    phone: String,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    date_created: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Customer {
    /// Build a new customer from a validated draft and a store-assigned id.
    pub fn create(id: CustomerId, draft: CustomerDraft, now: DateTime<Utc>) -> DomainResult<Self> {
        draft.validate()?;
        Ok(Self {
            id,
            name: draft.name,
            email: draft.email,
            phone: draft.phone,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            date_created: now,
            last_updated: now,
        })
    }

    /// Replace every mutable field. Identity and `date_created` are kept.
    pub fn apply_draft(&mut self, draft: CustomerDraft, now: DateTime<Utc>) -> DomainResult<()> {
        draft.validate()?;
        self.name = draft.name;
        self.email = draft.email;
        self.phone = draft.phone;
        self.shipping_address = draft.shipping_address;
        self.billing_address = draft.billing_address;
        self.last_updated = now;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// State carried by change events.
    pub fn to_snapshot(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            customer_id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            shipping_address: self.shipping_address.clone(),
            billing_address: self.billing_address.clone(),
        }
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn draft() -> CustomerDraft {
        CustomerDraft {
            name: "Acme".to_string(),
            email: "a@x.com".to_string(),
            phone: "555".to_string(),
            shipping_address: Some(Address {
                street: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                ..Address::default()
            }),
            billing_address: None,
        }
    }

    #[test]
    fn create_sets_both_timestamps() {
        let customer = Customer::create(CustomerId::new(42), draft(), t(0)).unwrap();
        assert_eq!(customer.id(), CustomerId::new(42));
        assert_eq!(customer.date_created(), t(0));
        assert_eq!(customer.last_updated(), t(0));
    }

    #[test]
    fn create_rejects_blank_name() {
        let err = Customer::create(
            CustomerId::new(1),
            CustomerDraft {
                name: "  ".to_string(),
                ..draft()
            },
            t(0),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_email_without_at() {
        let err = Customer::create(
            CustomerId::new(1),
            CustomerDraft {
                email: "nobody".to_string(),
                ..draft()
            },
            t(0),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::validation("email must contain '@'"));
    }

    #[test]
    fn apply_draft_keeps_identity_and_creation_time() {
        let mut customer = Customer::create(CustomerId::new(42), draft(), t(0)).unwrap();
        customer
            .apply_draft(
                CustomerDraft {
                    name: "Acme Corp".to_string(),
                    ..draft()
                },
                t(60),
            )
            .unwrap();

        assert_eq!(customer.id(), CustomerId::new(42));
        assert_eq!(customer.name(), "Acme Corp");
        assert_eq!(customer.date_created(), t(0));
        assert_eq!(customer.last_updated(), t(60));
    }

    #[test]
    fn invalid_update_leaves_customer_untouched() {
        let mut customer = Customer::create(CustomerId::new(42), draft(), t(0)).unwrap();
        let before = customer.clone();
        let result = customer.apply_draft(
            CustomerDraft {
                phone: String::new(),
                ..draft()
            },
            t(60),
        );
        assert!(result.is_err());
        assert_eq!(customer, before);
    }

    #[test]
    fn snapshot_carries_every_mutable_field() {
        let customer = Customer::create(CustomerId::new(42), draft(), t(0)).unwrap();
        let snapshot = customer.to_snapshot();
        assert_eq!(snapshot.customer_id, CustomerId::new(42));
        assert_eq!(snapshot.name, "Acme");
        assert_eq!(snapshot.email, "a@x.com");
        assert_eq!(snapshot.phone, "555");
        assert_eq!(snapshot.shipping_address, draft().shipping_address);
        assert_eq!(snapshot.billing_address, None);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: the snapshot always reflects the last applied draft.
            #[test]
            fn snapshot_follows_last_draft(
                names in proptest::collection::vec("[A-Za-z][A-Za-z0-9 ]{0,30}", 1..8)
            ) {
                let mut customer = Customer::create(CustomerId::new(7), draft(), t(0)).unwrap();
                for (i, name) in names.iter().enumerate() {
                    customer
                        .apply_draft(CustomerDraft { name: name.clone(), ..draft() }, t(i as i64 + 1))
                        .unwrap();
                }
                let last = names.last().unwrap();
                prop_assert_eq!(&customer.to_snapshot().name, last);
                prop_assert_eq!(customer.date_created(), t(0));
            }
        }
    }
}
