//! Postgres-backed replica tables.
//!
//! Tables are created by external migrations. Every table has the layout
//!
//! ```text
//! id BIGINT PRIMARY KEY, <snapshot columns...>,
//! date_created TIMESTAMPTZ NOT NULL, last_updated TIMESTAMPTZ NOT NULL
//! ```
//!
//! Adapters are blocking: they `block_on` a Tokio handle captured at
//! construction, so they must be called from plain worker threads.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tokio::runtime::Handle;
use tracing::debug;

use storefront_core::{CustomerId, EntityId, ProductId};
use storefront_events::Address;
use storefront_orders::{CustomerReplica, ProductReplica, Replica, Replicated};

use super::{ReplicaChange, ReplicaStore, ReplicaWrite};
use crate::error::StoreError;

/// Mapping of a replica type onto its table.
pub trait PgReplicaTable: Replica {
    const TABLE: &'static str;

    /// Snapshot columns in bind order (the `id` column excluded).
    const COLUMNS: &'static [&'static str];

    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments>;

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

pub struct PostgresReplicaStore<R> {
    pool: PgPool,
    handle: Handle,
    _row: PhantomData<fn() -> R>,
}

impl<R> PostgresReplicaStore<R> {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self {
            pool,
            handle,
            _row: PhantomData,
        }
    }
}

fn select_sql(table: &str, columns: &[&str], suffix: &str) -> String {
    format!(
        "SELECT id, {}, date_created, last_updated FROM {table} {suffix}",
        columns.join(", ")
    )
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (2..=columns.len() + 1).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {table} (id, {}, date_created, last_updated) VALUES ($1, {}, now(), now())",
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn update_sql(table: &str, columns: &[&str]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ${}", i + 2))
        .collect();
    format!(
        "UPDATE {table} SET {}, last_updated = now() WHERE id = $1",
        assignments.join(", ")
    )
}

fn decode<R: PgReplicaTable>(row: &PgRow) -> Result<Replicated<R>, StoreError> {
    let replica = R::from_row(row).map_err(|e| StoreError::Decode(e.to_string()))?;
    let date_created: DateTime<Utc> = row.try_get("date_created")?;
    let last_updated: DateTime<Utc> = row.try_get("last_updated")?;
    Ok(Replicated {
        row: replica,
        date_created,
        last_updated,
    })
}

impl<R: PgReplicaTable> ReplicaStore<R> for PostgresReplicaStore<R> {
    fn find(&self, id: R::Id) -> Result<Option<Replicated<R>>, StoreError> {
        let sql = select_sql(R::TABLE, R::COLUMNS, "WHERE id = $1");
        self.handle.block_on(async {
            let row = sqlx::query(&sql)
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(decode::<R>).transpose()
        })
    }

    fn exists(&self, id: R::Id) -> Result<bool, StoreError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", R::TABLE);
        self.handle.block_on(async {
            let exists: bool = sqlx::query_scalar(&sql)
                .bind(id.as_i64())
                .fetch_one(&self.pool)
                .await?;
            Ok::<_, StoreError>(exists)
        })
    }

    fn list(&self) -> Result<Vec<Replicated<R>>, StoreError> {
        let sql = select_sql(R::TABLE, R::COLUMNS, "ORDER BY id");
        self.handle.block_on(async {
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            rows.iter().map(decode::<R>).collect::<Result<Vec<_>, _>>()
        })
    }

    fn apply(&self, change: ReplicaChange<R>) -> Result<ReplicaWrite, StoreError> {
        self.handle.block_on(async {
            let mut tx = self.pool.begin().await?;

            let outcome = match &change {
                ReplicaChange::Upsert(replica) => {
                    let id = replica.id().as_i64();
                    let lock = format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", R::TABLE);
                    let existing = sqlx::query(&lock)
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await?;

                    if existing.is_some() {
                        let sql = update_sql(R::TABLE, R::COLUMNS);
                        replica
                            .bind_columns(sqlx::query(&sql).bind(id))
                            .execute(&mut *tx)
                            .await?;
                        ReplicaWrite::Updated
                    } else {
                        let sql = insert_sql(R::TABLE, R::COLUMNS);
                        replica
                            .bind_columns(sqlx::query(&sql).bind(id))
                            .execute(&mut *tx)
                            .await?;
                        ReplicaWrite::Inserted
                    }
                }
                ReplicaChange::Delete(id) => {
                    let sql = format!("DELETE FROM {} WHERE id = $1", R::TABLE);
                    let result = sqlx::query(&sql)
                        .bind(id.as_i64())
                        .execute(&mut *tx)
                        .await?;
                    if result.rows_affected() > 0 {
                        ReplicaWrite::Deleted
                    } else {
                        ReplicaWrite::Absent
                    }
                }
            };

            tx.commit().await?;
            debug!(table = R::TABLE, outcome = outcome.as_str(), "replica change committed");
            Ok::<_, StoreError>(outcome)
        })
    }
}

const CUSTOMER_COLUMNS: &[&str] = &[
    "name",
    "email",
    "phone",
    "shipping_street",
    "shipping_city",
    "shipping_state",
    "shipping_postal_code",
    "shipping_country",
    "billing_street",
    "billing_city",
    "billing_state",
    "billing_postal_code",
    "billing_country",
];

fn bind_address<'q>(
    query: Query<'q, Postgres, PgArguments>,
    address: Option<&'q Address>,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(address.map(|a| a.street.as_str()))
        .bind(address.map(|a| a.city.as_str()))
        .bind(address.map(|a| a.state.as_str()))
        .bind(address.map(|a| a.postal_code.as_str()))
        .bind(address.map(|a| a.country.as_str()))
}

/// An embedded address is absent when every one of its columns is NULL.
fn read_address(row: &PgRow, prefix: &str) -> Result<Option<Address>, sqlx::Error> {
    let street: Option<String> = row.try_get(format!("{prefix}_street").as_str())?;
    let city: Option<String> = row.try_get(format!("{prefix}_city").as_str())?;
    let state: Option<String> = row.try_get(format!("{prefix}_state").as_str())?;
    let postal_code: Option<String> = row.try_get(format!("{prefix}_postal_code").as_str())?;
    let country: Option<String> = row.try_get(format!("{prefix}_country").as_str())?;

    if street.is_none() && city.is_none() && state.is_none() && postal_code.is_none() && country.is_none() {
        return Ok(None);
    }
    Ok(Some(Address {
        street: street.unwrap_or_default(),
        city: city.unwrap_or_default(),
        state: state.unwrap_or_default(),
        postal_code: postal_code.unwrap_or_default(),
        country: country.unwrap_or_default(),
    }))
}

impl PgReplicaTable for CustomerReplica {
    const TABLE: &'static str = "customers_replica";
    const COLUMNS: &'static [&'static str] = CUSTOMER_COLUMNS;

    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        let query = query
            .bind(self.name.as_str())
            .bind(self.email.as_str())
            .bind(self.phone.as_str());
        let query = bind_address(query, self.shipping_address.as_ref());
        bind_address(query, self.billing_address.as_ref())
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: CustomerId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            shipping_address: read_address(row, "shipping")?,
            billing_address: read_address(row, "billing")?,
        })
    }
}

impl PgReplicaTable for ProductReplica {
    const TABLE: &'static str = "products_replica";
    const COLUMNS: &'static [&'static str] = &["name", "quantity", "price"];

    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.name.as_str())
            .bind(self.quantity)
            .bind(self.price)
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_binds_id_first_then_columns() {
        assert_eq!(
            insert_sql("products_replica", ProductReplica::COLUMNS),
            "INSERT INTO products_replica (id, name, quantity, price, date_created, last_updated) \
             VALUES ($1, $2, $3, $4, now(), now())"
        );
    }

    #[test]
    fn update_only_touches_last_updated() {
        let sql = update_sql("products_replica", ProductReplica::COLUMNS);
        assert_eq!(
            sql,
            "UPDATE products_replica SET name = $2, quantity = $3, price = $4, last_updated = now() WHERE id = $1"
        );
        assert!(!sql.contains("date_created"));
    }

    #[test]
    fn customer_placeholders_cover_every_column() {
        let sql = insert_sql(CustomerReplica::TABLE, CustomerReplica::COLUMNS);
        assert!(sql.contains(&format!("${}", CUSTOMER_COLUMNS.len() + 1)));
        assert!(!sql.contains(&format!("${}", CUSTOMER_COLUMNS.len() + 2)));
    }

    #[test]
    fn select_lists_bookkeeping_columns() {
        assert_eq!(
            select_sql("products_replica", ProductReplica::COLUMNS, "ORDER BY id"),
            "SELECT id, name, quantity, price, date_created, last_updated FROM products_replica ORDER BY id"
        );
    }
}
