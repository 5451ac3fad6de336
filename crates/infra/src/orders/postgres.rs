//! Postgres order store.
//!
//! ```text
//! orders      (id BIGSERIAL PRIMARY KEY, status TEXT, customer_id BIGINT,
//!              date_created TIMESTAMPTZ, last_updated TIMESTAMPTZ)
//! order_items (id BIGSERIAL PRIMARY KEY, order_id BIGINT REFERENCES orders(id),
//!              product_id BIGINT, quantity INT CHECK (quantity >= 1),
//!              date_created TIMESTAMPTZ, last_updated TIMESTAMPTZ)
//! ```
//!
//! `customer_id`/`product_id` carry no foreign key: they point at replica
//! rows that the consumer may delete at any time.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;

use storefront_core::{CustomerId, OrderId, OrderItemId, ProductId};
use storefront_orders::{Order, OrderDraft, OrderItem, OrderLine, OrderStatus};

use super::OrderStore;
use crate::error::StoreError;

const ORDER_COLUMNS: &str = "id, status, customer_id, date_created, last_updated";
const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, date_created, last_updated";

pub struct PostgresOrderStore {
    pool: PgPool,
    handle: Handle,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        status: OrderStatus::parse(&status).map_err(|e| StoreError::Decode(e.to_string()))?,
        customer_id: CustomerId::new(row.try_get("customer_id")?),
        item_ids: Vec::new(),
        date_created: row.try_get("date_created")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: row.try_get("quantity")?,
        date_created: row.try_get("date_created")?,
        last_updated: row.try_get("last_updated")?,
    })
}

async fn load_item_ids<'e, E>(executor: E, order: OrderId) -> Result<Vec<OrderItemId>, StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order.get())
        .fetch_all(executor)
        .await?;
    Ok(ids.into_iter().map(OrderItemId::new).collect())
}

/// Insert one item row per draft line and attach the ids to `order`.
async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    order: &mut Order,
    draft: &OrderDraft,
) -> Result<(), StoreError> {
    for line in &draft.items {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO order_items (order_id, product_id, quantity, date_created, last_updated) \
             VALUES ($1, $2, $3, now(), now()) RETURNING id",
        )
        .bind(order.id.get())
        .bind(line.product_id.get())
        .bind(line.quantity)
        .fetch_one(&mut **tx)
        .await?;
        order.add_item(OrderItemId::new(id));
    }
    Ok(())
}

impl OrderStore for PostgresOrderStore {
    fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.handle.block_on(async {
            let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
            let Some(row) = sqlx::query(&sql).bind(id.get()).fetch_optional(&self.pool).await? else {
                return Ok(None);
            };
            let mut order = order_from_row(&row)?;
            order.item_ids = load_item_ids(&self.pool, id).await?;
            Ok::<_, StoreError>(Some(order))
        })
    }

    fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        self.handle.block_on(async {
            let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id");
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            let mut orders = rows.iter().map(order_from_row).collect::<Result<Vec<_>, _>>()?;

            let pairs: Vec<(i64, i64)> = sqlx::query_as("SELECT order_id, id FROM order_items ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            for order in &mut orders {
                order.item_ids = pairs
                    .iter()
                    .filter(|(order_id, _)| *order_id == order.id.get())
                    .map(|(_, id)| OrderItemId::new(*id))
                    .collect();
            }
            Ok::<_, StoreError>(orders)
        })
    }

    fn find_item(&self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError> {
        self.handle.block_on(async {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1");
            let row = sqlx::query(&sql).bind(id.get()).fetch_optional(&self.pool).await?;
            row.as_ref().map(item_from_row).transpose()
        })
    }

    fn list_items(&self) -> Result<Vec<OrderItem>, StoreError> {
        self.handle.block_on(async {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items ORDER BY id");
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()
        })
    }

    fn items_of(&self, order: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.handle.block_on(async {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id");
            let rows = sqlx::query(&sql).bind(order.get()).fetch_all(&self.pool).await?;
            rows.iter().map(item_from_row).collect::<Result<Vec<_>, _>>()
        })
    }

    fn exists_by_order_id(&self, order: OrderId) -> Result<bool, StoreError> {
        self.handle.block_on(async {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE order_id = $1)")
                    .bind(order.get())
                    .fetch_one(&self.pool)
                    .await?;
            Ok::<_, StoreError>(exists)
        })
    }

    fn exists_by_product_id(&self, product: ProductId) -> Result<bool, StoreError> {
        self.handle.block_on(async {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
                    .bind(product.get())
                    .fetch_one(&self.pool)
                    .await?;
            Ok::<_, StoreError>(exists)
        })
    }

    fn first_item_of(&self, order: OrderId) -> Result<Option<OrderItemId>, StoreError> {
        self.handle.block_on(async {
            let id: Option<i64> =
                sqlx::query_scalar("SELECT id FROM order_items WHERE order_id = $1 ORDER BY id LIMIT 1")
                    .bind(order.get())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok::<_, StoreError>(id.map(OrderItemId::new))
        })
    }

    fn exists_by_status(&self, status: OrderStatus) -> Result<bool, StoreError> {
        self.handle.block_on(async {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE status = $1)")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
            Ok::<_, StoreError>(exists)
        })
    }

    fn insert(&self, draft: &OrderDraft) -> Result<Order, StoreError> {
        self.handle.block_on(async {
            let mut tx = self.pool.begin().await?;

            let sql = format!(
                "INSERT INTO orders (status, customer_id, date_created, last_updated) \
                 VALUES ($1, $2, now(), now()) RETURNING {ORDER_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(draft.status.as_str())
                .bind(draft.customer_id.get())
                .fetch_one(&mut *tx)
                .await?;
            let mut order = order_from_row(&row)?;
            insert_items(&mut tx, &mut order, draft).await?;

            tx.commit().await?;
            Ok::<_, StoreError>(order)
        })
    }

    fn replace(&self, id: OrderId, draft: &OrderDraft) -> Result<Option<Order>, StoreError> {
        self.handle.block_on(async {
            let mut tx = self.pool.begin().await?;

            let sql = format!(
                "UPDATE orders SET status = $2, customer_id = $3, last_updated = now() \
                 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
            );
            let Some(row) = sqlx::query(&sql)
                .bind(id.get())
                .bind(draft.status.as_str())
                .bind(draft.customer_id.get())
                .fetch_optional(&mut *tx)
                .await?
            else {
                return Ok(None);
            };
            let mut order = order_from_row(&row)?;

            sqlx::query("DELETE FROM order_items WHERE order_id = $1")
                .bind(id.get())
                .execute(&mut *tx)
                .await?;
            insert_items(&mut tx, &mut order, draft).await?;

            tx.commit().await?;
            Ok::<_, StoreError>(Some(order))
        })
    }

    fn delete(&self, id: OrderId) -> Result<bool, StoreError> {
        self.handle.block_on(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM order_items WHERE order_id = $1")
                .bind(id.get())
                .execute(&mut *tx)
                .await?;
            let deleted = sqlx::query("DELETE FROM orders WHERE id = $1")
                .bind(id.get())
                .execute(&mut *tx)
                .await?
                .rows_affected()
                > 0;
            tx.commit().await?;
            Ok::<_, StoreError>(deleted)
        })
    }

    fn insert_item(&self, order: OrderId, line: OrderLine) -> Result<Option<OrderItem>, StoreError> {
        self.handle.block_on(async {
            let mut tx = self.pool.begin().await?;

            let owner: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order.get())
                .fetch_optional(&mut *tx)
                .await?;
            if owner.is_none() {
                return Ok(None);
            }
            let sql = format!(
                "INSERT INTO order_items (order_id, product_id, quantity, date_created, last_updated) \
                 VALUES ($1, $2, $3, now(), now()) RETURNING {ITEM_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(order.get())
                .bind(line.product_id.get())
                .bind(line.quantity)
                .fetch_one(&mut *tx)
                .await?;
            let item = item_from_row(&row)?;

            tx.commit().await?;
            Ok::<_, StoreError>(Some(item))
        })
    }

    fn update_item(
        &self,
        id: OrderItemId,
        order: OrderId,
        line: OrderLine,
    ) -> Result<Option<OrderItem>, StoreError> {
        self.handle.block_on(async {
            let mut tx = self.pool.begin().await?;

            let owner: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order.get())
                .fetch_optional(&mut *tx)
                .await?;
            if owner.is_none() {
                return Ok(None);
            }
            let sql = format!(
                "UPDATE order_items SET order_id = $2, product_id = $3, quantity = $4, last_updated = now() \
                 WHERE id = $1 RETURNING {ITEM_COLUMNS}"
            );
            let row = sqlx::query(&sql)
                .bind(id.get())
                .bind(order.get())
                .bind(line.product_id.get())
                .bind(line.quantity)
                .fetch_optional(&mut *tx)
                .await?;
            let item = row.as_ref().map(item_from_row).transpose()?;

            tx.commit().await?;
            Ok::<_, StoreError>(item)
        })
    }

    fn delete_item(&self, id: OrderItemId) -> Result<bool, StoreError> {
        self.handle.block_on(async {
            let deleted = sqlx::query("DELETE FROM order_items WHERE id = $1")
                .bind(id.get())
                .execute(&self.pool)
                .await?
                .rows_affected()
                > 0;
            Ok::<_, StoreError>(deleted)
        })
    }
}
