use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, OrderId, ReservationId, UserId};
use domain::{Address, Money, Order, OrderItem, OrderStatus, Product, ProductId};
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Row};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::store::{CommerceStore, NewOrder, NewOrderItem, StatusChange, StockReservation};
use crate::subscription::StatusSubscription;
use crate::{Result, StoreError};

/// NOTIFY channel carrying row-level order status changes.
const ORDER_STATUS_CHANNEL: &str = "order_status";

const FEED_CAPACITY: usize = 16;

/// PostgreSQL-backed commerce store.
#[derive(Clone)]
pub struct PostgresCommerceStore {
    pool: PgPool,
}

impl PostgresCommerceStore {
    /// Creates a new PostgreSQL commerce store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            on_hand: to_u32(row.try_get::<i64, _>("on_hand")?, "on_hand")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status_text: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_text)
            .ok_or_else(|| StoreError::InvalidRow(format!("unknown order status {status_text}")))?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            shipping_address: parse_address(row.try_get::<String, _>("shipping_address")?)?,
            billing_address: parse_address(row.try_get::<String, _>("billing_address")?)?,
            authorization_id: row.try_get("authorization_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: to_u32(row.try_get::<i64, _>("quantity")?, "quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRow(format!("{column} out of range: {value}")))
}

fn parse_address(raw: String) -> Result<Address> {
    Address::parse(raw).map_err(|e| StoreError::InvalidRow(e.to_string()))
}

#[async_trait]
impl CommerceStore for PostgresCommerceStore {
    async fn upsert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents, on_hand, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                unit_price_cents = EXCLUDED.unit_price_cents,
                on_hand = EXCLUDED.on_hand,
                is_active = EXCLUDED.is_active,
                updated_at = now()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.unit_price.cents())
        .bind(i64::from(product.on_hand))
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, unit_price_cents, on_hand, is_active FROM products WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name, unit_price_cents, on_hand, is_active
             FROM products WHERE is_active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn reserve_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<StockReservation> {
        let mut tx = self.pool.begin().await?;

        // The product row lock linearizes concurrent reservations for the
        // same product; without it the availability read and the insert
        // below would form a check-then-act race.
        let row = sqlx::query("SELECT on_hand, is_active FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::ProductNotFound(product_id.clone()));
        };

        let on_hand: i64 = row.try_get("on_hand")?;
        let is_active: bool = row.try_get("is_active")?;
        if !is_active {
            return Err(StoreError::PredicateFailed(format!(
                "product {product_id} is inactive"
            )));
        }

        let reserved: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT
             FROM stock_reservations
             WHERE product_id = $1 AND expires_at > $2",
        )
        .bind(product_id.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if on_hand - reserved < i64::from(quantity) {
            return Err(StoreError::PredicateFailed(format!(
                "insufficient available stock for {product_id}"
            )));
        }

        let reservation = StockReservation {
            id: ReservationId::new(),
            product_id: product_id.clone(),
            quantity,
            attempt_id,
            expires_at,
        };
        sqlx::query(
            "INSERT INTO stock_reservations (id, product_id, quantity, attempt_id, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(reservation.id.as_uuid())
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .bind(attempt_id.as_uuid())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(reservation)
    }

    async fn reserved_quantity(&self, product_id: &ProductId, now: DateTime<Utc>) -> Result<u32> {
        let reserved: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT
             FROM stock_reservations
             WHERE product_id = $1 AND expires_at > $2",
        )
        .bind(product_id.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        to_u32(reserved, "reserved quantity")
    }

    async fn release_attempt(&self, attempt_id: AttemptId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE attempt_id = $1")
            .bind(attempt_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn reduce_on_hand(
        &self,
        product_id: &ProductId,
        quantity: u32,
        attempt_id: AttemptId,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE products SET on_hand = on_hand - $2, updated_at = now()
             WHERE id = $1 AND on_hand >= $2",
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
                    .bind(product_id.as_str())
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                StoreError::PredicateFailed(format!(
                    "decrement of {quantity} would take {product_id} below zero"
                ))
            } else {
                StoreError::ProductNotFound(product_id.clone())
            });
        }

        sqlx::query("DELETE FROM stock_reservations WHERE product_id = $1 AND attempt_id = $2")
            .bind(product_id.as_str())
            .bind(attempt_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount_cents,
                                shipping_address, billing_address, authorization_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING created_at, updated_at
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(order.shipping_address.as_str())
        .bind(order.billing_address.as_str())
        .bind(&order.authorization_id)
        .fetch_one(&mut *tx)
        .await?;

        for item in &items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            authorization_id: order.authorization_id,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id, quantity, unit_price_cents
             FROM order_items WHERE order_id = $1 ORDER BY product_id",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::OrderNotFound(id));
        };
        let order = Self::row_to_order(&row)?;

        let payload = serde_json::to_string(&StatusChange {
            order_id: id,
            status,
        })?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(ORDER_STATUS_CHANNEL)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn subscribe_order_status(&self, id: OrderId) -> Result<StatusSubscription> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(ORDER_STATUS_CHANNEL).await?;

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let forwarder = tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!(error = %e, "order status listener closed");
                        break;
                    }
                };
                let change: StatusChange = match serde_json::from_str(notification.payload()) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed status change payload");
                        continue;
                    }
                };
                if change.order_id == id && tx.send(change.status).await.is_err() {
                    break;
                }
            }
        });
        Ok(StatusSubscription::with_forwarder(rx, forwarder))
    }
}
