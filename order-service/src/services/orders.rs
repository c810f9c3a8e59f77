use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::notifier::{notify_order, Notifier, NEW_ORDER_EVENT, ORDER_STATUS_CHANGE_EVENT};
use super::repository::{OrderStore, StoreError, MAX_WRITE_ATTEMPTS};
use super::{authorize, ensure_owner, Saved};
use crate::models::order::{generate_order_id, is_order_id, ORDER_ID_PREFIX};
use crate::models::{
    Action, Caller, CapabilityTable, CookingStatus, Order, OrderField, OrderItem,
    OrderPaymentDetails, OrderStatus, OrderType, OrderUser, PaymentMethod, PaymentStatus,
};

/// Generated ids that collide are regenerated this many times.
const ORDER_ID_ATTEMPTS: usize = 3;

/// Line totals may differ from `quantity * foodPrice` by this much.
fn line_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Set when the client resubmits an order it already created.
    pub order_id: Option<String>,
    pub order_type: OrderType,
    pub table_number: Option<String>,
    pub delivery_address: Option<String>,
    pub items: Vec<OrderItem>,
    pub order_total: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
}

impl NewOrder {
    fn validate(&self) -> Result<(), ServiceError> {
        if let Some(order_id) = self.order_id.as_deref().map(str::trim) {
            if !order_id.is_empty() && !is_order_id(order_id) {
                return Err(ServiceError::Validation(format!(
                    "Order id must start with {}",
                    ORDER_ID_PREFIX
                )));
            }
        }
        if self.items.is_empty() {
            return Err(ServiceError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }
        for item in &self.items {
            if item.quantity < 1 {
                return Err(ServiceError::Validation(format!(
                    "Quantity for '{}' must be at least 1",
                    item.food_name
                )));
            }
            if item.food_price < Decimal::ZERO || item.total_price < Decimal::ZERO {
                return Err(ServiceError::Validation(format!(
                    "Prices for '{}' cannot be negative",
                    item.food_name
                )));
            }
            let expected = item.food_price * Decimal::from(item.quantity);
            if (expected - item.total_price).abs() > line_tolerance() {
                return Err(ServiceError::Validation(format!(
                    "Total price for '{}' does not match quantity and unit price",
                    item.food_name
                )));
            }
        }
        if self.order_total < Decimal::ZERO {
            return Err(ServiceError::Validation(
                "Order total cannot be negative".to_string(),
            ));
        }

        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.order_type {
            OrderType::DineIn if !present(&self.table_number) => Err(ServiceError::Validation(
                "Table number is required for dine-in orders".to_string(),
            )),
            OrderType::Delivery if !present(&self.delivery_address) => {
                Err(ServiceError::Validation(
                    "Delivery address is required for delivery orders".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentDetailsPatch {
    pub payment_method: Option<PaymentMethod>,
    pub amount_paid: Option<Decimal>,
    pub transaction_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub status: Option<PaymentStatus>,
    pub pay_url: Option<String>,
}

/// Field-level patch; absent fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct OrderStatusPatch {
    pub order_status: Option<OrderStatus>,
    pub cooking_status: Option<CookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_details: Option<PaymentDetailsPatch>,
}

impl OrderStatusPatch {
    pub fn fields(&self) -> Vec<OrderField> {
        let mut fields = Vec::new();
        if self.order_status.is_some() {
            fields.push(OrderField::OrderStatus);
        }
        if self.cooking_status.is_some() {
            fields.push(OrderField::CookingStatus);
        }
        if self.payment_status.is_some() {
            fields.push(OrderField::PaymentStatus);
        }
        if self.payment_details.is_some() {
            fields.push(OrderField::PaymentDetails);
        }
        fields
    }

    fn apply(&self, order: &mut Order) {
        if let Some(status) = self.order_status {
            order.order_status = status;
        }
        if let Some(status) = self.cooking_status {
            order.cooking_status = status;
        }
        if let Some(details) = &self.payment_details {
            let target = &mut order.payment_details;
            if let Some(method) = details.payment_method {
                target.payment_method = method;
            }
            if let Some(amount) = details.amount_paid {
                target.amount_paid = amount;
            }
            if let Some(id) = &details.transaction_id {
                target.transaction_id = Some(id.clone());
            }
            if let Some(id) = &details.external_payment_id {
                target.external_payment_id = Some(id.clone());
            }
            if let Some(url) = &details.pay_url {
                target.pay_url = Some(url.clone());
            }
            if let Some(status) = details.status {
                target.status = status;
                order.payment_status = status;
            }
        }
        // Top-level status wins and keeps the nested copy in sync.
        if let Some(status) = self.payment_status {
            order.payment_status = status;
            order.payment_details.status = status;
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    capabilities: Arc<CapabilityTable>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        notifier: Arc<dyn Notifier>,
        capabilities: Arc<CapabilityTable>,
    ) -> Self {
        Self {
            orders,
            notifier,
            capabilities,
        }
    }

    /// Create an order, or merge a resubmission of a still-pending one.
    pub async fn create_order(
        &self,
        caller: &Caller,
        data: NewOrder,
    ) -> Result<Saved<Order>, ServiceError> {
        authorize(&self.capabilities, caller, Action::CreateOrder)?;
        data.validate()?;

        if let Some(order_id) = data.order_id.clone().filter(|id| !id.trim().is_empty()) {
            if let Some(existing) = self.orders.find_by_order_id(&order_id).await? {
                let access = self.capabilities.access(caller.role, Action::GetOrder);
                ensure_owner(access, caller, &existing.user.user_id)?;
                return self.resubmit(&order_id, data).await.map(Saved::Updated);
            }
        }

        let order = self.insert_new(caller, data).await?;
        tracing::info!(order_id = %order.order_id, user_id = %caller.user_id, "Order created");
        notify_order(self.notifier.as_ref(), NEW_ORDER_EVENT, &order);
        Ok(Saved::Created(order))
    }

    async fn insert_new(&self, caller: &Caller, data: NewOrder) -> Result<Order, ServiceError> {
        let supplied = data
            .order_id
            .clone()
            .filter(|id| !id.trim().is_empty());
        let now = Utc::now();

        for _ in 0..ORDER_ID_ATTEMPTS {
            let order_id = supplied.clone().unwrap_or_else(generate_order_id);
            let order = Order {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.clone(),
                order_type: data.order_type,
                table_number: data.table_number.clone(),
                delivery_address: data.delivery_address.clone(),
                user: OrderUser {
                    user_id: caller.user_id.clone(),
                    name: caller.name.clone().unwrap_or_default(),
                    email: caller.email.clone().unwrap_or_default(),
                    phone: caller.phone.clone().unwrap_or_default(),
                },
                items: data.items.clone(),
                order_total: data.order_total,
                tax: data.tax,
                shipping: data.shipping,
                discount: data.discount,
                notes: data.notes.clone(),
                order_status: OrderStatus::Pending,
                cooking_status: CookingStatus::NotStarted,
                payment_status: PaymentStatus::Pending,
                payment_details: OrderPaymentDetails {
                    payment_method: data.payment_method,
                    ..Default::default()
                },
                version: 0,
                created_at: now,
                updated_at: now,
            };

            match self.orders.insert(&order).await {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateKey(_)) if supplied.is_none() => {
                    tracing::warn!(order_id = %order_id, "Generated order id collided, retrying");
                }
                Err(StoreError::DuplicateKey(_)) => {
                    // Lost a race with a concurrent create of the same id.
                    return self.resubmit(&order_id, data).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Store(StoreError::DuplicateKey(
            "could not allocate a unique order id".to_string(),
        )))
    }

    async fn resubmit(&self, order_id: &str, data: NewOrder) -> Result<Order, ServiceError> {
        let order = self
            .update_with(order_id, |order| {
                if order.payment_status != PaymentStatus::Pending {
                    return Err(ServiceError::Validation(format!(
                        "Order {} can no longer be modified, payment is {}",
                        order.order_id, order.payment_status
                    )));
                }
                order.order_type = data.order_type;
                order.table_number = data.table_number.clone();
                order.delivery_address = data.delivery_address.clone();
                order.items = data.items.clone();
                order.order_total = data.order_total;
                order.tax = data.tax;
                order.shipping = data.shipping;
                order.discount = data.discount;
                order.notes = data.notes.clone();
                order.payment_details.payment_method = data.payment_method;
                order.payment_details.status = PaymentStatus::Pending;
                order.payment_status = PaymentStatus::Pending;
                Ok(())
            })
            .await?;

        tracing::info!(order_id = %order.order_id, "Order resubmitted");
        Ok(order)
    }

    pub async fn update_order_status(
        &self,
        caller: &Caller,
        order_id: &str,
        patch: OrderStatusPatch,
    ) -> Result<Order, ServiceError> {
        let access = authorize(&self.capabilities, caller, Action::UpdateOrderStatus)?;
        let fields = patch.fields();
        if fields.is_empty() {
            return Err(ServiceError::Validation("No status fields to update".to_string()));
        }
        if !access.allows_fields(&fields) {
            return Err(ServiceError::Forbidden(
                "Not allowed to update these order fields".to_string(),
            ));
        }

        let current = self
            .orders
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        ensure_owner(access, caller, &current.user.user_id)?;

        let order = self
            .update_with(order_id, |order| {
                patch.apply(order);
                Ok(())
            })
            .await?;

        tracing::info!(
            order_id = %order.order_id,
            order_status = ?order.order_status,
            payment_status = %order.payment_status,
            "Order status updated"
        );
        notify_order(self.notifier.as_ref(), ORDER_STATUS_CHANGE_EVENT, &order);
        Ok(order)
    }

    pub async fn get_order(&self, caller: &Caller, order_id: &str) -> Result<Order, ServiceError> {
        let access = authorize(&self.capabilities, caller, Action::GetOrder)?;
        let order = self
            .orders
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        ensure_owner(access, caller, &order.user.user_id)?;
        Ok(order)
    }

    pub async fn list_orders(&self, caller: &Caller) -> Result<Vec<Order>, ServiceError> {
        let access = authorize(&self.capabilities, caller, Action::ListOrders)?;
        let owner = access.is_own_scoped().then_some(caller.user_id.as_str());
        Ok(self.orders.list(owner).await?)
    }

    pub async fn find_order(&self, order_id: &str) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.find_by_order_id(order_id).await?)
    }

    /// Store the provider reference returned when payment was initiated.
    pub async fn attach_payment(
        &self,
        order_id: &str,
        provider_payment_id: &str,
        pay_url: &str,
    ) -> Result<Order, ServiceError> {
        self.update_with(order_id, |order| {
            order.payment_details.payment_method = PaymentMethod::Online;
            order.payment_details.transaction_id = Some(order.order_id.clone());
            order.payment_details.external_payment_id = Some(provider_payment_id.to_string());
            order.payment_details.pay_url = Some(pay_url.to_string());
            if order.payment_status == PaymentStatus::Failed {
                order.payment_status = PaymentStatus::Pending;
                order.payment_details.status = PaymentStatus::Pending;
            }
            Ok(())
        })
        .await
    }

    /// Optimistic read-modify-write. Writes are skipped when `change`
    /// leaves the order untouched.
    async fn update_with<F>(&self, order_id: &str, mut change: F) -> Result<Order, ServiceError>
    where
        F: FnMut(&mut Order) -> Result<(), ServiceError>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let current = self
                .orders
                .find_by_order_id(order_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

            let mut updated = current.clone();
            change(&mut updated)?;
            if updated == current {
                return Ok(current);
            }
            updated.updated_at = Utc::now();

            match self.orders.replace(updated, current.version).await {
                Ok(order) => return Ok(order),
                Err(StoreError::VersionConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::VersionConflict(order_id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::memory::InMemoryOrderStore;
    use crate::services::notifier::RecordingNotifier;

    fn service() -> (OrderService, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let service = OrderService::new(
            Arc::new(InMemoryOrderStore::new()),
            notifier.clone(),
            Arc::new(CapabilityTable::standard()),
        );
        (service, notifier)
    }

    fn item(name: &str, quantity: u32, price: i64) -> OrderItem {
        OrderItem {
            menu_item: format!("menu-{}", name),
            food_name: name.to_string(),
            quantity,
            food_price: Decimal::new(price, 2),
            total_price: Decimal::new(price * quantity as i64, 2),
        }
    }

    fn new_order(order_id: Option<&str>, items: Vec<OrderItem>) -> NewOrder {
        let total = items.iter().map(|i| i.total_price).sum();
        NewOrder {
            order_id: order_id.map(str::to_string),
            order_type: OrderType::DineIn,
            table_number: Some("3".to_string()),
            delivery_address: None,
            items,
            order_total: total,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            discount: Decimal::ZERO,
            notes: None,
            payment_method: PaymentMethod::Online,
        }
    }

    fn caller() -> Caller {
        Caller {
            name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            phone: Some("555".to_string()),
            ..Caller::user("u1")
        }
    }

    #[tokio::test]
    async fn create_generates_id_and_notifies() {
        let (service, notifier) = service();
        let saved = service
            .create_order(&caller(), new_order(None, vec![item("tea", 2, 300)]))
            .await
            .unwrap();
        let Saved::Created(order) = saved else {
            panic!("expected a new order");
        };
        assert!(order.order_id.starts_with("ORD-"));
        assert_eq!(order.user.name, "Ada");
        assert_eq!(notifier.count(NEW_ORDER_EVENT), 2);
    }

    #[tokio::test]
    async fn resubmission_keeps_id_and_created_at() {
        let (service, _) = service();
        let Saved::Created(first) = service
            .create_order(&caller(), new_order(Some("ORD-1"), vec![item("tea", 1, 300)]))
            .await
            .unwrap()
        else {
            panic!("expected a new order");
        };

        let saved = service
            .create_order(
                &caller(),
                new_order(Some("ORD-1"), vec![item("cake", 2, 450), item("tea", 1, 300)]),
            )
            .await
            .unwrap();
        let Saved::Updated(second) = saved else {
            panic!("expected an update");
        };
        assert_eq!(second.order_id, "ORD-1");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.order_total, Decimal::new(1200, 2));
        assert_eq!(second.user, first.user);
    }

    #[tokio::test]
    async fn settled_orders_cannot_be_resubmitted() {
        let (service, _) = service();
        service
            .create_order(&caller(), new_order(Some("ORD-2"), vec![item("tea", 1, 300)]))
            .await
            .unwrap();
        let admin = Caller::user("ops").with_role(Role::Admin);
        service
            .update_order_status(
                &admin,
                "ORD-2",
                OrderStatusPatch {
                    payment_status: Some(PaymentStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = service
            .create_order(&caller(), new_order(Some("ORD-2"), vec![item("tea", 2, 300)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_inconsistent_lines_and_missing_table() {
        let (service, _) = service();
        let mut bad_line = item("tea", 2, 300);
        bad_line.total_price = Decimal::new(100, 2);
        let err = service
            .create_order(&caller(), new_order(None, vec![bad_line]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut no_table = new_order(None, vec![item("tea", 1, 300)]);
        no_table.table_number = None;
        let err = service.create_order(&caller(), no_table).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn users_may_only_patch_order_status() {
        let (service, _) = service();
        service
            .create_order(&caller(), new_order(Some("ORD-3"), vec![item("tea", 1, 300)]))
            .await
            .unwrap();

        let err = service
            .update_order_status(
                &caller(),
                "ORD-3",
                OrderStatusPatch {
                    payment_status: Some(PaymentStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let updated = service
            .update_order_status(
                &caller(),
                "ORD-3",
                OrderStatusPatch {
                    order_status: Some(OrderStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.order_status, OrderStatus::Cancelled);
        assert_eq!(updated.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn patch_merges_only_present_fields() {
        let (service, notifier) = service();
        service
            .create_order(&caller(), new_order(Some("ORD-4"), vec![item("tea", 1, 300)]))
            .await
            .unwrap();
        let admin = Caller::user("ops").with_role(Role::Admin);

        let updated = service
            .update_order_status(
                &admin,
                "ORD-4",
                OrderStatusPatch {
                    cooking_status: Some(CookingStatus::InProgress),
                    payment_details: Some(PaymentDetailsPatch {
                        status: Some(PaymentStatus::Refunded),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.cooking_status, CookingStatus::InProgress);
        assert_eq!(updated.order_status, OrderStatus::Pending);
        assert_eq!(updated.payment_status, PaymentStatus::Refunded);
        assert_eq!(updated.payment_details.payment_method, PaymentMethod::Online);
        assert_eq!(notifier.count(ORDER_STATUS_CHANGE_EVENT), 2);

        let missing = service
            .update_order_status(
                &admin,
                "ORD-404",
                OrderStatusPatch {
                    order_status: Some(OrderStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_is_scoped_to_owner_for_users() {
        let (service, _) = service();
        service
            .create_order(&caller(), new_order(None, vec![item("tea", 1, 300)]))
            .await
            .unwrap();
        service
            .create_order(&Caller::user("u2"), new_order(None, vec![item("tea", 1, 300)]))
            .await
            .unwrap();

        assert_eq!(service.list_orders(&caller()).await.unwrap().len(), 1);
        let admin = Caller::user("ops").with_role(Role::Admin);
        assert_eq!(service.list_orders(&admin).await.unwrap().len(), 2);
    }
}
