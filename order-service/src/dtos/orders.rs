use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::models::{CookingStatus, OrderItem, OrderStatus, OrderType, PaymentMethod, PaymentStatus};
use crate::services::{NewOrder, OrderStatusPatch, PaymentDetailsPatch};

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[validate(length(min = 1, message = "Menu item is required"))]
    pub menu_item: String,
    #[validate(length(min = 1, message = "Food name is required"))]
    pub food_name: String,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub food_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Present when the client resubmits an order it created earlier.
    #[serde(default)]
    pub order_id: Option<String>,
    #[validate(length(min = 1, message = "Order type is required"))]
    pub order_type: String,
    #[serde(default, deserialize_with = "super::string_or_number")]
    pub table_number: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[validate(
        length(min = 1, message = "Order must contain at least one item"),
        nested
    )]
    pub items: Vec<OrderItemRequest>,
    pub order_total: Decimal,
    #[serde(default)]
    pub tax: Decimal,
    #[serde(default)]
    pub shipping: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl TryFrom<CreateOrderRequest> for NewOrder {
    type Error = AppError;

    fn try_from(request: CreateOrderRequest) -> Result<Self, Self::Error> {
        let order_type = request
            .order_type
            .parse::<OrderType>()
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))?;

        Ok(NewOrder {
            order_id: request.order_id,
            order_type,
            table_number: request.table_number,
            delivery_address: request.delivery_address,
            items: request
                .items
                .into_iter()
                .map(|item| OrderItem {
                    menu_item: item.menu_item,
                    food_name: item.food_name,
                    quantity: item.quantity,
                    food_price: item.food_price,
                    total_price: item.total_price,
                })
                .collect(),
            order_total: request.order_total,
            tax: request.tax,
            shipping: request.shipping,
            discount: request.discount,
            notes: request.notes,
            payment_method: request.payment_method,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetailsRequest {
    pub payment_method: Option<PaymentMethod>,
    pub amount_paid: Option<Decimal>,
    pub transaction_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub status: Option<PaymentStatus>,
    #[validate(url(message = "Pay URL must be a valid URL"))]
    pub pay_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub order_status: Option<OrderStatus>,
    pub cooking_status: Option<CookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    #[validate(nested)]
    pub payment_details: Option<PaymentDetailsRequest>,
}

impl From<UpdateOrderStatusRequest> for OrderStatusPatch {
    fn from(request: UpdateOrderStatusRequest) -> Self {
        OrderStatusPatch {
            order_status: request.order_status,
            cooking_status: request.cooking_status,
            payment_status: request.payment_status,
            payment_details: request.payment_details.map(|d| PaymentDetailsPatch {
                payment_method: d.payment_method,
                amount_paid: d.amount_paid,
                transaction_id: d.transaction_id,
                external_payment_id: d.external_payment_id,
                status: d.status,
                pay_url: d.pay_url,
            }),
        }
    }
}
