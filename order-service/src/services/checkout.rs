//! Payment initiation for orders and bookings.
//!
//! The provider call happens before the record is touched and no lock is
//! held across it; the provider reference is merged in afterwards.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::bookings::BookingService;
use super::error::ServiceError;
use super::gateway::{CreatePaymentRequest, CreatedPayment, PaymentGateway};
use super::metrics::record_initiation;
use super::orders::OrderService;
use super::{authorize, ensure_owner};
use crate::models::order::is_order_id;
use crate::models::{Action, Caller, CapabilityTable, PaymentStatus};

/// Allowed gap between the requested amount and the record total.
fn amount_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiated {
    pub payment_url: String,
    pub provider_payment_id: String,
    pub order_id: String,
    /// `order` or `booking`.
    pub target: &'static str,
    pub amount: Decimal,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: OrderService,
    bookings: BookingService,
    gateway: Arc<dyn PaymentGateway>,
    capabilities: Arc<CapabilityTable>,
    timeout: Duration,
}

impl CheckoutService {
    pub fn new(
        orders: OrderService,
        bookings: BookingService,
        gateway: Arc<dyn PaymentGateway>,
        capabilities: Arc<CapabilityTable>,
        timeout: Duration,
    ) -> Self {
        Self {
            orders,
            bookings,
            gateway,
            capabilities,
            timeout,
        }
    }

    /// Open a provider payment for the order or booking named by
    /// `request.transaction_id`.
    pub async fn initiate_payment(
        &self,
        caller: &Caller,
        request: CreatePaymentRequest,
    ) -> Result<PaymentInitiated, ServiceError> {
        authorize(&self.capabilities, caller, Action::InitiatePayment)?;
        request.validate()?;

        let reference = request.transaction_id.trim().to_string();
        let target = if is_order_id(&reference) { "order" } else { "booking" };

        let result = self.initiate(caller, &reference, target, &request).await;
        record_initiation(target, if result.is_ok() { "ok" } else { "error" });
        result
    }

    async fn initiate(
        &self,
        caller: &Caller,
        reference: &str,
        target: &'static str,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentInitiated, ServiceError> {
        let (owner, status, total) = if target == "order" {
            let order = self
                .orders
                .find_order(reference)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", reference)))?;
            (order.user.user_id, order.payment_status, order.order_total)
        } else {
            let booking = self
                .bookings
                .find_booking(reference)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Booking {} not found", reference))
                })?;
            (booking.user, booking.payment_status, booking.amount)
        };

        let read_action = if target == "order" {
            Action::GetOrder
        } else {
            Action::GetBooking
        };
        ensure_owner(self.capabilities.access(caller.role, read_action), caller, &owner)?;

        if status.is_settled() {
            return Err(ServiceError::Validation(format!(
                "Payment for {} is already {}",
                reference, status
            )));
        }
        if (request.amount - total).abs() > amount_tolerance() {
            return Err(ServiceError::Validation(format!(
                "Amount {} does not match the {} total {}",
                request.amount, target, total
            )));
        }

        // A failed booking released its slot; take it back before paying.
        if target == "booking" && status == PaymentStatus::Failed {
            self.bookings.reopen_payment(reference).await?;
        }

        let created: CreatedPayment = self
            .bounded(self.gateway.create_payment(request), |message| {
                ServiceError::PaymentProvider(message)
            })
            .await?;

        if target == "order" {
            self.orders
                .attach_payment(reference, &created.id, &created.pay_url)
                .await?;
        } else {
            self.bookings.attach_payment(reference, &created.id).await?;
        }

        tracing::info!(
            kind = target,
            reference = %reference,
            provider_payment_id = %created.id,
            previous_status = %status,
            "Payment initiated"
        );

        Ok(PaymentInitiated {
            payment_url: created.pay_url,
            provider_payment_id: created.id,
            order_id: reference.to_string(),
            target,
            amount: request.amount,
        })
    }

    pub async fn verify_payment(
        &self,
        caller: &Caller,
        payment_id: &str,
    ) -> Result<Value, ServiceError> {
        authorize(&self.capabilities, caller, Action::VerifyPayment)?;
        self.bounded(self.gateway.verify_payment(payment_id), |message| {
            ServiceError::PaymentVerification(message)
        })
        .await
    }

    async fn bounded<T, F>(
        &self,
        call: F,
        on_timeout: impl FnOnce(String) -> ServiceError,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout_secs = self.timeout.as_secs(), "Payment provider call timed out");
                Err(on_timeout(format!(
                    "Payment provider did not answer within {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}
