//! Typed role/action capability table.
//!
//! The table is built once at startup and shared through application
//! state. Lookups never parse strings at request time.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" | "super_admin" => Ok(Role::SuperAdmin),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ListOrders,
    CreateOrder,
    GetOrder,
    UpdateOrderStatus,
    ListBookings,
    CreateBooking,
    GetBooking,
    UpdateBookingStatus,
    DeleteBooking,
    InitiatePayment,
    VerifyPayment,
    ViewReconciliation,
    ReplayReconciliation,
}

/// Order fields a status patch may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderField {
    OrderStatus,
    CookingStatus,
    PaymentStatus,
    PaymentDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
    /// Only records the caller owns.
    OwnOnly,
    /// Only records the caller owns, and only the listed fields.
    FieldAllowlist(HashSet<OrderField>),
}

impl Access {
    /// Whether the caller may act on a record given its ownership.
    pub fn permits(&self, is_owner: bool) -> bool {
        match self {
            Access::Allowed => true,
            Access::Denied => false,
            Access::OwnOnly | Access::FieldAllowlist(_) => is_owner,
        }
    }

    /// Whether the action is scoped to the caller's own records.
    pub fn is_own_scoped(&self) -> bool {
        matches!(self, Access::OwnOnly | Access::FieldAllowlist(_))
    }

    /// Whether every field in `fields` may be written.
    pub fn allows_fields(&self, fields: &[OrderField]) -> bool {
        match self {
            Access::Allowed => true,
            Access::Denied => false,
            Access::OwnOnly => true,
            Access::FieldAllowlist(allowed) => fields.iter().all(|f| allowed.contains(f)),
        }
    }
}

/// Identity of the caller as asserted by the trusted upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Caller {
    pub fn user(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            role: Role::User,
            name: None,
            email: None,
            phone: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn owns(&self, owner_id: &str) -> bool {
        self.user_id == owner_id
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityTable {
    entries: HashMap<(Role, Action), Access>,
}

impl CapabilityTable {
    /// The production policy.
    pub fn standard() -> Self {
        use Action::*;

        let mut entries = HashMap::new();

        for role in [Role::Admin, Role::SuperAdmin] {
            for action in [
                ListOrders,
                CreateOrder,
                GetOrder,
                UpdateOrderStatus,
                ListBookings,
                CreateBooking,
                GetBooking,
                UpdateBookingStatus,
                DeleteBooking,
                InitiatePayment,
                VerifyPayment,
                ViewReconciliation,
                ReplayReconciliation,
            ] {
                entries.insert((role, action), Access::Allowed);
            }
        }

        let user = Role::User;
        entries.insert((user, CreateOrder), Access::Allowed);
        entries.insert((user, CreateBooking), Access::Allowed);
        entries.insert((user, InitiatePayment), Access::Allowed);
        entries.insert((user, VerifyPayment), Access::Allowed);
        entries.insert((user, ListOrders), Access::OwnOnly);
        entries.insert((user, GetOrder), Access::OwnOnly);
        entries.insert((user, ListBookings), Access::OwnOnly);
        entries.insert((user, GetBooking), Access::OwnOnly);
        entries.insert((user, DeleteBooking), Access::OwnOnly);
        entries.insert(
            (user, UpdateOrderStatus),
            Access::FieldAllowlist(HashSet::from([OrderField::OrderStatus])),
        );
        entries.insert((user, UpdateBookingStatus), Access::Denied);
        entries.insert((user, ViewReconciliation), Access::Denied);
        entries.insert((user, ReplayReconciliation), Access::Denied);

        Self { entries }
    }

    /// Access for a role and action; unlisted pairs are denied.
    pub fn access(&self, role: Role, action: Action) -> &Access {
        self.entries.get(&(role, action)).unwrap_or(&Access::Denied)
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}
