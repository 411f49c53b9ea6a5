use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settlement_common::Kobo;
pub use sqlx::types::Json;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        StoreId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct StoreId(pub String);

impl From<String> for StoreId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StoreId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StoreId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// The order has been submitted and the buyer has been sent to the gateway.
    Pending,
    /// The gateway confirmed the payment and the order has been finalized.
    Paid,
    /// The gateway reported a failed payment.
    Failed,
    /// The buyer abandoned the payment, or it expired.
    Cancelled,
}

impl PaymentStatus {
    /// `paid`, `failed` and `cancelled` are terminal. An order never leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------    DeliveryStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Shipped,
    #[sqlx(rename = "Out for Delivery")]
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    Delivered,
    Canceled,
    Returned,
    #[sqlx(rename = "Failed Delivery")]
    #[serde(rename = "Failed Delivery")]
    FailedDelivery,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Processing => "Processing",
            DeliveryStatus::Shipped => "Shipped",
            DeliveryStatus::OutForDelivery => "Out for Delivery",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Canceled => "Canceled",
            DeliveryStatus::Returned => "Returned",
            DeliveryStatus::FailedDelivery => "Failed Delivery",
        };
        f.write_str(s)
    }
}

impl FromStr for DeliveryStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "out for delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "returned" => Ok(Self::Returned),
            "failed delivery" => Ok(Self::FailedDelivery),
            _ => Err(ConversionError(format!("Invalid delivery status: {s}"))),
        }
    }
}

//--------------------------------------   ShippingAddress     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub phone: Option<String>,
}

//--------------------------------------    ShippingMethod     ---------------------------------------------------------
/// A store's shipping option. Sub-orders keep a snapshot of the method that was selected at checkout, so later
/// changes to the store's configuration do not change what the buyer paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    pub name: String,
    pub cost: Kobo,
    pub estimated_days: Option<i64>,
}

//--------------------------------------       LineItem        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Kobo,
    pub size: Option<String>,
}

impl LineItem {
    /// The line total, or `None` if it does not fit in an `i64`.
    pub fn total(&self) -> Option<Kobo> {
        self.unit_price.checked_mul(self.quantity)
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub buyer_id: String,
    pub store_ids: Json<Vec<StoreId>>,
    /// The amount the buyer is charged: the sum of all sub-order totals and shipping costs
    pub total_amount: Kobo,
    pub shipping_total: Kobo,
    pub payment_status: PaymentStatus,
    /// The idempotency key sent to the gateway as `tx_ref`
    pub tx_ref: String,
    pub shipping_address: Json<ShippingAddress>,
    /// Unverified payments are cancelled after this time
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub buyer_id: String,
    pub tx_ref: String,
    pub shipping_address: ShippingAddress,
    pub expires_at: DateTime<Utc>,
    pub sub_orders: Vec<NewSubOrder>,
}

impl NewOrder {
    pub fn store_ids(&self) -> Vec<StoreId> {
        self.sub_orders.iter().map(|s| s.store_id.clone()).collect()
    }

    /// `None` if the sum does not fit in a `Kobo`.
    pub fn shipping_total(&self) -> Option<Kobo> {
        self.sub_orders.iter().try_fold(Kobo::default(), |acc, s| acc.checked_add(s.shipping_cost))
    }

    /// What the buyer pays: goods plus shipping. The platform fee is taken out of the store's settlement, not added
    /// to the buyer's bill. `None` if the sum does not fit in a `Kobo`.
    pub fn total_amount(&self) -> Option<Kobo> {
        self.sub_orders
            .iter()
            .try_fold(Kobo::default(), |acc, s| s.sub_total.checked_add(s.shipping_cost).and_then(|v| acc.checked_add(v)))
    }
}

#[derive(Debug, Clone)]
pub struct NewSubOrder {
    pub store_id: StoreId,
    pub line_items: Vec<LineItem>,
    pub shipping_method: Option<ShippingMethod>,
    pub sub_total: Kobo,
    pub shipping_cost: Kobo,
    pub platform_fee: Kobo,
    pub settlement_amount: Kobo,
}

//--------------------------------------      EscrowRecord     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowState {
    Held,
    Released,
    Refunded,
}

impl Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowState::Held => write!(f, "held"),
            EscrowState::Released => write!(f, "released"),
            EscrowState::Refunded => write!(f, "refunded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EscrowRecord {
    pub held: bool,
    pub released: bool,
    pub refunded: bool,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
}

impl Default for EscrowRecord {
    fn default() -> Self {
        Self { held: true, released: false, refunded: false, released_at: None, refunded_at: None, refund_reason: None }
    }
}

impl EscrowRecord {
    /// Interprets the flags. Any combination that is not one of the three legal states is reported as an error
    /// describing the corruption.
    pub fn state(&self) -> Result<EscrowState, String> {
        match (self.held, self.released, self.refunded) {
            (true, false, false) => Ok(EscrowState::Held),
            (false, true, false) => Ok(EscrowState::Released),
            (false, false, true) => Ok(EscrowState::Refunded),
            (h, rel, re) => Err(format!("illegal escrow flags: held={h}, released={rel}, refunded={re}")),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.released || self.refunded
    }
}

//--------------------------------------  CustomerConfirmation ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CustomerConfirmation {
    pub confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub auto_confirmed: bool,
}

impl CustomerConfirmation {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed || self.auto_confirmed
    }
}

//--------------------------------------        SubOrder       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubOrder {
    pub id: i64,
    pub order_id: OrderId,
    pub store_id: StoreId,
    pub line_items: Json<Vec<LineItem>>,
    pub sub_total: Kobo,
    pub shipping_cost: Kobo,
    pub platform_fee: Kobo,
    /// What the store is owed once escrow is released: goods and shipping, less the platform fee
    pub settlement_amount: Kobo,
    pub delivery_status: DeliveryStatus,
    pub shipping_method: Option<Json<ShippingMethod>>,
    pub delivery_date: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    pub customer_confirmation: CustomerConfirmation,
    pub return_window: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    pub escrow: EscrowRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------  FundReleaseStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FundReleaseStatus {
    /// Created when the sub-order was delivered. Waiting for the return window to elapse.
    Pending,
    /// The buyer (or an admin) confirmed delivery. Still waiting for the return window.
    Ready,
    /// Handed to an external payout processor. The built-in scheduler credits wallets in a single transaction and
    /// never leaves a release parked here.
    Processing,
    /// Funds have been credited to the store's wallet.
    Released,
    /// The last release attempt failed. It will be retried.
    Failed,
    /// An admin reversed a release, debiting the store's wallet.
    Reversed,
}

impl FundReleaseStatus {
    pub fn all() -> [FundReleaseStatus; 6] {
        use FundReleaseStatus::*;
        [Pending, Ready, Processing, Released, Failed, Reversed]
    }

    /// Statuses only move forward, except for `failed -> pending` (retry) and `released -> reversed` (compensation).
    /// A failed release may also succeed directly on the next run.
    pub fn can_transition_to(&self, to: FundReleaseStatus) -> bool {
        use FundReleaseStatus::*;
        matches!(
            (self, to),
            (Pending, Ready | Processing | Released | Failed) |
                (Ready, Processing | Released | Failed) |
                (Processing, Released | Failed) |
                (Failed, Pending | Processing | Released) |
                (Released, Reversed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FundReleaseStatus::Released | FundReleaseStatus::Reversed)
    }
}

impl Display for FundReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FundReleaseStatus::Pending => "pending",
            FundReleaseStatus::Ready => "ready",
            FundReleaseStatus::Processing => "processing",
            FundReleaseStatus::Released => "released",
            FundReleaseStatus::Failed => "failed",
            FundReleaseStatus::Reversed => "reversed",
        };
        f.write_str(s)
    }
}

impl FromStr for FundReleaseStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "processing" => Ok(Self::Processing),
            "released" => Ok(Self::Released),
            "failed" => Ok(Self::Failed),
            "reversed" => Ok(Self::Reversed),
            s => Err(ConversionError(format!("Invalid fund release status: {s}"))),
        }
    }
}

//--------------------------------------      FundRelease      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FundRelease {
    pub id: i64,
    pub order_id: OrderId,
    pub sub_order_id: i64,
    pub store_id: StoreId,
    pub amount: Kobo,
    pub status: FundReleaseStatus,
    pub scheduled_release_time: DateTime<Utc>,
    pub actual_released_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Wallet         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub store_id: StoreId,
    /// Cached projection of the ledger. Only ever changed in the same transaction that appends the matching
    /// [`WalletTransaction`].
    pub balance: Kobo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Credit => write!(f, "credit"),
            TransactionType::Debit => write!(f, "debit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    Order,
    Withdrawal,
    Refund,
    Adjustment,
}

impl Display for TransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionSource::Order => write!(f, "order"),
            TransactionSource::Withdrawal => write!(f, "withdrawal"),
            TransactionSource::Refund => write!(f, "refund"),
            TransactionSource::Adjustment => write!(f, "adjustment"),
        }
    }
}

//--------------------------------------   WalletTransaction   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    pub id: i64,
    pub store_id: StoreId,
    pub tx_type: TransactionType,
    /// Always positive. The sign comes from `tx_type`.
    pub amount: Kobo,
    pub source: TransactionSource,
    pub order_id: Option<OrderId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn signed_amount(&self) -> Kobo {
        match self.tx_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub store_id: StoreId,
    pub tx_type: TransactionType,
    pub amount: Kobo,
    pub source: TransactionSource,
    pub order_id: Option<OrderId>,
    pub description: String,
}

impl NewWalletTransaction {
    pub fn credit(store_id: StoreId, amount: Kobo, source: TransactionSource, description: String) -> Self {
        Self { store_id, tx_type: TransactionType::Credit, amount, source, order_id: None, description }
    }

    pub fn debit(store_id: StoreId, amount: Kobo, source: TransactionSource, description: String) -> Self {
        Self { store_id, tx_type: TransactionType::Debit, amount, source, order_id: None, description }
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

//--------------------------------------      Withdrawal       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "pending"),
            WithdrawalStatus::Processing => write!(f, "processing"),
            WithdrawalStatus::Completed => write!(f, "completed"),
            WithdrawalStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid withdrawal status: {s}"))),
        }
    }
}

/// A payout history record. The wallet debit for the gross amount is recorded in the ledger at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub store_id: StoreId,
    pub amount: Kobo,
    pub fee: Kobo,
    pub net_amount: Kobo,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub store_id: StoreId,
    pub amount: Kobo,
    pub fee: Kobo,
}

impl NewWithdrawal {
    pub fn net_amount(&self) -> Kobo {
        self.amount - self.fee
    }
}
