use chrono::Utc;
use uuid::Uuid;

/// Build a human-facing order number like `ORD-20250301-493027`: the date
/// the order was placed plus six random digits. Uniqueness is not checked
/// here; the unique index on `orders.order_number` is the authoritative
/// guard, and a collision surfaces as a retryable conflict at insert time.
pub fn generate() -> String {
    let date = Utc::now().format("%Y%m%d");
    let bytes = Uuid::new_v4().into_bytes();
    let suffix = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % 1_000_000;
    format!("ORD-{date}-{suffix:06}")
}
