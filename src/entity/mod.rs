pub mod addresses;
pub mod audit_logs;
pub mod cart_items;
pub mod order_items;
pub mod orders;
pub mod product_variants;
pub mod users;

pub use addresses::Entity as Addresses;
pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_variants::Entity as ProductVariants;
pub use users::Entity as Users;
