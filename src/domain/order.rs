use uuid::Uuid;

use crate::{
    entity::{addresses::Model as AddressModel, product_variants::Model as VariantModel},
    error::{AppError, AppResult},
    models::ShippingAddress,
};

/// Copy the address fields as they are right now. The order keeps this copy
/// forever, regardless of what happens to the address row afterwards.
pub fn snapshot_address(address: &AddressModel) -> ShippingAddress {
    ShippingAddress {
        recipient: address.recipient.clone(),
        phone: address.phone.clone(),
        line1: address.line1.clone(),
        line2: address.line2.clone(),
        city: address.city.clone(),
        province: address.province.clone(),
        postal_code: address.postal_code.clone(),
        country: address.country.clone(),
    }
}

/// An order being assembled from a cart, before anything is persisted.
#[derive(Debug)]
pub struct OrderDraft {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItemDraft>,
    pub total_amount: i64,
}

#[derive(Debug)]
pub struct OrderItemDraft {
    pub product_variant_id: Uuid,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub item_total: i64,
}

impl OrderDraft {
    pub fn new(user_id: Uuid, order_number: String, shipping_address: ShippingAddress) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            order_number,
            shipping_address,
            items: Vec::new(),
            total_amount: 0,
        }
    }

    /// Append a line item named and priced as the variant is right now,
    /// then recompute the total.
    pub fn add_item(&mut self, variant: &VariantModel, quantity: i32) -> AppResult<()> {
        if quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".to_string(),
            ));
        }
        let item_total = variant.price * i64::from(quantity);
        self.items.push(OrderItemDraft {
            product_variant_id: variant.id,
            product_name: variant.name.clone(),
            unit_price: variant.price,
            quantity,
            item_total,
        });
        self.total_amount = self.items.iter().map(|item| item.item_total).sum();
        Ok(())
    }
}
