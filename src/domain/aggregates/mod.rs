//! Aggregates module
pub mod address;
pub mod cart;
pub mod category;
pub mod coupon;
pub mod order;
pub mod payment;
pub mod product;

pub use address::{Address, City, NewAddress, Province};
pub use cart::{Cart, CartError, CartLine, CartSummary, VariationIndex, CART_SESSION_KEY};
pub use category::{Category, CategoryTree};
pub use coupon::{Coupon, CouponError};
pub use order::{Order, OrderError, OrderItem, OrderLine, OrderStatus, OrderTotals, ShippingSnapshot};
pub use payment::{Payment, PaymentStateError, PaymentStatus};
pub use product::{Brand, Color, Product, ProductCard, ProductDetail, ProductError, ProductImage, ProductVariation, Size, VariationDetail};
