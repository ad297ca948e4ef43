//! Inventory domain module.
//!
//! Business rules for lendable stock, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage). Atomicity across several
//! products is provided by the store that drives these aggregates.

pub mod product;

pub use product::{
    DecrementStock, IncrementStock, LowStockReached, Product, ProductActivationChanged,
    ProductCommand, ProductEvent, ProductRegistered, ProductStatus, RegisterProduct,
    SetProductActive, StockDecremented, StockIncremented,
};
