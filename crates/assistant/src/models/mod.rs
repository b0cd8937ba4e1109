//! Domain models shared by the data store, tools and JSON API.

pub mod order;
pub mod product;

pub use order::{CustomerInfo, NewOrder, NewOrderLine, Order, OrderDetail, OrderItem, OrderSummary};
pub use product::{CatalogEntry, NewProduct, Product, SearchFilters, SearchPage, SearchQuery};
