pub mod cart;
pub mod catalog;
pub mod combo;
pub mod currency;
pub mod delivery;
pub mod ids;
pub mod order;
pub mod payment;
pub mod product;
pub mod report;
pub mod user;
