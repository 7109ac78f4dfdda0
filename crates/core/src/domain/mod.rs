pub mod article;
pub mod contract;
pub mod outlook;
pub mod price;
pub mod profile;
