#![allow(unused_imports)]

pub mod client;
pub mod files;
pub mod metafields;
pub mod product;
pub mod publish;
pub mod record;

pub use client::{ShopifyClient, ShopifyError};
pub use files::FileHandle;
pub use metafields::{MetafieldEntry, MetafieldType, MetafieldWriteReport, listing_metafields};
pub use product::{CreateProductRequest, CreatedProduct, ProductSnapshot};
pub use publish::PublishReport;
pub use record::{ProductRecord, RecordState};
