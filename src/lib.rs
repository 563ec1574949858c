//! Wildprompt - wildcard template engine for prompt expansion

pub mod catalog;
pub mod config;
pub mod error;
pub mod expand;
pub mod lora;

pub use catalog::{CatalogBuilder, CatalogMode, WildcardCatalog};
pub use config::WildcardConfig;
pub use error::{Result, WildError};
pub use expand::{process, Expander};
pub use lora::{extract_lora_tags, process_with_loras, split_break_segments, strip_lora_tags};
pub use lora::{ExpansionPasses, LoraHost, LoraRecord};
