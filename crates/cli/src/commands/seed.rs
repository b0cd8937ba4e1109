//! Seed the catalog from a YAML file.
//!
//! Products are upserted by SKU, so re-running a seed updates prices, stock
//! and descriptions in place.
//!
//! ```yaml
//! products:
//!   - sku: CL-001
//!     name: Gentle Foam Cleanser
//!     brand: Aqua
//!     category: Cleanser
//!     price: "12000"
//!     stock: 20
//!     skin_types: [Dry, Sensitive]
//!     concerns: [dryness]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use skin_edit_assistant::db::ProductRepository;
use skin_edit_assistant::models::NewProduct;

use super::CommandError;

/// Top-level shape of a catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<NewProduct>,
}

/// Problems that would make a catalog file load inconsistently.
pub fn validate(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, product) in catalog.products.iter().enumerate() {
        let sku = product.sku.trim();
        if sku.is_empty() {
            errors.push(format!("product #{}: sku is empty", index + 1));
            continue;
        }
        if !seen.insert(sku.to_uppercase()) {
            errors.push(format!("{sku}: duplicate sku"));
        }
        if product.name.trim().is_empty() {
            errors.push(format!("{sku}: name is empty"));
        }
        if product.price.is_sign_negative() || product.price.is_zero() {
            errors.push(format!("{sku}: price must be positive"));
        }
    }

    errors
}

/// Parse and validate a catalog file's contents.
///
/// # Errors
///
/// Returns an error if the YAML is malformed or validation fails.
pub fn parse(content: &str) -> Result<CatalogFile, CommandError> {
    let catalog: CatalogFile = serde_yaml::from_str(content)?;

    let errors = validate(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(CommandError::InvalidCatalog(errors.len()));
    }
    Ok(catalog)
}

/// Upsert every product of a catalog file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a database
/// operation fails.
pub async fn catalog(file_path: &str) -> Result<(), CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading catalog from file");

    // Read and validate before connecting to the database
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_string(),
            source,
        })?;
    let catalog = parse(&content)?;
    info!(products = catalog.products.len(), "Catalog validated");

    let pool = super::connect().await?;
    let repo = ProductRepository::new(&pool);

    for product in &catalog.products {
        let stored = repo.upsert(product).await?;
        info!(sku = %stored.sku, id = %stored.id, stock = stored.stock, "Product upserted");
    }

    info!("Seeding complete!");
    info!("  Products upserted: {}", catalog.products.len());
    Ok(())
}
