//! Catalog seeding from YAML.
//!
//! ```yaml
//! products:
//!   - name: Temple Lakshmi Necklace
//!     category: Necklaces
//!     material: Gold
//!     price: "24999.00"
//!     stock: 4
//!     images:
//!       - https://res.cloudinary.com/aurum/image/upload/necklace-1.jpg
//! ```
//!
//! Entries whose slug already exists are skipped, so a file can be re-run.

use serde::Deserialize;

use aurum_storefront::db::{ProductRepository, RepositoryError};
use aurum_storefront::models::ProductInput;

use super::{CommandError, connect};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    products: Vec<ProductInput>,
}

/// Outcome of a seeding run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Parse and validate every entry before touching the database.
///
/// # Errors
///
/// Returns `CommandError::Yaml` for malformed files and
/// `CommandError::InvalidEntry` for the first entry that fails validation.
pub fn parse_catalog(content: &str) -> Result<Vec<ProductInput>, CommandError> {
    let file: CatalogFile = serde_yaml::from_str(content)?;
    file.products
        .into_iter()
        .enumerate()
        .map(|(index, product)| {
            let name = product.name.clone();
            product
                .normalize()
                .map_err(|reason| CommandError::InvalidEntry {
                    index,
                    name,
                    reason,
                })
        })
        .collect()
}

/// Insert the products listed in `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or an insert
/// fails for a reason other than a duplicate slug.
pub async fn catalog(file_path: &str) -> Result<SeedSummary, CommandError> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_owned(),
            source,
        })?;
    let products = parse_catalog(&content)?;
    tracing::info!(path = %file_path, products = products.len(), "Parsed catalog");

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);

    let mut summary = SeedSummary::default();
    for product in &products {
        match repo.create(product).await {
            Ok(created) => {
                tracing::info!(id = %created.id, slug = %created.slug, "Inserted");
                summary.inserted += 1;
            }
            Err(RepositoryError::Conflict(reason)) => {
                tracing::info!(name = %product.name, %reason, "Skipped");
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!("Seeding complete!");
    tracing::info!("  Inserted: {}", summary.inserted);
    tracing::info!("  Skipped (already exist): {}", summary.skipped);
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    const CATALOG: &str = r#"
products:
  - name: "  Jhumka Earrings "
    category: Earrings
    material: Silver
    price: "1899.00"
    stock: 12
  - name: Solitaire Ring
    slug: solitaire-ring
    category: Rings
    price: "45999.00"
"#;

    #[test]
    fn test_parse_catalog() {
        let products = parse_catalog(CATALOG).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].name, "Jhumka Earrings");
        assert_eq!(products[0].stock, 12);
        assert_eq!(products[1].stock, 0);
        assert!(products[1].is_active);
    }

    #[test]
    fn test_parse_catalog_reports_bad_entry() {
        let yaml = r#"
products:
  - name: Bangle
    category: Bangles
    price: "999.00"
  - name: "   "
    category: Bangles
    price: "999.00"
"#;
        match parse_catalog(yaml) {
            Err(CommandError::InvalidEntry { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidEntry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_catalog_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let err = catalog(path.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, CommandError::Io { .. }));
    }

    #[test]
    fn test_parse_catalog_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(parse_catalog(&content).unwrap().len(), 2);
    }
}
