use crate::models::{CategoryAssignment, ExtractedMetadata};
use tracing::warn;

/// Static marketplace taxonomy. Insertion order matters: score ties
/// resolve to the first entry.
#[derive(Clone, Copy)]
pub struct CategoryDefinition {
    pub name: &'static str,
    pub ebay_category_id: &'static str,
    pub keywords: &'static [&'static str],
    pub subcategories: &'static [SubcategoryDefinition],
}

#[derive(Clone, Copy)]
pub struct SubcategoryDefinition {
    pub name: &'static str,
    pub id: &'static str,
    pub keywords: &'static [&'static str],
}

pub const CATEGORY_MAPPINGS: [CategoryDefinition; 3] = [
    CategoryDefinition {
        name: "Solar Panel",
        ebay_category_id: "11700",
        keywords: &["solar", "panel", "photovoltaic", "pv", "watt", "voltage"],
        subcategories: &[
            SubcategoryDefinition {
                name: "Monocrystalline",
                id: "11701",
                keywords: &["mono", "monocrystalline", "single crystal"],
            },
            SubcategoryDefinition {
                name: "Polycrystalline",
                id: "11702",
                keywords: &["poly", "polycrystalline", "multi crystal"],
            },
            SubcategoryDefinition {
                name: "Flexible",
                id: "11703",
                keywords: &["flexible", "bendable", "thin film"],
            },
            SubcategoryDefinition {
                name: "Bifacial",
                id: "11704",
                keywords: &["bifacial", "double sided", "dual face"],
            },
        ],
    },
    CategoryDefinition {
        name: "Postcard",
        ebay_category_id: "10398",
        keywords: &["postcard", "vintage", "collectible", "greeting card"],
        subcategories: &[
            SubcategoryDefinition {
                name: "Vintage",
                id: "10399",
                keywords: &["vintage", "antique", "old"],
            },
            SubcategoryDefinition {
                name: "Modern",
                id: "10400",
                keywords: &["modern", "contemporary", "new"],
            },
            SubcategoryDefinition {
                name: "Real Photo",
                id: "10401",
                keywords: &["real photo", "rppc", "photograph"],
            },
        ],
    },
    CategoryDefinition {
        name: "Electronics",
        ebay_category_id: "58058",
        keywords: &["electronic", "device", "circuit", "component"],
        subcategories: &[
            SubcategoryDefinition {
                name: "Components",
                id: "58059",
                keywords: &["component", "resistor", "capacitor"],
            },
            SubcategoryDefinition {
                name: "Devices",
                id: "58060",
                keywords: &["device", "gadget", "equipment"],
            },
        ],
    },
];

/// Score every known category against a detected product type and resolve
/// the subcategory inside the winner. Pure and idempotent; a zero score
/// leaves both ids empty, which is a valid terminal outcome.
pub fn map_category(product_type: &str, subcategory_text: &str) -> CategoryAssignment {
    let product_lower = product_type.to_lowercase();

    let mut best: Option<&CategoryDefinition> = None;
    let mut best_score = 0u32;
    for category in &CATEGORY_MAPPINGS {
        let mut score = 0u32;
        if product_lower.contains(&category.name.to_lowercase()) {
            score += 10;
        }
        score += category
            .keywords
            .iter()
            .filter(|keyword| product_lower.contains(&keyword.to_lowercase()))
            .count() as u32;
        // Strict comparison keeps the first-iterated winner on ties.
        if score > best_score {
            best_score = score;
            best = Some(category);
        }
    }

    let Some(category) = best else {
        return CategoryAssignment::default();
    };

    // Subcategory keywords match the explicit subcategory text when the
    // extractor produced one, otherwise the product type itself.
    let probe = if subcategory_text.trim().is_empty() {
        product_lower
    } else {
        subcategory_text.to_lowercase()
    };
    let subcategory_id = category
        .subcategories
        .iter()
        .find(|sub| {
            sub.keywords
                .iter()
                .any(|keyword| probe.contains(&keyword.to_lowercase()))
        })
        .map(|sub| sub.id.to_string())
        .unwrap_or_default();

    CategoryAssignment {
        category_id: category.ebay_category_id.to_string(),
        subcategory_id,
    }
}

/// Assignment straight from an extracted metadata map.
pub fn assign(metadata: &ExtractedMetadata) -> CategoryAssignment {
    let product_type = metadata
        .get_any(&["product_type", "Product Type", "Type"])
        .unwrap_or_default();
    let subcategory = metadata
        .get_any(&["subcategory", "Subcategory"])
        .unwrap_or_default();
    map_category(&product_type, &subcategory)
}

/// The schema-loose metadata map must still carry a product type, a title
/// and a description before it reaches the CSV stage. Returns the missing
/// keys; callers log and proceed (mostly-empty rows beat dropped items).
pub fn missing_minimum_keys(metadata: &ExtractedMetadata) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if metadata.get_any(&["product_type", "Product Type"]).is_none() {
        missing.push("product_type");
    }
    if metadata.get_any(&["Title", "title"]).is_none() {
        missing.push("title");
    }
    if metadata.get_any(&["Description", "description"]).is_none() {
        missing.push("description");
    }
    if !missing.is_empty() {
        warn!(
            target = "lister.category",
            missing = ?missing,
            "metadata is missing minimum keys"
        );
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn solar_panel_scenario() {
        let assignment = map_category("Monocrystalline Solar Panel", "");
        assert_eq!(assignment.category_id, "11700");
        assert_eq!(assignment.subcategory_id, "11701");
    }

    #[test]
    fn postcard_scenario_with_explicit_subcategory() {
        let assignment = map_category("Vintage Postcard", "Real Photo");
        assert_eq!(assignment.category_id, "10398");
        assert_eq!(assignment.subcategory_id, "10401");
    }

    #[test]
    fn explicit_subcategory_overrides_product_type_keywords() {
        // "Vintage" appears in the product type but the explicit
        // subcategory text wins the subcategory resolution.
        let assignment = map_category("Vintage Postcard", "modern reprint");
        assert_eq!(assignment.category_id, "10398");
        assert_eq!(assignment.subcategory_id, "10400");
    }

    #[test]
    fn no_match_leaves_ids_empty() {
        let assignment = map_category("Wooden Rocking Chair", "");
        assert_eq!(assignment, CategoryAssignment::default());
    }

    #[test]
    fn mapper_is_idempotent() {
        let meta = crate::models::ExtractedMetadata::from_value(json!({
            "product_type": "400W Polycrystalline Solar Panel",
        }))
        .expect("object");
        let first = assign(&meta);
        let second = assign(&meta);
        assert_eq!(first, second);
        assert_eq!(first.category_id, "11700");
        assert_eq!(first.subcategory_id, "11702");
    }

    #[test]
    fn name_substring_outscores_stray_keywords() {
        // "vintage" is a Postcard keyword, but the category name match on
        // Electronics dominates with the +10 bonus.
        let assignment = map_category("Vintage Electronics", "");
        assert_eq!(assignment.category_id, "58058");
    }

    #[test]
    fn minimum_key_validation() {
        let meta = crate::models::ExtractedMetadata::from_value(json!({
            "product_type": "Postcard",
            "Title": "A Title",
        }))
        .expect("object");
        assert_eq!(missing_minimum_keys(&meta), vec!["description"]);

        let full = crate::models::ExtractedMetadata::from_value(json!({
            "product_type": "Postcard",
            "Title": "A Title",
            "Description": "<p>desc</p>",
        }))
        .expect("object");
        assert!(missing_minimum_keys(&full).is_empty());
    }
}
