//! Plain-text rendering of a product list for the share sheet.

use std::fmt::Write;

use crate::product::Product;

pub const EMPTY_LIST_MESSAGE: &str = "My Shopping List is empty";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

const HEADER: &str = "🛒 My Shopping List";
const HEADER_RULE: &str = "━━━━━━━━━━━━━━━━━━━━";
const SECTION_RULE: &str = "─────────────────────";

/// Renders `products` grouped by category, categories in the order they
/// first appear in the input. Pure and deterministic.
///
/// ```rust
/// use shopping_list_core::product::Product;
/// use shopping_list_core::share::format_shopping_list_for_sharing;
///
/// let mut milk = Product::new("Milk", Some("1L"), None, "Dairy");
/// milk.is_done = true;
/// let text = format_shopping_list_for_sharing(&[milk]);
/// assert!(text.contains("📁 Dairy\n"));
/// assert!(text.contains("☑ Milk - 1L\n"));
/// ```
pub fn format_shopping_list_for_sharing(products: &[Product]) -> String {
    if products.is_empty() {
        return EMPTY_LIST_MESSAGE.to_string();
    }

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(HEADER_RULE);
    out.push_str("\n\n");

    for (category, items) in group_by_category(products) {
        let _ = writeln!(out, "📁 {}", category);
        out.push_str(SECTION_RULE);
        out.push('\n');

        for product in items {
            let checkbox = if product.is_done { '☑' } else { '☐' };
            let _ = write!(out, "{} {}", checkbox, product.name);

            if let Some(quantity) = non_blank(&product.quantity) {
                let _ = write!(out, " - {}", quantity);
            }
            if let Some(note) = non_blank(&product.note) {
                let _ = write!(out, "\n   Note: {}", note);
            }
            out.push('\n');
        }
        out.push('\n');
    }

    out
}

/// Groups preserving first-seen category order. Blank categories share the
/// [`UNCATEGORIZED_LABEL`] bucket.
fn group_by_category(products: &[Product]) -> Vec<(&str, Vec<&Product>)> {
    let mut groups: Vec<(&str, Vec<&Product>)> = Vec::new();
    for product in products {
        let label = if product.category.trim().is_empty() {
            UNCATEGORIZED_LABEL
        } else {
            product.category.as_str()
        };
        match groups.iter().position(|(name, _)| *name == label) {
            Some(index) => groups[index].1.push(product),
            None => groups.push((label, vec![product])),
        }
    }
    groups
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
