//! Bill table extraction from the billing query page.
//!
//! The query page renders the bill inside a single `.table-responsive`
//! block: eleven header cells followed by eleven data cells. Labels and
//! values are paired by position, not by matching header text, so the
//! remote layout must keep that column arrangement.

use scraper::{ElementRef, Html, Selector};

use crate::types::BillFields;

/// Selector for the container that wraps the bill table.
pub const TABLE_MARKER: &str = ".table-responsive";
/// Number of header/data cells read from the table.
pub const CELL_LIMIT: usize = 22;
/// Distance between a label cell and its value cell.
pub const PAIR_OFFSET: usize = CELL_LIMIT / 2;

/// Extract label → value pairs from a bill page.
///
/// Returns an empty map when the table marker is missing or fewer than
/// [`CELL_LIMIT`] cells are present. A short table is treated as no data;
/// it is never partially populated.
pub fn extract_bill_fields(html: &str) -> BillFields {
    let mut fields = BillFields::new();

    let cells = collect_cells(html);
    if cells.len() < CELL_LIMIT {
        tracing::debug!(
            "bill table unusable: found {} of {} cells",
            cells.len(),
            CELL_LIMIT
        );
        return fields;
    }

    for i in 0..PAIR_OFFSET {
        let label = &cells[i];
        if label.is_empty() {
            continue;
        }
        // A repeated label keeps its first position and takes the later value.
        fields.insert(label.clone(), cells[i + PAIR_OFFSET].clone());
    }

    fields
}

/// Text of the first [`CELL_LIMIT`] `th`/`td` cells inside the bill table,
/// in document order.
fn collect_cells(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    let (Ok(table_sel), Ok(cell_sel)) = (Selector::parse(TABLE_MARKER), Selector::parse("th, td"))
    else {
        return Vec::new();
    };

    let Some(table) = document.select(&table_sel).next() else {
        return Vec::new();
    };

    table
        .select(&cell_sel)
        .take(CELL_LIMIT)
        .map(cell_text)
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill_page(labels: &[&str], values: &[&str]) -> String {
        let head: String = labels.iter().map(|l| format!("<th>{l}</th>")).collect();
        let body: String = values.iter().map(|v| format!("<td>{v}</td>")).collect();
        format!(
            r#"<html><body>
            <div class="container"><div class="table-responsive">
            <table><thead><tr>{head}</tr></thead><tbody><tr>{body}</tr></tbody></table>
            </div></div>
            </body></html>"#
        )
    }

    fn labels() -> Vec<String> {
        (0..11).map(|i| format!("label{i}")).collect()
    }

    fn values() -> Vec<String> {
        (0..11).map(|i| format!("value{i}")).collect()
    }

    fn as_refs(v: &[String]) -> Vec<&str> {
        v.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_missing_marker_yields_empty() {
        let html = "<html><body><table><tr><td>a</td></tr></table></body></html>";
        assert!(extract_bill_fields(html).is_empty());
    }

    #[test]
    fn test_garbage_input_yields_empty() {
        assert!(extract_bill_fields("").is_empty());
        assert!(extract_bill_fields("<<<not html").is_empty());
    }

    #[test]
    fn test_short_table_yields_empty() {
        let l = labels();
        let v = values();
        let html = bill_page(&as_refs(&l), &as_refs(&v[..10]));
        assert!(extract_bill_fields(&html).is_empty());
    }

    #[test]
    fn test_full_table_pairs_by_position() {
        let l = labels();
        let v = values();
        let html = bill_page(&as_refs(&l), &as_refs(&v));
        let fields = extract_bill_fields(&html);

        assert_eq!(fields.len(), 11);
        for i in 0..11 {
            assert_eq!(fields[&format!("label{i}")], format!("value{i}"));
        }
        let order: Vec<&String> = fields.keys().collect();
        assert_eq!(order[0], "label0");
        assert_eq!(order[10], "label10");
    }

    #[test]
    fn test_cells_beyond_limit_ignored() {
        let l = labels();
        let mut v = values();
        v.push("extra".to_string());
        v.push("more".to_string());
        let html = bill_page(&as_refs(&l), &as_refs(&v));
        let fields = extract_bill_fields(&html);

        assert_eq!(fields.len(), 11);
        assert!(fields.values().all(|v| v != "extra" && v != "more"));
    }

    #[test]
    fn test_only_first_marker_used() {
        let l = labels();
        let v = values();
        let html = format!(
            r#"<div class="table-responsive"><table><tr><td>lonely</td></tr></table></div>{}"#,
            bill_page(&as_refs(&l), &as_refs(&v))
        );
        assert!(extract_bill_fields(&html).is_empty());
    }

    #[test]
    fn test_nested_markup_flattened_and_trimmed() {
        let mut l = labels();
        l[3] = "<span>本期</span><b>總金額</b>".to_string();
        let mut v = values();
        v[3] = "  1,234.50 元  ".to_string();
        let html = bill_page(&as_refs(&l), &as_refs(&v));
        let fields = extract_bill_fields(&html);

        assert_eq!(fields["本期總金額"], "1,234.50 元");
    }

    #[test]
    fn test_duplicate_label_last_value_wins() {
        let mut l = labels();
        l[7] = "label2".to_string();
        let mut v = values();
        v[7] = "late".to_string();
        let html = bill_page(&as_refs(&l), &as_refs(&v));
        let fields = extract_bill_fields(&html);

        assert_eq!(fields.len(), 10);
        assert_eq!(fields["label2"], "late");
        assert_eq!(fields.get_index_of("label2"), Some(2));
    }

    #[test]
    fn test_empty_label_skipped() {
        let mut l = labels();
        l[0] = String::new();
        let v = values();
        let html = bill_page(&as_refs(&l), &as_refs(&v));
        let fields = extract_bill_fields(&html);

        assert_eq!(fields.len(), 10);
        assert!(!fields.values().any(|v| v == "value0"));
    }

    #[test]
    fn test_mixed_th_td_document_order() {
        // Label row uses td, value row uses th: order is what counts.
        let cells: String = (0..11)
            .map(|i| format!("<td>L{i}</td>"))
            .chain((0..11).map(|i| format!("<th>V{i}</th>")))
            .collect();
        let html = format!(r#"<section class="table-responsive"><table><tr>{cells}</tr></table></section>"#);
        let fields = extract_bill_fields(&html);

        assert_eq!(fields.len(), 11);
        assert_eq!(fields["L5"], "V5");
    }
}
