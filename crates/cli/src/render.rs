//! Column rendering for the admin commands.

use crosswalk_protocol::KnownKeyEntry;

/// Render observed keys for one or more sets as an index-aligned table: one
/// column pair per set, rows aligned by position. Sets with fewer keys render
/// blank cells beyond their own length.
pub fn known_keys_table(columns: &[(String, Vec<KnownKeyEntry>)], show_last_seen: bool) -> String {
    let rows = columns
        .iter()
        .map(|(_, entries)| entries.len())
        .max()
        .unwrap_or(0);

    let mut headers: Vec<String> = Vec::new();
    let mut cells: Vec<Vec<String>> = Vec::new();

    for (name, entries) in columns {
        headers.push(name.to_uppercase());
        cells.push(
            (0..rows)
                .map(|i| entries.get(i).map(|e| e.key.clone()).unwrap_or_default())
                .collect(),
        );
        if show_last_seen {
            headers.push("LAST SEEN".to_string());
            cells.push(
                (0..rows)
                    .map(|i| {
                        entries
                            .get(i)
                            .map(|e| format_last_seen(e.last_seen))
                            .unwrap_or_default()
                    })
                    .collect(),
            );
        }
    }

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(c, h)| {
            cells[c]
                .iter()
                .map(String::len)
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_row(&mut out, &headers, &widths);
    for r in 0..rows {
        let row: Vec<String> = cells.iter().map(|col| col[r].clone()).collect();
        push_row(&mut out, &row, &widths);
    }
    out
}

/// Render explicit links as two key columns headed by their set names.
pub fn links_table(
    left_set: &str,
    right_set: &str,
    left_keys: &[String],
    right_keys: &[String],
) -> String {
    let headers = vec![left_set.to_uppercase(), right_set.to_uppercase()];
    let left_width = left_keys
        .iter()
        .map(String::len)
        .chain(std::iter::once(headers[0].len()))
        .max()
        .unwrap_or(0);
    let right_width = right_keys
        .iter()
        .map(String::len)
        .chain(std::iter::once(headers[1].len()))
        .max()
        .unwrap_or(0);
    let widths = vec![left_width, right_width];

    let mut out = String::new();
    push_row(&mut out, &headers, &widths);
    for (left, right) in left_keys.iter().zip(right_keys) {
        push_row(&mut out, &[left.clone(), right.clone()], &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn format_last_seen(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[&str]) -> Vec<KnownKeyEntry> {
        keys.iter()
            .map(|k| KnownKeyEntry {
                key: k.to_string(),
                last_seen: 1_700_000_000,
            })
            .collect()
    }

    #[test]
    fn rows_align_by_index_with_blank_tail() {
        // Second set has one key; rows 2-3 of its column are blank.
        let columns = vec![
            ("powerschool".to_string(), entries(&["alg", "bio", "chem"])),
            ("canvas".to_string(), entries(&["zoology"])),
        ];

        let table = known_keys_table(&columns, false);
        let expected = "\
POWERSCHOOL  CANVAS
alg          zoology
bio
chem
";
        assert_eq!(table, expected);
    }

    #[test]
    fn last_seen_column_is_optional() {
        let columns = vec![("canvas".to_string(), entries(&["zoology"]))];

        let without = known_keys_table(&columns, false);
        assert!(!without.contains("LAST SEEN"));

        let with = known_keys_table(&columns, true);
        assert!(with.contains("LAST SEEN"));
        assert!(with.contains("2023-11-14"));
    }

    #[test]
    fn empty_sets_render_headers_only() {
        let columns = vec![
            ("powerschool".to_string(), Vec::new()),
            ("canvas".to_string(), Vec::new()),
        ];

        let table = known_keys_table(&columns, false);
        assert_eq!(table, "POWERSCHOOL  CANVAS\n");
    }

    #[test]
    fn links_table_pairs_rows() {
        let table = links_table(
            "powerschool",
            "canvas",
            &["ALG-1".to_string()],
            &["algebra-i".to_string()],
        );
        let expected = "\
POWERSCHOOL  CANVAS
ALG-1        algebra-i
";
        assert_eq!(table, expected);
    }
}
