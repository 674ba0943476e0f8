//! Column-wrapped text rendering for device-name lists.

/// Lay `list` out column-major over `columns` columns, each column padded to
/// its own widest entry.
pub fn columns(list: &[String], columns: usize) -> String {
    let columns = columns.max(1);
    let per_column = list.len().div_ceil(columns);

    let mut column_lengths = Vec::with_capacity(columns);
    for i in 0..columns {
        let mut max_len = 0;
        for row in 0..per_column {
            if let Some(elem) = list.get(i * per_column + row) {
                max_len = max_len.max(elem.len());
            }
        }
        column_lengths.push(max_len);
    }

    let mut result = String::new();
    for row in 0..per_column {
        for column in 0..columns {
            let idx = column * per_column + row;
            let mut value = list.get(idx).cloned().unwrap_or_default();

            // No padding on the last occupied column of a row.
            let idx_to_the_right = (column + 1) * per_column + row;
            if idx_to_the_right < list.len() {
                while value.len() < column_lengths[column] {
                    value.push(' ');
                }
                value.push(' ');
            }
            result.push_str(&value);
        }
        result.push('\n');
    }

    result
}
