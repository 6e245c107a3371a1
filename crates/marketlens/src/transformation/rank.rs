// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::data_handler::{ColumnData, Result, Table};
use std::cmp::Ordering;

/// Sorts descending by `value_column` (stable, nulls last) and keeps the
/// first `top_n` rows. `None` or zero leaves the table untouched.
pub fn rank_top_n(table: &Table, value_column: &str, top_n: Option<usize>) -> Result<Table> {
    let Some(limit) = top_n.filter(|&n| n > 0) else {
        return Ok(table.clone());
    };
    let column = table.require(value_column)?;
    let cells: Vec<_> = (0..table.row_count()).map(|i| column.get_value(i)).collect();
    let mut order: Vec<usize> = (0..cells.len()).collect();
    order.sort_by(|&a, &b| match (cells[a].is_null(), cells[b].is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => cells[b].total_cmp(&cells[a]),
    });
    order.truncate(limit);
    table.select_rows(&order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handler::Value;

    fn counts() -> Table {
        Table::from_rows(
            "counts",
            &["Industry", "Count"],
            vec![
                vec!["Food".into(), Value::Int64(1)],
                vec!["Energy".into(), Value::Null],
                vec!["Water".into(), Value::Int64(3)],
                vec!["Mining".into(), Value::Int64(3)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn keeps_ties_in_input_order() {
        let ranked = rank_top_n(&counts(), "Count", Some(2)).unwrap();
        assert_eq!(ranked.row_count(), 2);
        assert_eq!(ranked.value("Industry", 0), Some(Value::from("Water")));
        assert_eq!(ranked.value("Industry", 1), Some(Value::from("Mining")));
    }

    #[test]
    fn nulls_rank_last() {
        let ranked = rank_top_n(&counts(), "Count", Some(10)).unwrap();
        assert_eq!(ranked.row_count(), 4);
        assert_eq!(ranked.value("Industry", 3), Some(Value::from("Energy")));
    }

    #[test]
    fn no_limit_is_identity() {
        let table = counts();
        for top_n in [None, Some(0)] {
            let ranked = rank_top_n(&table, "Count", top_n).unwrap();
            assert_eq!(ranked.value("Industry", 0), Some(Value::from("Food")));
        }
    }
}
