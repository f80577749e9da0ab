use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DMatrix;
use serde::Serialize;

use crate::stack::{StackedPanel, StackedRow, TreatVar};

/// One column of the event-time design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DesignColumn {
    /// `1(rel_time == offset)`.
    TimeDummy(i32),
    /// `1(rel_time == offset) * var`.
    Interaction(i32, TreatVar),
}

impl DesignColumn {
    /// Relative-time offset of the column.
    pub fn offset(self) -> i32 {
        match self {
            DesignColumn::TimeDummy(t) | DesignColumn::Interaction(t, _) => t,
        }
    }

    #[inline]
    fn value(self, row: &StackedRow) -> f64 {
        match self {
            DesignColumn::TimeDummy(t) => f64::from(u8::from(row.rel_time == t)),
            DesignColumn::Interaction(t, var) if row.rel_time == t => var.value(row),
            DesignColumn::Interaction(..) => 0.0,
        }
    }
}

impl fmt::Display for DesignColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesignColumn::TimeDummy(t) => write!(f, "rt_{t}"),
            DesignColumn::Interaction(t, var) => write!(f, "rt_{t}_x_{var}"),
        }
    }
}

/// Typed lookup `(offset, variable) -> column`, built once with the design.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnIndex {
    interactions: BTreeMap<(i32, TreatVar), usize>,
    dummies: BTreeMap<i32, usize>,
}

impl ColumnIndex {
    /// Builds the index from an ordered column list.
    pub fn from_columns(columns: &[DesignColumn]) -> Self {
        let mut index = Self::default();
        for (i, col) in columns.iter().enumerate() {
            match *col {
                DesignColumn::TimeDummy(t) => {
                    index.dummies.insert(t, i);
                }
                DesignColumn::Interaction(t, var) => {
                    index.interactions.insert((t, var), i);
                }
            }
        }
        index
    }

    /// Column of the `offset × var` interaction.
    pub fn get(&self, offset: i32, var: TreatVar) -> Option<usize> {
        self.interactions.get(&(offset, var)).copied()
    }

    /// Column of the plain dummy for `offset`.
    pub fn dummy(&self, offset: i32) -> Option<usize> {
        self.dummies.get(&offset).copied()
    }

    /// Number of interaction columns.
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// True without interaction columns.
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}

/// Dense design over every stacked row.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// `n_rows × n_columns` values.
    pub x: DMatrix<f64>,
    /// Column meaning, in matrix order.
    pub columns: Vec<DesignColumn>,
    /// Lookup over `columns`.
    pub index: ColumnIndex,
}

impl DesignMatrix {
    /// For each offset in `-H..=H` except the base: the optional plain dummy,
    /// then one interaction per treatment variable.
    pub fn event_time(panel: &StackedPanel, treat_vars: &[TreatVar], include_time_dummies: bool) -> Self {
        let base = panel.base_period();
        let mut columns = Vec::new();
        for t in panel.offsets().filter(|&t| t != base) {
            if include_time_dummies {
                columns.push(DesignColumn::TimeDummy(t));
            }
            columns.extend(treat_vars.iter().map(|&var| DesignColumn::Interaction(t, var)));
        }

        let rows = panel.rows();
        let values = rows.iter().flat_map(|row| columns.iter().map(move |c| c.value(row)));
        let x = DMatrix::from_row_iterator(rows.len(), columns.len(), values);
        let index = ColumnIndex::from_columns(&columns);
        Self { x, columns, index }
    }

    /// Column labels such as `rt_3_x_pos_shock`.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::tests::row;

    fn panel() -> StackedPanel {
        let mut rows = Vec::new();
        for t in -2..=2 {
            rows.push(row("A", t, 2.0, true));
            rows.push(row("B", t, 2.0, false));
        }
        StackedPanel::from_rows(rows, 2, -1)
    }

    #[test]
    fn skips_base_offset() {
        let design = DesignMatrix::event_time(&panel(), &[TreatVar::PosShock, TreatVar::NegShock], false);
        assert_eq!(design.columns.len(), 8);
        assert_eq!(design.index.get(-1, TreatVar::PosShock), None);
        assert_eq!(design.index.get(-2, TreatVar::PosShock), Some(0));
        assert_eq!(design.index.get(-2, TreatVar::NegShock), Some(1));
        assert_eq!(design.index.get(2, TreatVar::NegShock), Some(7));
        assert_eq!(design.names()[2], "rt_0_x_pos_shock");
    }

    #[test]
    fn dummies_precede_interactions() {
        let design = DesignMatrix::event_time(&panel(), &[TreatVar::TreatShock], true);
        assert_eq!(design.columns[0], DesignColumn::TimeDummy(-2));
        assert_eq!(design.columns[1], DesignColumn::Interaction(-2, TreatVar::TreatShock));
        assert_eq!(design.index.dummy(0), Some(2));
        assert_eq!(design.names()[2], "rt_0");
    }

    #[test]
    fn values_follow_offset_and_treatment() {
        let p = panel();
        let design = DesignMatrix::event_time(&p, &[TreatVar::TreatShock], false);
        let col = design.index.get(1, TreatVar::TreatShock).unwrap();
        for (i, r) in p.rows().iter().enumerate() {
            let expected = if r.rel_time == 1 && r.treated { 2.0 } else { 0.0 };
            assert_eq!(design.x[(i, col)], expected);
        }
    }
}
