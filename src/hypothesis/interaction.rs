use serde::Serialize;

use crate::regression::FittedModel;
use crate::stack::TreatVar;
use crate::statistics::{std_error, two_sided_p};

/// Interaction specification at one offset: `ShockAbs` is the cut effect,
/// `ShockXHike` the extra effect of a hike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InteractionRow {
    pub rel_time: i32,
    pub base_coef: f64,
    pub base_se: f64,
    pub interaction_coef: f64,
    pub interaction_se: f64,
    pub interaction_t: f64,
    pub interaction_p: f64,
    /// `base + interaction`.
    pub total_hike: f64,
    /// `base`.
    pub total_cut: f64,
}

impl InteractionRow {
    const fn pinned(rel_time: i32) -> Self {
        Self {
            rel_time,
            base_coef: 0.0,
            base_se: 0.0,
            interaction_coef: 0.0,
            interaction_se: 0.0,
            interaction_t: 0.0,
            interaction_p: 1.0,
            total_hike: 0.0,
            total_cut: 0.0,
        }
    }

    const fn missing(rel_time: i32) -> Self {
        Self {
            rel_time,
            base_coef: f64::NAN,
            base_se: f64::NAN,
            interaction_coef: f64::NAN,
            interaction_se: f64::NAN,
            interaction_t: f64::NAN,
            interaction_p: f64::NAN,
            total_hike: f64::NAN,
            total_cut: f64::NAN,
        }
    }
}

/// Dense table of [`InteractionRow`]s over `-H..=H`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionTable {
    pub rows: Vec<InteractionRow>,
}

impl InteractionTable {
    /// Variables the interaction model must be fitted on.
    pub const VARIABLES: [TreatVar; 2] = [TreatVar::ShockAbs, TreatVar::ShockXHike];

    /// Reads the table off a model fitted on [`InteractionTable::VARIABLES`].
    pub fn extract(model: &FittedModel) -> Self {
        Self::extract_pair(model, TreatVar::ShockAbs, TreatVar::ShockXHike)
    }

    /// Reads `base` and `interaction` coefficients at every offset. An offset
    /// whose coefficients are missing from the model is `NaN`; a missing
    /// variance gives a `NaN` standard error.
    pub fn extract_pair(model: &FittedModel, base: TreatVar, interaction: TreatVar) -> Self {
        let coef = |i: usize| model.params().get(i).copied().unwrap_or(f64::NAN);
        let se = |i: usize| model.cov().get((i, i)).copied().map_or(f64::NAN, std_error);
        let h = model.half_window();
        let rows = (-h..=h)
            .map(|t| {
                if t == model.base_period() {
                    return InteractionRow::pinned(t);
                }
                let (Some(b), Some(i)) = (model.column(t, base), model.column(t, interaction)) else {
                    return InteractionRow::missing(t);
                };
                let interaction_se = se(i);
                let interaction_t = if interaction_se > 0.0 { coef(i) / interaction_se } else { f64::NAN };
                InteractionRow {
                    rel_time: t,
                    base_coef: coef(b),
                    base_se: se(b),
                    interaction_coef: coef(i),
                    interaction_se,
                    interaction_t,
                    interaction_p: two_sided_p(interaction_t),
                    total_hike: coef(b) + coef(i),
                    total_cut: coef(b),
                }
            })
            .collect();
        Self { rows }
    }

    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn row(&self, rel_time: i32) -> Option<&InteractionRow> {
        self.rows.iter().find(|r| r.rel_time == rel_time)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::DesignColumn;
    use approx::assert_abs_diff_eq;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn totals_and_pinned_base() {
        let columns = vec![
            DesignColumn::Interaction(0, TreatVar::ShockAbs),
            DesignColumn::Interaction(0, TreatVar::ShockXHike),
        ];
        let params = DVector::from_vec(vec![0.3, 0.4]);
        let cov = DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.04]));
        let model = FittedModel::from_estimates(params, cov, columns, 1, -1);
        let table = InteractionTable::extract(&model);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.row(-1).unwrap().interaction_p, 1.0);
        let r0 = table.row(0).unwrap();
        assert_abs_diff_eq!(r0.total_hike, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(r0.total_cut, 0.3);
        assert_abs_diff_eq!(r0.interaction_t, 2.0, epsilon = 1e-12);
        assert!(r0.interaction_p < 0.05);
        assert!(table.row(1).unwrap().base_coef.is_nan());
    }

    #[test]
    fn aliased_interaction_has_missing_standard_error() {
        let columns = vec![
            DesignColumn::Interaction(0, TreatVar::ShockAbs),
            DesignColumn::Interaction(0, TreatVar::ShockXHike),
        ];
        let params = DVector::from_vec(vec![0.3, f64::NAN]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.01, f64::NAN, f64::NAN, f64::NAN]);
        let model = FittedModel::from_estimates(params, cov, columns, 1, -1);
        let r0 = *InteractionTable::extract(&model).row(0).unwrap();
        assert_abs_diff_eq!(r0.base_se, 0.1, epsilon = 1e-12);
        assert!(r0.interaction_se.is_nan());
        assert!(r0.interaction_t.is_nan());
        assert!(r0.interaction_p.is_nan());
    }
}
