//! Console tables for the estimation and test results.
//!
//! Significance stars: `***` p < 0.01, `**` p < 0.05, `*` p < 0.1.

use std::fmt::{self, Display, Formatter};

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::*;

use crate::analysis::{GroupProfile, HeterogeneityAnalysis, MechanismAnalysis};
use crate::hypothesis::{AsymmetrySummary, InteractionTable, PowerAnalysis, KEY_PERIODS};
use crate::regression::EventTimeProfile;
use crate::resample::{BootstrapResult, EventTimeBootstrap};

fn stars(p: f64) -> &'static str {
    if !p.is_finite() {
        ""
    } else if p < 0.01 {
        "***"
    } else if p < 0.05 {
        "**"
    } else if p < 0.1 {
        "*"
    } else {
        ""
    }
}

fn num(x: f64) -> String {
    if x.is_finite() { format!("{x:.4}") } else { "-".to_string() }
}

fn p_value(p: f64) -> String {
    if !p.is_finite() {
        "-".to_string()
    } else if p < 0.0001 {
        "< 0.0001".to_string()
    } else {
        format!("{p:.4}")
    }
}

fn title(text: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .add_row(vec![Cell::new(text).set_alignment(CellAlignment::Center)]);
    table
}

fn body(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).set_alignment(CellAlignment::Center))
                .collect::<Vec<_>>(),
        );
    table
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn left(text: impl ToString) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Left)
}

impl EventTimeProfile {
    /// Offset table with analytic inference.
    pub fn display(&self) -> String {
        let mut table = body(&["Offset", "Coef", "SE", "p-value", "", "CI low", "CI high"]);
        for r in &self.rows {
            let offset = if r.rel_time == self.base_period {
                format!("{} (base)", r.rel_time)
            } else {
                r.rel_time.to_string()
            };
            table.add_row(vec![
                right(offset),
                right(num(r.coef)),
                right(num(r.se)),
                right(p_value(r.p_value)),
                left(stars(r.p_value)),
                right(num(r.ci_lower)),
                right(num(r.ci_upper)),
            ]);
        }
        format!("{}\n{}", title(&format!("Event-time profile: {}", self.treat_var)), table)
    }
}

impl Display for EventTimeProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl BootstrapResult {
    /// Summary of one wild cluster bootstrap.
    pub fn display(&self) -> String {
        let mut table = body(&["Metric", "Value"]);
        table
            .add_row(vec![left("Estimate"), right(num(self.estimate))])
            .add_row(vec![left("Cluster SE"), right(num(self.se))])
            .add_row(vec![left("t"), right(num(self.t_stat))])
            .add_row(vec![
                left("Bootstrap p-value"),
                right(format!("{} {}", p_value(self.p_value), stars(self.p_value))),
            ])
            .add_row(vec![
                left(format!("{:?} CI", self.ci_method)),
                right(format!("{:.4}", self.ci)),
            ])
            .add_row(vec![left("Weights"), right(self.distribution.to_string())])
            .add_row(vec![left("Clusters"), right(self.n_clusters.to_string())])
            .add_row(vec![
                left("Replications (valid / requested)"),
                right(format!("{} / {}", self.n_valid, self.n_bootstrap)),
            ]);
        if self.drop_rate_exceeded {
            table.add_row(vec![left("Warning"), left("drop rate above the configured maximum")]);
        }
        format!("{}\n{}", title("Wild cluster bootstrap (WCR)"), table)
    }
}

impl Display for BootstrapResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl EventTimeBootstrap {
    /// Offset table with bootstrap inference; failed offsets show their error.
    pub fn display(&self) -> String {
        let mut table = body(&["Offset", "Coef", "SE", "t", "Boot p", "", "CI low", "CI high", "Clusters"]);
        for r in &self.rows {
            if let Some(error) = &r.error {
                table.add_row(vec![right(r.rel_time.to_string()), left(format!("failed: {error}"))]);
                continue;
            }
            table.add_row(vec![
                right(r.rel_time.to_string()),
                right(num(r.coef)),
                right(num(r.se)),
                right(num(r.t_stat)),
                right(p_value(r.p_value)),
                left(stars(r.p_value)),
                right(num(r.ci_lower)),
                right(num(r.ci_upper)),
                right(r.n_clusters.to_string()),
            ]);
        }
        format!("{}\n{}", title(&format!("Wild cluster bootstrap: {}", self.treat_var)), table)
    }
}

impl Display for EventTimeBootstrap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl AsymmetrySummary {
    /// Joint, average and cumulative tests followed by the pairwise table.
    pub fn display(&self) -> String {
        let mut tests = body(&["Test", "Statistic", "p-value", "", "Offsets"]);
        let wald = [("Joint (all offsets)", &self.joint_all), ("Joint (post-event)", &self.joint_post)];
        for (name, test) in wald {
            match test {
                Ok(t) => tests.add_row(vec![
                    left(name),
                    right(format!("χ²({}) = {:.3}", t.df, t.statistic)),
                    right(p_value(t.p_value)),
                    left(stars(t.p_value)),
                    right(t.times_tested.len().to_string()),
                ]),
                Err(e) => tests.add_row(vec![left(name), left(e)]),
            };
        }
        match &self.average {
            Ok(t) => tests.add_row(vec![
                left("Average difference"),
                right(format!("{:+.4} (t = {:.2})", t.difference, t.t_statistic)),
                right(p_value(t.p_value)),
                left(stars(t.p_value)),
                right(t.times_tested.len().to_string()),
            ]),
            Err(e) => tests.add_row(vec![left("Average difference"), left(e)]),
        };
        match &self.cumulative {
            Ok(t) => tests.add_row(vec![
                left("Cumulative difference"),
                right(format!("{:+.4} (t = {:.2})", t.difference, t.t_statistic)),
                right(p_value(t.p_value)),
                left(stars(t.p_value)),
                right(format!("{:?}", t.periods)),
            ]),
            Err(e) => tests.add_row(vec![left("Cumulative difference"), left(e)]),
        };

        let mut pairwise = body(&["Offset", "Hike", "Cut", "Difference", "SE", "p-value", ""]);
        for r in &self.pairwise {
            pairwise.add_row(vec![
                right(r.rel_time.to_string()),
                right(num(r.hike_coef)),
                right(num(r.cut_coef)),
                right(num(r.difference)),
                right(num(r.diff_se)),
                right(p_value(r.p_value)),
                left(stars(r.p_value)),
            ]);
        }

        format!(
            "{}\n{}\n{}\nVerdict: {} (min p = {})",
            title("Hike vs. cut asymmetry"),
            tests,
            pairwise,
            self.verdict,
            p_value(self.min_p_value)
        )
    }
}

impl Display for AsymmetrySummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl Display for InteractionTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = body(&["Offset", "Base", "Interaction", "SE", "p-value", "", "Hike total", "Cut total"]);
        for r in &self.rows {
            table.add_row(vec![
                right(r.rel_time.to_string()),
                right(num(r.base_coef)),
                right(num(r.interaction_coef)),
                right(num(r.interaction_se)),
                right(p_value(r.interaction_p)),
                left(stars(r.interaction_p)),
                right(num(r.total_hike)),
                right(num(r.total_cut)),
            ]);
        }
        write!(f, "{}\n{}", title("Interaction specification"), table)
    }
}

fn group_rows(table: &mut Table, kind: &str, groups: &[GroupProfile]) {
    for g in groups {
        let Some(row) = g.profile.as_ref().and_then(|p| p.row(0)) else {
            let reason = g.error.as_deref().unwrap_or("no offset 0");
            table.add_row(vec![left(kind), left(&g.group), right(g.n_rows.to_string()), left(reason)]);
            continue;
        };
        table.add_row(vec![
            left(kind),
            left(&g.group),
            right(g.n_rows.to_string()),
            right(num(row.coef)),
            right(num(row.se)),
            right(p_value(row.p_value)),
            left(stars(row.p_value)),
        ]);
    }
}

impl Display for HeterogeneityAnalysis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = body(&["Split", "Group", "Rows", "Coef (t = 0)", "SE", "p-value", ""]);
        group_rows(&mut table, "country", &self.by_region);
        group_rows(&mut table, "durability", &self.by_durability);
        write!(f, "{}\n{}", title("Heterogeneous pass-through"), table)
    }
}

impl Display for MechanismAnalysis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = body(&["Offset", "Base", "Interaction", "SE", "p-value", ""]);
        for r in self.rows.iter().filter(|r| KEY_PERIODS.contains(&r.rel_time)) {
            table.add_row(vec![
                right(r.rel_time.to_string()),
                right(num(r.base_coef)),
                right(num(r.interaction_coef)),
                right(num(r.interaction_se)),
                right(p_value(r.interaction_p)),
                left(stars(r.interaction_p)),
            ]);
        }
        write!(f, "{}\n{}", title(&format!("Mechanism: shock × {}", self.mechanism)), table)
    }
}

impl Display for PowerAnalysis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut table = body(&["Metric", "Value"]);
        table
            .add_row(vec![left("Effect size"), right(num(self.effect_size))])
            .add_row(vec![left("SE"), right(num(self.se))])
            .add_row(vec![left(format!("Power at α = {}", self.alpha)), right(num(self.power))])
            .add_row(vec![left("MDE (80%)"), right(num(self.mde_80))])
            .add_row(vec![left("MDE (90%)"), right(num(self.mde_90))]);
        write!(f, "{}\n{}", title("Power analysis"), table)
    }
}
