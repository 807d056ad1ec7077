//! Declarative `(channel, method) → action-spec` tables.
//!
//! The per-channel histogram sets are generated from these tables rather
//! than hand-written registration blocks, so every channel gets the same
//! methods with consistent naming: `<Method>_<channel>_<Quantity>`.

use jc_columnar::{ActionKind, ActionSpec, Analyzer, AxisDef, Binning, Expr, NodeId};
use jc_core::Result;

use crate::response::EF_FRACTIONS;
use crate::strategy::Channel;

/// Shared binning tables.
#[derive(Debug, Clone)]
pub struct BinTable {
    /// Jet-energy-correction pt binning.
    pub pt: Vec<f64>,
    /// Calorimeter-tower eta binning.
    pub eta: Vec<f64>,
    /// Response axis.
    pub response: Binning,
    /// Azimuth axis.
    pub phi: Binning,
}

impl Default for BinTable {
    fn default() -> Self {
        Self {
            pt: JEC_PT_BINS.to_vec(),
            eta: TOWER_ETA_BINS.to_vec(),
            response: Binning::Uniform { n: 100, min: 0.0, max: 2.0 },
            phi: Binning::Uniform {
                n: 72,
                min: -std::f64::consts::PI,
                max: std::f64::consts::PI,
            },
        }
    }
}

impl BinTable {
    fn pt_axis(&self, label: &str) -> AxisDef {
        AxisDef::new(label, Binning::Edges(self.pt.clone()))
    }

    fn eta_axis(&self) -> AxisDef {
        AxisDef::new("eta", Binning::Edges(self.eta.clone()))
    }

    fn response_axis(&self) -> AxisDef {
        AxisDef::new("response", self.response.clone())
    }
}

/// Response methods produced for every tag-probe channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMethod {
    /// Direct balance (momentum ratio).
    Db,
    /// Missing-transverse-energy projection.
    Mpf,
    /// Tag-probe momentum asymmetry.
    Asymmetry,
}

impl ResponseMethod {
    fn prefix(self) -> &'static str {
        match self {
            ResponseMethod::Db => "DB",
            ResponseMethod::Mpf => "MPF",
            ResponseMethod::Asymmetry => "Asymmetry",
        }
    }

    fn column(self) -> &'static str {
        match self {
            ResponseMethod::Db => "DB_ratio",
            ResponseMethod::Mpf => "MPF_tag",
            ResponseMethod::Asymmetry => "Asymmetry",
        }
    }
}

/// The pt views each response is binned against.
const PT_VIEWS: [(&str, &str); 3] =
    [("TagPt", "Tag_pt"), ("ProbePt", "Probe_pt"), ("AveragePt", "average_pt")];

/// Response histogram specs for one channel and method.
pub fn response_specs(channel: Channel, method: ResponseMethod, bins: &BinTable) -> Vec<ActionSpec> {
    let ch = channel.name();
    let prefix = method.prefix();
    let column = method.column();
    let mut specs = vec![
        ActionSpec::new(
            &format!("{prefix}_{ch}_Response"),
            ActionKind::Hist1D,
            &[column],
            vec![bins.response_axis()],
        ),
        ActionSpec::new(
            &format!("{prefix}_{ch}_EtaVsResponse"),
            ActionKind::Hist2D,
            &["Tag_eta", column],
            vec![bins.eta_axis(), bins.response_axis()],
        ),
    ];
    for (view_label, view_column) in PT_VIEWS {
        specs.push(ActionSpec::new(
            &format!("{prefix}_{ch}_PtVsResponse_{view_label}"),
            ActionKind::Hist2D,
            &[view_column, column],
            vec![bins.pt_axis("p_T (GeV)"), bins.response_axis()],
        ));
    }
    specs
}

/// Energy-fraction balance profiles for one channel: mean EFB against the
/// tag momentum, one per fraction the schema carries.
pub fn efb_specs(channel: Channel, node: NodeId, analyzer: &Analyzer, bins: &BinTable) -> Vec<ActionSpec> {
    let ch = channel.name();
    EF_FRACTIONS
        .iter()
        .filter(|fraction| analyzer.is_defined(node, &format!("EFB_{fraction}")))
        .map(|fraction| {
            ActionSpec::new(
                &format!("EFB_{ch}_TagPtVs_{fraction}"),
                ActionKind::Profile1D,
                &["Tag_pt", &format!("EFB_{fraction}")],
                vec![bins.pt_axis("p_T,tag (GeV)")],
            )
        })
        .collect()
}

/// Register the full response set (plus EFB profiles) for a channel on one
/// branch's selection chain.
pub fn register_responses(
    analyzer: &mut Analyzer,
    branch: &str,
    node: NodeId,
    channel: Channel,
    bins: &BinTable,
) -> Result<()> {
    let mut specs = Vec::new();
    for method in [ResponseMethod::Db, ResponseMethod::Mpf, ResponseMethod::Asymmetry] {
        if method == ResponseMethod::Mpf && !analyzer.is_defined(node, "MPF_tag") {
            continue;
        }
        specs.extend(response_specs(channel, method, bins));
    }
    specs.extend(efb_specs(channel, node, analyzer, bins));
    for spec in specs {
        analyzer.register_at(branch, node, spec)?;
    }
    Ok(())
}

/// Inclusive jet kinematics on a raw branch: eta-vs-pt map plus pt spectra
/// in |eta| windows built from mask sub-selections.
pub fn register_inclusive(analyzer: &mut Analyzer, branch: &str, bins: &BinTable) -> Result<()> {
    let node = analyzer
        .branch(branch)
        .ok_or_else(|| jc_core::Error::MissingColumn(format!("branch '{branch}'")))?;
    analyzer.register_at(
        branch,
        node,
        ActionSpec::new(
            "Inclusive_EtaVsPt",
            ActionKind::Hist2D,
            &["Jet_eta", "Jet_pt"],
            vec![bins.eta_axis(), bins.pt_axis("p_T (GeV)")],
        ),
    )?;

    let mut node = node;
    for (lo, hi) in ETA_WINDOWS {
        let suffix = format!("{hi:.1}").replace('.', "p");
        let mask = format!("etaWindow_{suffix}");
        let column = format!("Jet_pt_eta_{suffix}");
        node = analyzer.define(
            node,
            &mask,
            Expr::map(&format!("abs(Jet_eta) >= {lo} && abs(Jet_eta) < {hi}")),
        )?;
        node = analyzer.define(node, &column, Expr::mask("Jet_pt", &mask))?;
        analyzer.register_at(
            branch,
            node,
            ActionSpec::new(
                &format!("Inclusive_Pt_eta_{suffix}"),
                ActionKind::Hist1D,
                &[&column],
                vec![bins.pt_axis("p_T (GeV)")],
            ),
        )?;
    }
    Ok(())
}

/// Particle-flow composition profiles on a raw branch: mean energy fraction
/// against (eta, pt), one per fraction the schema carries.
pub fn register_pf_composition(
    analyzer: &mut Analyzer,
    branch: &str,
    bins: &BinTable,
) -> Result<()> {
    let node = analyzer
        .branch(branch)
        .ok_or_else(|| jc_core::Error::MissingColumn(format!("branch '{branch}'")))?;
    for fraction in EF_FRACTIONS {
        let column = format!("Jet_{fraction}");
        if !analyzer.is_defined(node, &column) {
            continue;
        }
        analyzer.register_at(
            branch,
            node,
            ActionSpec::new(
                &format!("PFComposition_EtaVsPtVsProfile_{fraction}"),
                ActionKind::Profile2D,
                &["Jet_eta", "Jet_pt", &column],
                vec![bins.eta_axis(), bins.pt_axis("p_T (GeV)")],
            ),
        )?;
    }
    Ok(())
}

/// |eta| windows for the inclusive pt spectra.
const ETA_WINDOWS: [(f64, f64); 11] = [
    (0.0, 1.3),
    (0.0, 0.5),
    (0.5, 1.0),
    (1.0, 1.5),
    (1.5, 2.0),
    (2.0, 2.5),
    (2.5, 3.0),
    (3.0, 3.5),
    (3.5, 4.0),
    (4.0, 4.5),
    (4.5, 5.0),
];

/// Standard jet-energy-correction pt bin edges.
pub const JEC_PT_BINS: [f64; 80] = [
    1.0, 5.0, 6.0, 8.0, 10.0, 12.0, 15.0, 18.0, 21.0, 24.0, 28.0, 32.0, 37.0, 43.0, 49.0, 56.0,
    64.0, 74.0, 84.0, 97.0, 114.0, 133.0, 153.0, 174.0, 196.0, 220.0, 245.0, 272.0, 300.0, 330.0,
    362.0, 395.0, 430.0, 468.0, 507.0, 548.0, 592.0, 638.0, 686.0, 737.0, 790.0, 846.0, 905.0,
    967.0, 1032.0, 1101.0, 1172.0, 1248.0, 1327.0, 1410.0, 1497.0, 1588.0, 1684.0, 1784.0, 1890.0,
    2000.0, 2116.0, 2238.0, 2366.0, 2500.0, 2640.0, 2787.0, 2941.0, 3103.0, 3273.0, 3450.0,
    3637.0, 3832.0, 4037.0, 4252.0, 4477.0, 4713.0, 4961.0, 5220.0, 5492.0, 5777.0, 6076.0,
    6389.0, 6717.0, 7000.0,
];

/// Calorimeter tower eta bin edges.
pub const TOWER_ETA_BINS: [f64; 83] = [
    -5.191, -4.889, -4.716, -4.538, -4.363, -4.191, -4.013, -3.839, -3.664, -3.489, -3.314,
    -3.139, -2.964, -2.853, -2.65, -2.5, -2.322, -2.172, -2.043, -1.93, -1.83, -1.74, -1.653,
    -1.566, -1.479, -1.392, -1.305, -1.218, -1.131, -1.044, -0.957, -0.879, -0.783, -0.696,
    -0.609, -0.522, -0.435, -0.348, -0.261, -0.174, -0.087, 0.0, 0.087, 0.174, 0.261, 0.348,
    0.435, 0.522, 0.609, 0.696, 0.783, 0.879, 0.957, 1.044, 1.131, 1.218, 1.305, 1.392, 1.479,
    1.566, 1.653, 1.74, 1.83, 1.93, 2.043, 2.172, 2.322, 2.5, 2.65, 2.853, 2.964, 3.139, 3.314,
    3.489, 3.664, 3.839, 4.013, 4.191, 4.363, 4.538, 4.716, 4.889, 5.191,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_specs_cover_all_views() {
        let bins = BinTable::default();
        let specs = response_specs(Channel::Dijet, ResponseMethod::Db, &bins);
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "DB_dijet_Response",
                "DB_dijet_EtaVsResponse",
                "DB_dijet_PtVsResponse_TagPt",
                "DB_dijet_PtVsResponse_ProbePt",
                "DB_dijet_PtVsResponse_AveragePt",
            ]
        );
        for spec in &specs {
            spec.validate().unwrap();
        }
    }

    #[test]
    fn bin_tables_are_sorted() {
        assert!(JEC_PT_BINS.windows(2).all(|w| w[0] < w[1]));
        assert!(TOWER_ETA_BINS.windows(2).all(|w| w[0] < w[1]));
    }
}
