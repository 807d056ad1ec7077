//! The channel selection seam: one trait, one implementation per channel.
//!
//! A strategy extends a branch's node chain with its kinematic cascade and
//! either emits the canonical Tag/Probe/Activity contract or filters the
//! event out entirely. [`apply`] composes the strategy with the shared
//! post-selection every channel gets: mirrored probe attributes, the
//! activity-fraction cut, the average-pt column, and the hadronic-activity
//! vector used by the corrected responses.

use jc_columnar::{Analyzer, ColumnType, ColumnValue, Expr, NodeId, Pred};
use jc_core::{FourVec, Result};

/// Physics channels with a selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Two leading jets back-to-back; tag chosen by a deterministic draw.
    Dijet,
    /// Leading jet probed against a recoil jet-system tag.
    Multijet,
    /// Tight photon tag, leading non-overlapping jet probe.
    PhotonJet,
    /// Z → e⁺e⁻ tag.
    Zee,
    /// Z → μ⁺μ⁻ tag.
    Zmm,
    /// Pass-through without a contract (control use).
    Empty,
}

impl Channel {
    /// Channel name used in result naming and the output namespace.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Dijet => "dijet",
            Channel::Multijet => "multijet",
            Channel::PhotonJet => "photonjet",
            Channel::Zee => "zee",
            Channel::Zmm => "zmm",
            Channel::Empty => "empty",
        }
    }

    /// Numeric tag label recorded in the contract
    /// (jet = 0, Z = 1, photon = 2, recoil-system = 3).
    pub fn tag_label(self) -> i64 {
        match self {
            Channel::Dijet => 0,
            Channel::Zee | Channel::Zmm => 1,
            Channel::PhotonJet => 2,
            Channel::Multijet => 3,
            Channel::Empty => -1,
        }
    }

    /// Whether the hadronic-activity vector subtracts both tag and probe
    /// (jet-tag channels) or the probe only (Z/photon channels).
    fn activity_subtracts_tag(self) -> bool {
        matches!(self, Channel::Dijet | Channel::Multijet)
    }
}

/// Per-jet attributes mirrored onto the probe.
pub const JET_COLUMNS: &[&str] = &[
    "Jet_pt",
    "Jet_eta",
    "Jet_phi",
    "Jet_mass",
    "Jet_jetId",
    "Jet_area",
    "Jet_nConstituents",
    "Jet_chEmEF",
    "Jet_chHEF",
    "Jet_neEmEF",
    "Jet_neHEF",
    "Jet_hfEmEF",
    "Jet_hfHEF",
    "Jet_muEF",
    "Jet_rawFactor",
];

/// A pluggable per-channel object selection.
pub trait SelectionStrategy {
    /// The channel this strategy implements.
    fn channel(&self) -> Channel;

    /// Extend `node` with the channel's cascade, producing the canonical
    /// contract columns (`Tag_*`, `Probe_idx` or `Probe_*`, `Activity_idx`).
    fn attach(&self, analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId>;
}

/// Attach a strategy and the shared post-selection to a branch node.
pub fn apply(
    analyzer: &mut Analyzer,
    node: NodeId,
    strategy: &dyn SelectionStrategy,
) -> Result<NodeId> {
    let node = strategy.attach(analyzer, node)?;
    let channel = strategy.channel();
    if channel == Channel::Empty {
        return Ok(node);
    }
    finish_contract(analyzer, node, channel)
}

/// Mirror `Probe_<attr>` for every jet attribute the dataset carries, using
/// the strategy's `Probe_idx`. Channels that build the probe themselves
/// (multijet) already define these and are skipped per column.
pub fn mirror_probe_columns(analyzer: &mut Analyzer, mut node: NodeId) -> Result<NodeId> {
    for column in JET_COLUMNS {
        let probe_name = format!("Probe_{}", &column[4..]);
        if !analyzer.is_defined(node, column) || analyzer.is_defined(node, &probe_name) {
            continue;
        }
        node = analyzer.define(node, &probe_name, Expr::element_at(column, "Probe_idx"))?;
    }
    Ok(node)
}

fn finish_contract(analyzer: &mut Analyzer, mut node: NodeId, channel: Channel) -> Result<NodeId> {
    // Raw probe momentum: undo the correction factor when it is available.
    if !analyzer.is_defined(node, "Probe_rawPt") {
        let expr = if analyzer.is_defined(node, "Probe_rawFactor") {
            Expr::formula("(1.0 - Probe_rawFactor) * Probe_pt")
        } else {
            Expr::formula("Probe_pt")
        };
        node = analyzer.define(node, "Probe_rawPt", expr)?;
    }

    node = analyzer.define(node, "average_pt", Expr::formula("0.5 * (Tag_pt + Probe_pt)"))?;

    // Additional-activity veto: the third jet must stay soft relative to the
    // tag-probe scale. Events without an activity jet pass.
    node = analyzer.define(node, "Activity_pt", Expr::element_at("Jet_pt", "Activity_idx"))?;
    node = analyzer.filter(
        node,
        "activity fraction below one",
        Pred::formula("Activity_idx < 0 || Activity_pt / average_pt < 1.0"),
    )?;

    // Hadronic-activity vector for the corrected responses: all jets minus
    // the tag-probe system (jet tags) or minus the probe alone (Z/photon).
    let func_name = if channel.activity_subtracts_tag() {
        "jet_activity_minus_tag_probe"
    } else {
        "jet_activity_minus_probe"
    };
    let subtract_tag = channel.activity_subtracts_tag();
    node = analyzer.define(
        node,
        "JetActivity_polar",
        Expr::func(
            func_name,
            &[
                "Jet_pt", "Jet_eta", "Jet_phi", "Jet_mass", "Tag_pt", "Tag_eta", "Tag_phi",
                "Tag_mass", "Probe_pt", "Probe_eta", "Probe_phi", "Probe_mass",
            ],
            ColumnType::VecF64,
            std::sync::Arc::new(move |deps, _ctx| {
                let pts = deps[0].f64_seq()?;
                let etas = deps[1].f64_seq()?;
                let phis = deps[2].f64_seq()?;
                let masses = deps[3].f64_seq()?;
                let mut total: FourVec = (0..pts.len())
                    .map(|i| FourVec::from_ptetaphim(pts[i], etas[i], phis[i], masses[i]))
                    .sum();
                if subtract_tag {
                    let tag = FourVec::from_ptetaphim(
                        deps[4].as_f64()?,
                        deps[5].as_f64()?,
                        deps[6].as_f64()?,
                        deps[7].as_f64()?,
                    );
                    total = total - tag;
                }
                let probe = FourVec::from_ptetaphim(
                    deps[8].as_f64()?,
                    deps[9].as_f64()?,
                    deps[10].as_f64()?,
                    deps[11].as_f64()?,
                );
                total = total - probe;
                Ok(ColumnValue::VecF64(vec![total.pt(), total.phi()]))
            }),
        ),
    )?;
    node = analyzer.define(node, "JetActivity_pt", Expr::element("JetActivity_polar", 0))?;
    node = analyzer.define(node, "JetActivity_phi", Expr::element("JetActivity_polar", 1))?;

    Ok(node)
}
