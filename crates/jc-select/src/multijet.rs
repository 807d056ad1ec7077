//! Multijet channel: the leading jet probed against a recoil jet-system.

use std::sync::Arc;

use jc_columnar::{Analyzer, ColumnType, ColumnValue, Expr, NodeId, Pred};
use jc_core::{FourVec, Result, delta_phi};

use crate::strategy::{Channel, SelectionStrategy, mirror_probe_columns};

/// Multijet selection cuts.
#[derive(Debug, Clone)]
pub struct MultijetConfig {
    /// Minimum pt for the lead jet and every recoil jet.
    pub min_pt: f64,
    /// Central acceptance: |eta| below this.
    pub eta_max: f64,
    /// Minimum jet-id.
    pub min_jet_id: i64,
    /// Recoil jets must be separated from the lead jet by more than this in
    /// phi.
    pub recoil_dphi_min: f64,
}

impl Default for MultijetConfig {
    fn default() -> Self {
        Self { min_pt: 30.0, eta_max: 2.5, min_jet_id: 4, recoil_dphi_min: 1.0 }
    }
}

/// Multijet selection: recoil-system tag, lead-jet probe.
#[derive(Debug, Clone, Default)]
pub struct MultijetSelection {
    /// Cut configuration.
    pub config: MultijetConfig,
}

impl SelectionStrategy for MultijetSelection {
    fn channel(&self) -> Channel {
        Channel::Multijet
    }

    fn attach(&self, analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId> {
        let cfg = self.config.clone();

        let mut node = node;
        if !analyzer.is_defined(node, "nJet") {
            node = analyzer.define(node, "nJet", Expr::length("Jet_pt"))?;
        }
        node = analyzer.filter(node, "more than three jets", Pred::formula("nJet > 3"))?;

        node = analyzer.define(node, "lead_jet_pt", Expr::element("Jet_pt", 0))?;
        node = analyzer.define(node, "lead_jet_eta", Expr::element("Jet_eta", 0))?;
        node = analyzer.define(node, "lead_jet_id", Expr::element("Jet_jetId", 0))?;
        node = analyzer.filter(
            node,
            "central hard lead jet",
            Pred::formula(&format!(
                "lead_jet_pt > {} && abs(lead_jet_eta) < {} && lead_jet_id >= {}",
                cfg.min_pt, cfg.eta_max, cfg.min_jet_id
            )),
        )?;

        // Recoil system: every other qualifying jet well away from the lead
        // in phi and not vetoed.
        let recoil_cfg = cfg.clone();
        node = analyzer.define(
            node,
            "RecoilJet_idx",
            Expr::func(
                "multijet_recoil_idxs",
                &["Jet_pt", "Jet_eta", "Jet_phi", "Jet_jetId", "Jet_vetoed"],
                ColumnType::VecI64,
                Arc::new(move |deps, _ctx| {
                    let pts = deps[0].f64_seq()?;
                    let etas = deps[1].f64_seq()?;
                    let phis = deps[2].f64_seq()?;
                    let ids = deps[3].f64_seq()?;
                    let vetoed = deps[4].f64_seq()?;
                    let mut idxs = Vec::new();
                    for i in 1..pts.len() {
                        if pts[i] > recoil_cfg.min_pt
                            && etas[i].abs() < recoil_cfg.eta_max
                            && ids[i] >= recoil_cfg.min_jet_id as f64
                            && vetoed[i] == 0.0
                            && delta_phi(phis[i], phis[0]).abs() > recoil_cfg.recoil_dphi_min
                        {
                            idxs.push(i as i64);
                        }
                    }
                    Ok(ColumnValue::VecI64(idxs))
                }),
            ),
        )?;
        node = analyzer.define(node, "nRecoilJet", Expr::length("RecoilJet_idx"))?;
        node = analyzer.filter(
            node,
            "at least two recoil jets",
            Pred::formula("nRecoilJet >= 2"),
        )?;

        node = analyzer.define(node, "lead_vetoed", Expr::element("Jet_vetoed", 0))?;
        node = analyzer.filter(node, "lead jet not vetoed", Pred::formula("lead_vetoed == 0"))?;

        // The probe is the lead jet; mirroring picks up the remaining
        // attributes.
        node = analyzer.define(node, "Probe_idx", Expr::constant(ColumnValue::I64(0)))?;
        node = analyzer.define(node, "Probe_isFirst", Expr::constant(ColumnValue::Bool(true)))?;
        node = mirror_probe_columns(analyzer, node)?;

        // The tag is the four-vector sum of the recoil system.
        node = analyzer.define(
            node,
            "Tag_fourvec",
            Expr::func(
                "multijet_recoil_sum",
                &["Jet_pt", "Jet_eta", "Jet_phi", "Jet_mass", "RecoilJet_idx"],
                ColumnType::VecF64,
                Arc::new(|deps, _ctx| {
                    let pts = deps[0].f64_seq()?;
                    let etas = deps[1].f64_seq()?;
                    let phis = deps[2].f64_seq()?;
                    let masses = deps[3].f64_seq()?;
                    let idxs = deps[4].f64_seq()?;
                    let total: FourVec = idxs
                        .iter()
                        .map(|&i| {
                            let i = i as usize;
                            FourVec::from_ptetaphim(pts[i], etas[i], phis[i], masses[i])
                        })
                        .sum();
                    Ok(ColumnValue::VecF64(vec![
                        total.pt(),
                        total.eta(),
                        total.phi(),
                        total.mass(),
                    ]))
                }),
            ),
        )?;
        node = analyzer.define(node, "Tag_pt", Expr::element("Tag_fourvec", 0))?;
        node = analyzer.define(node, "Tag_eta", Expr::element("Tag_fourvec", 1))?;
        node = analyzer.define(node, "Tag_phi", Expr::element("Tag_fourvec", 2))?;
        node = analyzer.define(node, "Tag_mass", Expr::element("Tag_fourvec", 3))?;
        node = analyzer.define(node, "Tag_rawPt", Expr::formula("Tag_pt"))?;
        node = analyzer.define(
            node,
            "Tag_label",
            Expr::constant(ColumnValue::I64(Channel::Multijet.tag_label())),
        )?;
        // No single activity jet for the multijet topology.
        node = analyzer.define(node, "Activity_idx", Expr::constant(ColumnValue::I64(-1)))?;

        Ok(node)
    }
}
