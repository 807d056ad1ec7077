//! Photon-jet channel: a tight photon tags the leading non-overlapping jet.

use std::sync::Arc;

use jc_columnar::{Analyzer, ColumnType, ColumnValue, Expr, NodeId, Pred};
use jc_core::{Result, delta_r};

use crate::strategy::{Channel, SelectionStrategy, mirror_probe_columns};

/// Photon-jet selection cuts.
#[derive(Debug, Clone)]
pub struct PhotonJetConfig {
    /// Minimum photon pt.
    pub photon_min_pt: f64,
    /// Photon must be central: |eta| below this.
    pub photon_eta_max: f64,
    /// Minimum probe-jet pt.
    pub jet_min_pt: f64,
    /// Minimum jet-id.
    pub min_jet_id: i64,
    /// Minimum |delta phi| between probe and photon.
    pub back_to_back_dphi: f64,
    /// Jets within this delta-R of any selected photon are excluded.
    pub overlap_dr: f64,
}

impl Default for PhotonJetConfig {
    fn default() -> Self {
        Self {
            photon_min_pt: 15.0,
            photon_eta_max: 1.3,
            jet_min_pt: 12.0,
            min_jet_id: 4,
            back_to_back_dphi: 2.7,
            overlap_dr: 0.3,
        }
    }
}

/// Photon-jet selection.
#[derive(Debug, Clone, Default)]
pub struct PhotonJetSelection {
    /// Cut configuration.
    pub config: PhotonJetConfig,
}

impl SelectionStrategy for PhotonJetSelection {
    fn channel(&self) -> Channel {
        Channel::PhotonJet
    }

    fn attach(&self, analyzer: &mut Analyzer, node: NodeId) -> Result<NodeId> {
        let cfg = self.config.clone();

        // Tight photon identification.
        let mut node = analyzer.define(
            node,
            "isGoodPhoton",
            Expr::map(
                "Photon_cutBased == 3 && Photon_hoe < 0.02148 && Photon_r9 > 0.94 && Photon_r9 < 1.00",
            ),
        )?;
        node = analyzer.define(node, "goodPhoton_pt", Expr::mask("Photon_pt", "isGoodPhoton"))?;
        node = analyzer.define(node, "goodPhoton_eta", Expr::mask("Photon_eta", "isGoodPhoton"))?;
        node = analyzer.define(node, "goodPhoton_phi", Expr::mask("Photon_phi", "isGoodPhoton"))?;

        // Keep only photons matched to a photon trigger object, when trigger
        // objects are in the input.
        let (pt_col, eta_col, phi_col) = if analyzer.is_defined(node, "TrigObj_eta") {
            let dr = cfg.overlap_dr;
            node = analyzer.define(
                node,
                "photonHasTrg",
                Expr::func(
                    "photon_trigger_match",
                    &["goodPhoton_eta", "goodPhoton_phi", "TrigObj_eta", "TrigObj_phi", "TrigObj_id"],
                    ColumnType::VecBool,
                    Arc::new(move |deps, _ctx| {
                        let etas = deps[0].f64_seq()?;
                        let phis = deps[1].f64_seq()?;
                        let trg_eta = deps[2].f64_seq()?;
                        let trg_phi = deps[3].f64_seq()?;
                        let trg_id = deps[4].f64_seq()?;
                        let matched = etas
                            .iter()
                            .zip(phis.iter())
                            .map(|(&e, &p)| {
                                trg_eta.iter().zip(trg_phi.iter()).zip(trg_id.iter()).any(
                                    |((&te, &tp), &tid)| {
                                        tid == 22.0 && delta_r(e, p, te, tp) < dr
                                    },
                                )
                            })
                            .collect();
                        Ok(ColumnValue::VecBool(matched))
                    }),
                ),
            )?;
            node = analyzer
                .define(node, "selPhoton_pt", Expr::mask("goodPhoton_pt", "photonHasTrg"))?;
            node = analyzer
                .define(node, "selPhoton_eta", Expr::mask("goodPhoton_eta", "photonHasTrg"))?;
            node = analyzer
                .define(node, "selPhoton_phi", Expr::mask("goodPhoton_phi", "photonHasTrg"))?;
            ("selPhoton_pt", "selPhoton_eta", "selPhoton_phi")
        } else {
            ("goodPhoton_pt", "goodPhoton_eta", "goodPhoton_phi")
        };

        node = analyzer.define(node, "nSelPhoton", Expr::length(pt_col))?;
        node = analyzer.filter(node, "selected photon found", Pred::formula("nSelPhoton > 0"))?;
        node = analyzer.define(node, "Tag_pt", Expr::element(pt_col, 0))?;
        node = analyzer.define(node, "Tag_eta", Expr::element(eta_col, 0))?;
        node = analyzer.define(node, "Tag_phi", Expr::element(phi_col, 0))?;
        node = analyzer.filter(
            node,
            "photon in barrel above threshold",
            Pred::formula(&format!(
                "Tag_pt > {} && abs(Tag_eta) < {}",
                cfg.photon_min_pt, cfg.photon_eta_max
            )),
        )?;

        // Leading jet not overlapping any identified photon is the probe;
        // the next one is the activity jet.
        let dr = cfg.overlap_dr;
        node = analyzer.define(
            node,
            "JetPhoton_idx",
            Expr::func(
                "photonjet_jet_idxs",
                &["Jet_eta", "Jet_phi", "goodPhoton_eta", "goodPhoton_phi"],
                ColumnType::VecI64,
                Arc::new(move |deps, _ctx| {
                    let jet_eta = deps[0].f64_seq()?;
                    let jet_phi = deps[1].f64_seq()?;
                    let ph_eta = deps[2].f64_seq()?;
                    let ph_phi = deps[3].f64_seq()?;
                    let mut probe = -1i64;
                    let mut activity = -1i64;
                    for i in 0..jet_eta.len() {
                        let overlaps = ph_eta
                            .iter()
                            .zip(ph_phi.iter())
                            .any(|(&pe, &pp)| delta_r(jet_eta[i], jet_phi[i], pe, pp) < dr);
                        if overlaps {
                            continue;
                        }
                        if probe < 0 {
                            probe = i as i64;
                        } else {
                            activity = i as i64;
                            break;
                        }
                    }
                    Ok(ColumnValue::VecI64(vec![probe, activity]))
                }),
            ),
        )?;
        node = analyzer.define(node, "Probe_idx", Expr::element("JetPhoton_idx", 0))?;
        node = analyzer.define(node, "Activity_idx", Expr::element("JetPhoton_idx", 1))?;
        node = analyzer.filter(node, "probe jet found", Pred::formula("Probe_idx >= 0"))?;

        node = mirror_probe_columns(analyzer, node)?;
        node =
            analyzer.define(node, "Probe_vetoed", Expr::element_at("Jet_vetoed", "Probe_idx"))?;
        node = analyzer.filter(
            node,
            "probe quality",
            Pred::formula(&format!(
                "Probe_pt > {} && Probe_jetId >= {} && Probe_vetoed == 0",
                cfg.jet_min_pt, cfg.min_jet_id
            )),
        )?;
        node = analyzer.filter(
            node,
            "probe back-to-back with photon",
            Pred::formula(&format!(
                "abs(deltaphi(Probe_phi, Tag_phi)) > {}",
                cfg.back_to_back_dphi
            )),
        )?;

        node = analyzer.define(node, "Tag_mass", Expr::constant(ColumnValue::F64(0.0)))?;
        node = analyzer.define(node, "Tag_rawPt", Expr::formula("Tag_pt"))?;
        node = analyzer.define(
            node,
            "Tag_label",
            Expr::constant(ColumnValue::I64(Channel::PhotonJet.tag_label())),
        )?;
        node = analyzer.define(node, "Probe_isFirst", Expr::formula("Probe_idx == 0"))?;

        Ok(node)
    }
}
